//! SF2 generator operators, their defaults and merged generator sets.

/// Number of generator operator slots defined by SF2 2.04 (0..=60).
pub const GENERATOR_COUNT: usize = 61;

/// The SF2 generator operators understood by the engine.
///
/// Unused and reserved operators are not represented; they are skipped at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum GeneratorKind {
    StartAddrsOffset = 0,
    EndAddrsOffset = 1,
    StartloopAddrsOffset = 2,
    EndloopAddrsOffset = 3,
    StartAddrsCoarseOffset = 4,
    ModLfoToPitch = 5,
    VibLfoToPitch = 6,
    ModEnvToPitch = 7,
    InitialFilterFc = 8,
    InitialFilterQ = 9,
    ModLfoToFilterFc = 10,
    ModEnvToFilterFc = 11,
    EndAddrsCoarseOffset = 12,
    ModLfoToVolume = 13,
    ChorusEffectsSend = 15,
    ReverbEffectsSend = 16,
    Pan = 17,
    DelayModLfo = 21,
    FreqModLfo = 22,
    DelayVibLfo = 23,
    FreqVibLfo = 24,
    DelayModEnv = 25,
    AttackModEnv = 26,
    HoldModEnv = 27,
    DecayModEnv = 28,
    SustainModEnv = 29,
    ReleaseModEnv = 30,
    KeynumToModEnvHold = 31,
    KeynumToModEnvDecay = 32,
    DelayVolEnv = 33,
    AttackVolEnv = 34,
    HoldVolEnv = 35,
    DecayVolEnv = 36,
    SustainVolEnv = 37,
    ReleaseVolEnv = 38,
    KeynumToVolEnvHold = 39,
    KeynumToVolEnvDecay = 40,
    Instrument = 41,
    KeyRange = 43,
    VelRange = 44,
    StartloopAddrsCoarseOffset = 45,
    Keynum = 46,
    Velocity = 47,
    InitialAttenuation = 48,
    EndloopAddrsCoarseOffset = 50,
    CoarseTune = 51,
    FineTune = 52,
    SampleId = 53,
    SampleModes = 54,
    ScaleTuning = 56,
    ExclusiveClass = 57,
    OverridingRootKey = 58,
}

impl GeneratorKind {
    /// Maps a raw operator number to a known generator.
    pub fn from_raw(op: u16) -> Option<Self> {
        use GeneratorKind::*;
        let kind = match op {
            0 => StartAddrsOffset,
            1 => EndAddrsOffset,
            2 => StartloopAddrsOffset,
            3 => EndloopAddrsOffset,
            4 => StartAddrsCoarseOffset,
            5 => ModLfoToPitch,
            6 => VibLfoToPitch,
            7 => ModEnvToPitch,
            8 => InitialFilterFc,
            9 => InitialFilterQ,
            10 => ModLfoToFilterFc,
            11 => ModEnvToFilterFc,
            12 => EndAddrsCoarseOffset,
            13 => ModLfoToVolume,
            15 => ChorusEffectsSend,
            16 => ReverbEffectsSend,
            17 => Pan,
            21 => DelayModLfo,
            22 => FreqModLfo,
            23 => DelayVibLfo,
            24 => FreqVibLfo,
            25 => DelayModEnv,
            26 => AttackModEnv,
            27 => HoldModEnv,
            28 => DecayModEnv,
            29 => SustainModEnv,
            30 => ReleaseModEnv,
            31 => KeynumToModEnvHold,
            32 => KeynumToModEnvDecay,
            33 => DelayVolEnv,
            34 => AttackVolEnv,
            35 => HoldVolEnv,
            36 => DecayVolEnv,
            37 => SustainVolEnv,
            38 => ReleaseVolEnv,
            39 => KeynumToVolEnvHold,
            40 => KeynumToVolEnvDecay,
            41 => Instrument,
            43 => KeyRange,
            44 => VelRange,
            45 => StartloopAddrsCoarseOffset,
            46 => Keynum,
            47 => Velocity,
            48 => InitialAttenuation,
            50 => EndloopAddrsCoarseOffset,
            51 => CoarseTune,
            52 => FineTune,
            53 => SampleId,
            54 => SampleModes,
            56 => ScaleTuning,
            57 => ExclusiveClass,
            58 => OverridingRootKey,
            _ => return None,
        };
        Some(kind)
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// SF2 default value of the generator.
    pub fn default_value(self) -> i16 {
        use GeneratorKind::*;
        match self {
            InitialFilterFc => 13_500,
            DelayModLfo | DelayVibLfo | DelayModEnv | AttackModEnv | HoldModEnv | DecayModEnv
            | ReleaseModEnv | DelayVolEnv | AttackVolEnv | HoldVolEnv | DecayVolEnv
            | ReleaseVolEnv => -12_000,
            KeyRange | VelRange => 127 << 8,
            Keynum | Velocity | OverridingRootKey => -1,
            ScaleTuning => 100,
            _ => 0,
        }
    }

    /// Generators that only make sense at instrument level.
    ///
    /// Preset zones carrying these are ignored when resolving a region.
    pub fn is_instrument_only(self) -> bool {
        use GeneratorKind::*;
        matches!(
            self,
            StartAddrsOffset
                | EndAddrsOffset
                | StartloopAddrsOffset
                | EndloopAddrsOffset
                | StartAddrsCoarseOffset
                | EndAddrsCoarseOffset
                | StartloopAddrsCoarseOffset
                | EndloopAddrsCoarseOffset
                | Instrument
                | KeyRange
                | VelRange
                | Keynum
                | Velocity
                | SampleId
                | SampleModes
                | ExclusiveClass
                | OverridingRootKey
        )
    }
}

/// One generator record of a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generator {
    pub kind: GeneratorKind,
    pub amount: i16,
}

/// Inclusive key or velocity range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub lo: u8,
    pub hi: u8,
}

impl Range {
    pub const FULL: Range = Range { lo: 0, hi: 127 };

    /// Decodes the (lo, hi) byte pair stored in a range generator amount.
    pub fn from_amount(amount: i16) -> Self {
        let [lo, hi] = (amount as u16).to_le_bytes();
        Self { lo, hi }
    }

    pub fn contains(&self, value: u8) -> bool {
        (self.lo..=self.hi).contains(&value)
    }
}

/// Fully merged generator values for one region.
///
/// Values are widened to `i32` so preset-level offsets can be summed without overflow.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorSet {
    values: [i32; GENERATOR_COUNT],
}

impl GeneratorSet {
    pub fn defaults() -> Self {
        let mut values = [0i32; GENERATOR_COUNT];
        for (op, value) in values.iter_mut().enumerate() {
            if let Some(kind) = GeneratorKind::from_raw(op as u16) {
                *value = kind.default_value() as i32;
            }
        }
        Self { values }
    }

    pub fn get(&self, kind: GeneratorKind) -> i32 {
        self.values[kind.index()]
    }

    pub fn set(&mut self, kind: GeneratorKind, value: i32) {
        self.values[kind.index()] = value;
    }

    pub fn add(&mut self, kind: GeneratorKind, value: i32) {
        self.values[kind.index()] = self.values[kind.index()].saturating_add(value);
    }
}

impl Default for GeneratorSet {
    fn default() -> Self {
        Self::defaults()
    }
}
