//! DAHDSR envelope generator shared by the volume and modulation envelopes.
//!
//! The volume envelope runs in decibels between [`ENVELOPE_FLOOR_DB`] and 0 dB,
//! the modulation envelope on a plain 0..1 scale. Attack is a linear ramp from
//! floor to peak; decay and release move linearly at a rate of one full range
//! per stage time.

use crate::synth_engine::constants::ENVELOPE_FLOOR_DB;
use crate::synth_engine::generators::{GeneratorKind, GeneratorSet};
use crate::synth_engine::tables::timecents_to_seconds;

const MAX_TIMECENTS: f32 = 8_000.0;
const MIN_TIMECENTS: f32 = -12_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EnvelopeStage {
    Delay,
    Attack,
    Hold,
    Decay,
    Sustain,
    Release,
    Done,
}

/// Envelope parameters in SF2 units (timecents, sustain as a 0..1 fraction of the range).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeParams {
    pub delay: f32,
    pub attack: f32,
    pub hold: f32,
    pub decay: f32,
    /// Sustain level as attenuation below peak: 0 is full level, 1 is the floor.
    pub sustain: f32,
    pub release: f32,
    pub keynum_to_hold: f32,
    pub keynum_to_decay: f32,
}

impl EnvelopeParams {
    /// Volume envelope: `sustainVolEnv` is centibels of attenuation.
    pub fn volume(gens: &GeneratorSet) -> Self {
        use GeneratorKind::*;
        let sustain_db = gens.get(SustainVolEnv).max(0) as f32 / 10.0;
        Self {
            delay: gens.get(DelayVolEnv) as f32,
            attack: gens.get(AttackVolEnv) as f32,
            hold: gens.get(HoldVolEnv) as f32,
            decay: gens.get(DecayVolEnv) as f32,
            sustain: (sustain_db / -ENVELOPE_FLOOR_DB).min(1.0),
            release: gens.get(ReleaseVolEnv) as f32,
            keynum_to_hold: gens.get(KeynumToVolEnvHold) as f32,
            keynum_to_decay: gens.get(KeynumToVolEnvDecay) as f32,
        }
    }

    /// Modulation envelope: `sustainModEnv` is tenths of a percent below peak.
    pub fn modulation(gens: &GeneratorSet) -> Self {
        use GeneratorKind::*;
        Self {
            delay: gens.get(DelayModEnv) as f32,
            attack: gens.get(AttackModEnv) as f32,
            hold: gens.get(HoldModEnv) as f32,
            decay: gens.get(DecayModEnv) as f32,
            sustain: (gens.get(SustainModEnv) as f32 / 1000.0).clamp(0.0, 1.0),
            release: gens.get(ReleaseModEnv) as f32,
            keynum_to_hold: gens.get(KeynumToModEnvHold) as f32,
            keynum_to_decay: gens.get(KeynumToModEnvDecay) as f32,
        }
    }
}

fn stage_samples(timecents: f32, sample_rate: f32) -> u32 {
    let seconds = timecents_to_seconds(timecents.clamp(MIN_TIMECENTS, MAX_TIMECENTS));
    (seconds * sample_rate).round() as u32
}

#[derive(Debug, Clone)]
pub struct Envelope {
    stage: EnvelopeStage,
    level: f32,
    floor: f32,
    peak: f32,
    sustain_level: f32,
    delay: u32,
    attack: u32,
    hold: u32,
    attack_step: f32,
    decay_step: f32,
    release_step: f32,
    counter: u32,
}

impl Envelope {
    pub fn new(floor: f32, peak: f32) -> Self {
        Self {
            stage: EnvelopeStage::Done,
            level: floor,
            floor,
            peak,
            sustain_level: peak,
            delay: 0,
            attack: 0,
            hold: 0,
            attack_step: 0.0,
            decay_step: 0.0,
            release_step: 0.0,
            counter: 0,
        }
    }

    /// Envelope in decibels, from the floor up to 0 dB.
    pub fn volume() -> Self {
        Self::new(ENVELOPE_FLOOR_DB, 0.0)
    }

    /// Envelope on a 0..1 scale.
    pub fn modulation() -> Self {
        Self::new(0.0, 1.0)
    }

    /// Restarts the envelope for a note on `key`.
    pub fn start(&mut self, params: &EnvelopeParams, key: u8, sample_rate: f32) {
        let range = self.peak - self.floor;
        let key_offset = 60.0 - key as f32;
        let hold_tc = params.hold + params.keynum_to_hold * key_offset;
        let decay_tc = params.decay + params.keynum_to_decay * key_offset;

        self.delay = stage_samples(params.delay, sample_rate);
        self.attack = stage_samples(params.attack, sample_rate);
        self.hold = stage_samples(hold_tc, sample_rate);
        let decay = stage_samples(decay_tc, sample_rate).max(1);
        let release = stage_samples(params.release, sample_rate).max(1);

        self.sustain_level = self.peak - range * params.sustain;
        self.attack_step = range / self.attack.max(1) as f32;
        self.decay_step = range / decay as f32;
        self.release_step = range / release as f32;
        self.level = self.floor;
        self.enter(EnvelopeStage::Delay);
    }

    /// Moves to the release stage from wherever the envelope currently is.
    pub fn release(&mut self) {
        if self.stage != EnvelopeStage::Done {
            self.stage = EnvelopeStage::Release;
        }
    }

    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    /// Current level mapped to 0..1 within the floor/peak range.
    pub fn normalized(&self) -> f32 {
        (self.level - self.floor) / (self.peak - self.floor)
    }

    /// True once the level can no longer rise above the floor.
    pub fn is_finished(&self) -> bool {
        match self.stage {
            EnvelopeStage::Done => true,
            EnvelopeStage::Sustain | EnvelopeStage::Release => self.level <= self.floor,
            _ => false,
        }
    }

    fn enter(&mut self, stage: EnvelopeStage) {
        self.stage = stage;
        self.counter = match stage {
            EnvelopeStage::Delay => self.delay,
            EnvelopeStage::Attack => self.attack,
            EnvelopeStage::Hold => self.hold,
            _ => 0,
        };
    }

    /// Advances by one sample and returns the new level.
    pub fn next(&mut self) -> f32 {
        loop {
            match self.stage {
                EnvelopeStage::Delay => {
                    if self.counter == 0 {
                        self.enter(EnvelopeStage::Attack);
                        continue;
                    }
                    self.counter -= 1;
                    return self.level;
                }
                EnvelopeStage::Attack => {
                    if self.counter == 0 {
                        self.level = self.peak;
                        self.enter(EnvelopeStage::Hold);
                        continue;
                    }
                    self.counter -= 1;
                    self.level = (self.level + self.attack_step).min(self.peak);
                    return self.level;
                }
                EnvelopeStage::Hold => {
                    if self.counter == 0 {
                        self.enter(EnvelopeStage::Decay);
                        continue;
                    }
                    self.counter -= 1;
                    return self.level;
                }
                EnvelopeStage::Decay => {
                    if self.level <= self.sustain_level {
                        self.level = self.sustain_level;
                        self.enter(EnvelopeStage::Sustain);
                        continue;
                    }
                    self.level = (self.level - self.decay_step).max(self.sustain_level);
                    return self.level;
                }
                EnvelopeStage::Sustain => return self.level,
                EnvelopeStage::Release => {
                    self.level = (self.level - self.release_step).max(self.floor);
                    if self.level <= self.floor {
                        self.stage = EnvelopeStage::Done;
                    }
                    return self.level;
                }
                EnvelopeStage::Done => return self.floor,
            }
        }
    }

    /// Advances by `frames` samples.
    pub fn advance(&mut self, frames: usize) -> f32 {
        for _ in 0..frames {
            self.next();
        }
        self.level
    }
}
