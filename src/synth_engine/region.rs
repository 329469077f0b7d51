//! Region resolution: merging preset and instrument zones into playable regions.

use crate::synth_engine::envelope::EnvelopeParams;
use crate::synth_engine::font::{SoundFontData, Zone};
use crate::synth_engine::generators::{GENERATOR_COUNT, GeneratorKind, GeneratorSet};
use crate::synth_engine::modulators;

const COARSE_OFFSET: i64 = 32_768;
const DEFAULT_ROOT_KEY: u8 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    None,
    Continuous,
    UntilRelease,
}

/// A fully resolved region, ready to drive one voice.
#[derive(Debug, Clone)]
pub struct Region {
    pub generators: GeneratorSet,
    /// Frame bounds into the shared sample pool.
    pub start: usize,
    pub end: usize,
    pub loop_start: usize,
    pub loop_end: usize,
    pub loop_mode: LoopMode,
    pub sample_rate: u32,
    /// Key used for pitch and key scaling (the `keynum` generator wins over the played key).
    pub key: u8,
    /// Velocity override from the `velocity` generator, as 0..1.
    pub velocity: Option<f32>,
    pub root_key: u8,
    /// Static tuning in cents: coarse, fine and the sample's pitch correction.
    pub tune_cents: f32,
    pub scale_tuning: f32,
    pub attenuation_cb: f32,
    /// Pan offset in -0.5..0.5.
    pub pan: f32,
    pub exclusive_class: i32,
    pub filter_fc_cents: f32,
    pub filter_q_cb: f32,
    pub vol_env: EnvelopeParams,
    pub mod_env: EnvelopeParams,
}

impl Region {
    pub fn get(&self, kind: GeneratorKind) -> f32 {
        self.generators.get(kind) as f32
    }
}

/// Resolves every region of `preset_index` that covers the note.
///
/// Regions whose sample range is empty are skipped.
pub fn resolve_regions(
    font: &SoundFontData,
    preset_index: usize,
    key: u8,
    velocity: u8,
) -> Vec<Region> {
    let Some(preset) = font.presets.get(preset_index) else {
        return Vec::new();
    };

    let mut regions = Vec::new();
    for preset_zone in &preset.zones {
        if !preset_zone.matches(preset.global.as_ref(), key, velocity) {
            continue;
        }
        let Some(instrument) = preset_zone.link.and_then(|i| font.instruments.get(i)) else {
            continue;
        };

        for instrument_zone in &instrument.zones {
            if !instrument_zone.matches(instrument.global.as_ref(), key, velocity) {
                continue;
            }
            let generators = merge_generators(
                preset.global.as_ref(),
                preset_zone,
                instrument.global.as_ref(),
                instrument_zone,
                key,
                velocity,
            );
            if let Some(region) = build_region(font, instrument_zone, generators, key) {
                regions.push(region);
            }
        }
    }
    regions
}

fn merge_generators(
    preset_global: Option<&Zone>,
    preset_zone: &Zone,
    instrument_global: Option<&Zone>,
    instrument_zone: &Zone,
    key: u8,
    velocity: u8,
) -> GeneratorSet {
    let mut gens = GeneratorSet::defaults();
    for g in instrument_global
        .into_iter()
        .chain(std::iter::once(instrument_zone))
        .flat_map(|z| z.generators.iter())
    {
        gens.set(g.kind, g.amount as i32);
    }

    // Preset level: local replaces global, then the sum is added.
    let mut preset_values: [Option<i16>; GENERATOR_COUNT] = [None; GENERATOR_COUNT];
    for g in preset_global
        .into_iter()
        .chain(std::iter::once(preset_zone))
        .flat_map(|z| z.generators.iter())
    {
        preset_values[g.kind.index()] = Some(g.amount);
    }
    for (op, value) in preset_values.iter().enumerate() {
        let (Some(value), Some(kind)) = (value, GeneratorKind::from_raw(op as u16)) else {
            continue;
        };
        if !kind.is_instrument_only() {
            gens.add(kind, *value as i32);
        }
    }

    let empty: &[modulators::Modulator] = &[];
    let instrument_mods = modulators::merge(
        instrument_global.map_or(empty, |z| z.modulators.as_slice()),
        &instrument_zone.modulators,
    );
    let preset_mods = modulators::merge(
        preset_global.map_or(empty, |z| z.modulators.as_slice()),
        &preset_zone.modulators,
    );
    modulators::apply(&instrument_mods, key, velocity, &mut gens);
    modulators::apply(&preset_mods, key, velocity, &mut gens);

    gens
}

fn build_region(
    font: &SoundFontData,
    instrument_zone: &Zone,
    gens: GeneratorSet,
    played_key: u8,
) -> Option<Region> {
    use GeneratorKind::*;

    let sample = font.samples.get(instrument_zone.link?)?;
    let pool_len = font.pool.len() as i64;

    let offset = |fine: GeneratorKind, coarse: GeneratorKind| -> i64 {
        gens.get(fine) as i64 + gens.get(coarse) as i64 * COARSE_OFFSET
    };
    let start = (sample.start as i64 + offset(StartAddrsOffset, StartAddrsCoarseOffset))
        .clamp(0, pool_len);
    let end =
        (sample.end as i64 + offset(EndAddrsOffset, EndAddrsCoarseOffset)).clamp(start, pool_len);
    if end <= start {
        log::warn!("Skipping empty region of sample '{}'", sample.name);
        return None;
    }
    let loop_start = (sample.loop_start as i64
        + offset(StartloopAddrsOffset, StartloopAddrsCoarseOffset))
    .clamp(start, end);
    let loop_end = (sample.loop_end as i64 + offset(EndloopAddrsOffset, EndloopAddrsCoarseOffset))
        .clamp(start, end);

    let mut loop_mode = match gens.get(SampleModes) & 3 {
        1 => LoopMode::Continuous,
        3 => LoopMode::UntilRelease,
        _ => LoopMode::None,
    };
    if loop_mode != LoopMode::None && loop_start >= loop_end {
        log::warn!(
            "Invalid loop {}..{} in sample '{}', playing without loop",
            loop_start,
            loop_end,
            sample.name
        );
        loop_mode = LoopMode::None;
    }

    let key = match gens.get(Keynum) {
        k @ 0..=127 => k as u8,
        _ => played_key,
    };
    let velocity = match gens.get(Velocity) {
        v @ 0..=127 => Some(v as f32 / 127.0),
        _ => None,
    };
    let root_key = match gens.get(OverridingRootKey) {
        k @ 0..=127 => k as u8,
        _ if sample.original_pitch <= 127 => sample.original_pitch,
        _ => DEFAULT_ROOT_KEY,
    };

    Some(Region {
        start: start as usize,
        end: end as usize,
        loop_start: loop_start as usize,
        loop_end: loop_end as usize,
        loop_mode,
        sample_rate: sample.sample_rate,
        key,
        velocity,
        root_key,
        tune_cents: gens.get(CoarseTune) as f32 * 100.0
            + gens.get(FineTune) as f32
            + sample.pitch_correction as f32,
        scale_tuning: gens.get(ScaleTuning) as f32,
        attenuation_cb: gens.get(InitialAttenuation).clamp(0, 1440) as f32,
        pan: (gens.get(Pan) as f32 / 1000.0).clamp(-0.5, 0.5),
        exclusive_class: gens.get(ExclusiveClass),
        filter_fc_cents: gens.get(InitialFilterFc).clamp(1500, 13_500) as f32,
        filter_q_cb: gens.get(InitialFilterQ).clamp(0, 960) as f32,
        vol_env: EnvelopeParams::volume(&gens),
        mod_env: EnvelopeParams::modulation(&gens),
        generators: gens,
    })
}
