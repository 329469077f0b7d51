//! A single playing voice: sample oscillator, envelopes, LFOs, filter and pan.

use std::cmp::Ordering;
use std::f32::consts::FRAC_PI_2;

use crate::synth_engine::constants::RENDER_BLOCK_FRAMES;
use crate::synth_engine::envelope::{Envelope, EnvelopeStage};
use crate::synth_engine::filter::{LowPassFilter, resonance_to_q};
use crate::synth_engine::generators::GeneratorKind;
use crate::synth_engine::lfo::Lfo;
use crate::synth_engine::region::{LoopMode, Region};
use crate::synth_engine::tables::SynthTables;

/// Channel-derived parameters applied to a voice at control rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceControl {
    /// Tuning plus pitch wheel, in cents.
    pub pitch_cents: f32,
    /// Channel volume including MIDI volume and expression.
    pub gain: f32,
    /// Channel pan in 0..1.
    pub pan: f32,
}

impl Default for VoiceControl {
    fn default() -> Self {
        Self {
            pitch_cents: 0.0,
            gain: 1.0,
            pan: 0.5,
        }
    }
}

/// Who started a voice and when.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceNote {
    /// Owning channel; `None` for voices started directly by preset.
    pub channel: Option<usize>,
    pub preset_index: usize,
    pub key: u8,
    pub velocity: f32,
    pub play_order: u64,
    /// Identifies the note-on event; voices of one note-on never steal each other.
    pub note_id: u64,
}

#[derive(Debug, Clone)]
pub struct Voice {
    pub active: bool,
    pub note: VoiceNote,
    /// Note-off arrived while the sustain pedal was down.
    pub sustained: bool,
    released: bool,
    region: Option<Region>,
    position: f64,
    base_cents: f32,
    velocity_gain: f32,
    filter_q: f32,
    vol_env: Envelope,
    mod_env: Envelope,
    mod_lfo: Lfo,
    vib_lfo: Lfo,
    filter: LowPassFilter,
}

impl Default for Voice {
    fn default() -> Self {
        Self::new()
    }
}

impl Voice {
    pub fn new() -> Self {
        Self {
            active: false,
            note: VoiceNote {
                channel: None,
                preset_index: 0,
                key: 0,
                velocity: 0.0,
                play_order: 0,
                note_id: 0,
            },
            sustained: false,
            released: false,
            region: None,
            position: 0.0,
            base_cents: 0.0,
            velocity_gain: 0.0,
            filter_q: 0.0,
            vol_env: Envelope::volume(),
            mod_env: Envelope::modulation(),
            mod_lfo: Lfo::default(),
            vib_lfo: Lfo::default(),
            filter: LowPassFilter::default(),
        }
    }

    /// Starts playing `region` for `note` at the output rate `sample_rate`.
    pub fn start(
        &mut self,
        note: VoiceNote,
        region: Region,
        tables: &SynthTables,
        sample_rate: f32,
    ) {
        use GeneratorKind::*;

        let velocity = region.velocity.unwrap_or(note.velocity);
        self.base_cents = (region.key as f32 - region.root_key as f32) * region.scale_tuning
            + region.tune_cents;
        self.velocity_gain = velocity * velocity;
        self.filter_q = resonance_to_q(region.filter_q_cb);
        self.position = region.start as f64;

        self.vol_env.start(&region.vol_env, region.key, sample_rate);
        self.mod_env.start(&region.mod_env, region.key, sample_rate);
        self.mod_lfo.start(
            tables,
            region.get(DelayModLfo),
            region.get(FreqModLfo),
            sample_rate,
        );
        self.vib_lfo.start(
            tables,
            region.get(DelayVibLfo),
            region.get(FreqVibLfo),
            sample_rate,
        );
        self.filter.reset();

        self.note = note;
        self.region = Some(region);
        self.released = false;
        self.sustained = false;
        self.active = true;
    }

    /// Frees the slot immediately.
    pub fn kill(&mut self) {
        self.active = false;
        self.released = false;
        self.sustained = false;
        self.region = None;
    }

    /// Enters the release stage of both envelopes.
    pub fn release(&mut self) {
        if !self.active || self.released {
            return;
        }
        self.released = true;
        self.sustained = false;
        self.vol_env.release();
        self.mod_env.release();
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn exclusive_class(&self) -> i32 {
        self.region.as_ref().map_or(0, |r| r.exclusive_class)
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn stage(&self) -> EnvelopeStage {
        self.vol_env.stage()
    }

    /// Orders voices from least to most important for stealing.
    ///
    /// Releasing voices go first, then sustaining, decaying, and voices still in
    /// their onset. Within a stage the quieter voice goes first, then the older one.
    pub fn cmp_importance(&self, other: &Voice) -> Ordering {
        stage_weight(self.stage())
            .cmp(&stage_weight(other.stage()))
            .then_with(|| {
                self.vol_env
                    .normalized()
                    .total_cmp(&other.vol_env.normalized())
            })
            .then_with(|| self.note.play_order.cmp(&other.note.play_order))
    }

    /// Adds the voice output for `left.len()` frames into the stereo scratch buffers.
    pub fn render(
        &mut self,
        pool: &[f32],
        control: &VoiceControl,
        tables: &SynthTables,
        sample_rate: f32,
        left: &mut [f32],
        right: &mut [f32],
    ) {
        use GeneratorKind::*;

        let Some(region) = self.region.as_ref() else {
            self.active = false;
            return;
        };
        let frames = left.len().min(right.len());
        let rate_ratio = region.sample_rate as f64 / sample_rate as f64;
        let loop_start = region.loop_start as f64;
        let loop_end = region.loop_end as f64;
        let end = region.end as f64;

        let mut offset = 0;
        while offset < frames && self.active {
            let block = (frames - offset).min(RENDER_BLOCK_FRAMES);

            let mod_lfo = self.mod_lfo.value(tables);
            let vib_lfo = self.vib_lfo.value(tables);
            let mod_env = self.mod_env.level();

            let pitch_cents = self.base_cents
                + control.pitch_cents
                + mod_lfo * region.get(ModLfoToPitch)
                + vib_lfo * region.get(VibLfoToPitch)
                + mod_env * region.get(ModEnvToPitch);
            let step = tables.cents_to_ratio(pitch_cents) as f64 * rate_ratio;

            let fc_cents = region.filter_fc_cents
                + mod_env * region.get(ModEnvToFilterFc)
                + mod_lfo * region.get(ModLfoToFilterFc);
            self.filter.set(
                sample_rate,
                fc_cents,
                tables.cents_to_hz(fc_cents),
                self.filter_q,
            );

            let volume_db = -region.attenuation_cb / 10.0 + mod_lfo * region.get(ModLfoToVolume) / 10.0;
            let gain = control.gain * self.velocity_gain * tables.db_to_gain(volume_db.min(0.0));

            let pan = (control.pan + region.pan).clamp(0.0, 1.0);
            let pan_left = (FRAC_PI_2 * pan).cos();
            let pan_right = (FRAC_PI_2 * pan).sin();

            let looping = match region.loop_mode {
                LoopMode::Continuous => true,
                LoopMode::UntilRelease => !self.released,
                LoopMode::None => false,
            };

            for i in offset..offset + block {
                let env_db = self.vol_env.next();
                if self.vol_env.is_finished() {
                    self.active = false;
                    break;
                }
                let amp = tables.db_to_gain(env_db) * gain;

                let index = self.position as usize;
                let frac = (self.position - index as f64) as f32;
                let mut next = index + 1;
                if looping && next >= region.loop_end {
                    next = region.loop_start;
                }
                let a = pool.get(index).copied().unwrap_or(0.0);
                let b = if next < region.end {
                    pool.get(next).copied().unwrap_or(a)
                } else {
                    a
                };
                let sample = self.filter.process(a + (b - a) * frac) * amp;

                left[i] += sample * pan_left;
                right[i] += sample * pan_right;

                self.position += step;
                if looping {
                    while self.position >= loop_end {
                        self.position -= loop_end - loop_start;
                    }
                } else if self.position >= end {
                    self.active = false;
                    break;
                }
            }

            self.mod_env.advance(block);
            self.mod_lfo.advance(block);
            self.vib_lfo.advance(block);
            offset += block;
        }

        if !self.active {
            self.kill();
        }
    }
}

fn stage_weight(stage: EnvelopeStage) -> u8 {
    match stage {
        EnvelopeStage::Done => 0,
        EnvelopeStage::Release => 1,
        EnvelopeStage::Sustain => 2,
        EnvelopeStage::Decay => 3,
        EnvelopeStage::Delay | EnvelopeStage::Attack | EnvelopeStage::Hold => 4,
    }
}
