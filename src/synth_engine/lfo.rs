//! Table-driven sine LFO used for the modulation and vibrato LFOs.

use crate::synth_engine::tables::{SynthTables, timecents_to_seconds};

/// SF2 limits for LFO frequency in absolute cents (about 0.001 Hz to 100 Hz).
const MIN_FREQ_CENTS: f32 = -16_000.0;
const MAX_FREQ_CENTS: f32 = 4_500.0;

#[derive(Debug, Clone, Default)]
pub struct Lfo {
    delay: usize,
    phase: f32,
    increment: f32,
}

impl Lfo {
    /// Restarts the LFO with a delay in timecents and a frequency in absolute cents.
    pub fn start(&mut self, tables: &SynthTables, delay_tc: f32, freq_cents: f32, sample_rate: f32) {
        let hz = tables.cents_to_hz(freq_cents.clamp(MIN_FREQ_CENTS, MAX_FREQ_CENTS));
        self.delay = (timecents_to_seconds(delay_tc) * sample_rate).round() as usize;
        self.phase = 0.0;
        self.increment = hz / sample_rate;
    }

    /// Current output in -1..1; zero while delayed.
    pub fn value(&self, tables: &SynthTables) -> f32 {
        if self.delay > 0 {
            return 0.0;
        }
        tables.sine(self.phase)
    }

    pub fn advance(&mut self, frames: usize) {
        let delayed = frames.min(self.delay);
        self.delay -= delayed;
        let running = frames - delayed;
        self.phase = (self.phase + self.increment * running as f32).fract();
    }
}
