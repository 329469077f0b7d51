//! Shared lookup tables for the voice DSP.
//!
//! The tables are built once per process and handed out as `&'static`, so every
//! engine and every clone reads the same immutable data.

use std::f32::consts::TAU;
use std::sync::OnceLock;

use crate::synth_engine::constants::{CENT_ZERO_HZ, ENVELOPE_FLOOR_DB};

const SINE_TABLE_SIZE: usize = 1024;
const CENTS_PER_OCTAVE: usize = 1200;

/// Cents per decibel of amplitude: 1200 * log2(10) / 20.
const CENTS_PER_DB: f32 = 199.315_69;

static TABLES: OnceLock<SynthTables> = OnceLock::new();

/// Sine and cent-to-ratio lookup tables.
pub struct SynthTables {
    sine: Vec<f32>,
    octave: Vec<f32>,
}

/// Returns the process-wide tables, building them on first use.
pub fn tables() -> &'static SynthTables {
    TABLES.get_or_init(SynthTables::build)
}

impl SynthTables {
    fn build() -> Self {
        // One guard entry at the end of each table for interpolation.
        let sine = (0..=SINE_TABLE_SIZE)
            .map(|i| (TAU * i as f32 / SINE_TABLE_SIZE as f32).sin())
            .collect();
        let octave = (0..=CENTS_PER_OCTAVE)
            .map(|i| 2.0_f64.powf(i as f64 / CENTS_PER_OCTAVE as f64) as f32)
            .collect();
        Self { sine, octave }
    }

    /// Sine of `phase` given in cycles (only the fractional part matters).
    pub fn sine(&self, phase: f32) -> f32 {
        let pos = phase.rem_euclid(1.0) * SINE_TABLE_SIZE as f32;
        let index = (pos as usize).min(SINE_TABLE_SIZE - 1);
        let frac = pos - index as f32;
        let a = self.sine[index];
        let b = self.sine[index + 1];
        a + (b - a) * frac
    }

    /// Frequency ratio of an interval in cents, i.e. `2^(cents / 1200)`.
    pub fn cents_to_ratio(&self, cents: f32) -> f32 {
        if !cents.is_finite() {
            return 1.0;
        }
        let octaves = (cents / CENTS_PER_OCTAVE as f32).floor();
        let rest = cents - octaves * CENTS_PER_OCTAVE as f32;
        let index = (rest as usize).min(CENTS_PER_OCTAVE - 1);
        let frac = rest - index as f32;
        let a = self.octave[index];
        let b = self.octave[index + 1];
        (a + (b - a) * frac) * 2.0_f32.powi(octaves as i32)
    }

    /// Absolute cents (cent 0 = MIDI key 0) to Hz.
    pub fn cents_to_hz(&self, cents: f32) -> f32 {
        CENT_ZERO_HZ * self.cents_to_ratio(cents)
    }

    /// Decibels to linear amplitude; the envelope floor and below map to silence.
    pub fn db_to_gain(&self, db: f32) -> f32 {
        if db <= ENVELOPE_FLOOR_DB {
            return 0.0;
        }
        self.cents_to_ratio(db * CENTS_PER_DB)
    }
}

/// SF2 timecents to seconds. The minimum value (-12000 and below) means "instant".
pub fn timecents_to_seconds(timecents: f32) -> f32 {
    if timecents <= -12_000.0 {
        return 0.0;
    }
    2.0_f32.powf(timecents / 1200.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_are_shared() {
        assert!(std::ptr::eq(tables(), tables()));
    }

    #[test]
    fn test_sine() {
        let t = tables();
        assert!(t.sine(0.0).abs() < 1e-6);
        assert!((t.sine(0.25) - 1.0).abs() < 1e-4);
        assert!((t.sine(0.75) + 1.0).abs() < 1e-4);
        assert!((t.sine(1.25) - 1.0).abs() < 1e-4);
        assert!((t.sine(0.1) - (TAU * 0.1).sin()).abs() < 1e-4);
    }

    #[test]
    fn test_cents_to_ratio() {
        let t = tables();
        assert!((t.cents_to_ratio(0.0) - 1.0).abs() < 1e-6);
        assert!((t.cents_to_ratio(1200.0) - 2.0).abs() < 1e-5);
        assert!((t.cents_to_ratio(-1200.0) - 0.5).abs() < 1e-6);
        assert!((t.cents_to_ratio(700.0) - 1.498_307).abs() < 1e-5);
        assert!((t.cents_to_ratio(-250.5) - 2.0_f32.powf(-250.5 / 1200.0)).abs() < 1e-5);
    }

    #[test]
    fn test_cents_to_hz() {
        let t = tables();
        // Key 69 is A440.
        assert!((t.cents_to_hz(6900.0) - 440.0).abs() < 0.01);
    }

    #[test]
    fn test_db_to_gain() {
        let t = tables();
        assert_eq!(t.db_to_gain(-100.0), 0.0);
        assert!((t.db_to_gain(0.0) - 1.0).abs() < 1e-6);
        assert!((t.db_to_gain(-6.0) - 0.501_187).abs() < 1e-4);
        assert!((t.db_to_gain(-40.0) - 0.01).abs() < 1e-5);
    }

    #[test]
    fn test_timecents() {
        assert_eq!(timecents_to_seconds(-12_000.0), 0.0);
        assert!((timecents_to_seconds(0.0) - 1.0).abs() < 1e-6);
        assert!((timecents_to_seconds(1200.0) - 2.0).abs() < 1e-5);
    }
}
