//! Resonant two-pole low-pass filter applied per voice.

use std::f32::consts::PI;

use crate::synth_engine::constants::FILTER_BYPASS_HZ;

/// Cutoffs at or above this many absolute cents leave the filter open.
pub const FILTER_OPEN_CENTS: f32 = 13_500.0;

/// Normalized coefficients of a two-pole low-pass section (`a0` divided out).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

impl Default for BiquadCoeffs {
    /// Pass-through.
    fn default() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }
}

impl BiquadCoeffs {
    /// RBJ low-pass at `cutoff_hz`, kept below 0.45 of the sample rate.
    ///
    /// Falls back to pass-through if the design is numerically unusable.
    pub fn low_pass(fs_hz: f32, cutoff_hz: f32, q: f32) -> Self {
        let ceiling = (fs_hz * 0.45).max(1.0);
        let omega = 2.0 * PI * cutoff_hz.clamp(1.0, ceiling) / fs_hz;
        let (sin, cos) = omega.sin_cos();
        let alpha = sin / (2.0 * q.max(0.01));

        let norm = 1.0 / (1.0 + alpha);
        let coeffs = Self {
            b0: (1.0 - cos) * 0.5 * norm,
            b1: (1.0 - cos) * norm,
            b2: (1.0 - cos) * 0.5 * norm,
            a1: -2.0 * cos * norm,
            a2: (1.0 - alpha) * norm,
        };
        let finite = [coeffs.b0, coeffs.b1, coeffs.b2, coeffs.a1, coeffs.a2]
            .into_iter()
            .all(f32::is_finite);
        if finite { coeffs } else { Self::default() }
    }
}

/// Transposed direct form II memory.
#[derive(Debug, Clone, Copy, Default)]
struct FilterMemory {
    s1: f32,
    s2: f32,
}

impl FilterMemory {
    fn tick(&mut self, c: &BiquadCoeffs, input: f32) -> f32 {
        let output = c.b0 * input + self.s1;
        self.s1 = c.b1 * input - c.a1 * output + self.s2;
        self.s2 = c.b2 * input - c.a2 * output;
        output
    }
}

/// Converts the SF2 `initialFilterQ` (centibels of resonance) into a biquad Q.
pub fn resonance_to_q(q_cb: f32) -> f32 {
    10.0_f32.powf(q_cb.max(0.0) / 200.0) * std::f32::consts::FRAC_1_SQRT_2
}

/// Low-pass filter with on-the-fly cutoff updates.
#[derive(Debug, Clone, Default)]
pub struct LowPassFilter {
    coeffs: BiquadCoeffs,
    memory: FilterMemory,
    active: bool,
    cutoff_hz: f32,
    q: f32,
}

impl LowPassFilter {
    pub fn reset(&mut self) {
        self.memory = FilterMemory::default();
        self.active = false;
    }

    #[cfg(test)]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Updates the cutoff; the filter is bypassed when it is fully open.
    pub fn set(&mut self, fs_hz: f32, cutoff_cents: f32, cutoff_hz: f32, q: f32) {
        let open = cutoff_cents >= FILTER_OPEN_CENTS || cutoff_hz >= FILTER_BYPASS_HZ;
        if open {
            if self.active {
                self.active = false;
                self.memory = FilterMemory::default();
            }
            return;
        }
        if self.active && cutoff_hz == self.cutoff_hz && q == self.q {
            return;
        }
        self.coeffs = BiquadCoeffs::low_pass(fs_hz, cutoff_hz, q);
        self.cutoff_hz = cutoff_hz;
        self.q = q;
        self.active = true;
    }

    pub fn process(&mut self, x: f32) -> f32 {
        if !self.active {
            return x;
        }
        self.memory.tick(&self.coeffs, x)
    }
}
