//! SF2 modulators evaluated once per note-on.
//!
//! Only sources known at note-on time (none, velocity, key) are evaluated.
//! Modulators driven by continuous controllers, pressure or the pitch wheel are
//! kept in the zone but contribute nothing.

use crate::synth_engine::generators::{GeneratorKind, GeneratorSet};

const SOURCE_INDEX_MASK: u16 = 0x007F;
const SOURCE_CC_FLAG: u16 = 0x0080;
const SOURCE_DIRECTION_FLAG: u16 = 0x0100;
const SOURCE_POLARITY_FLAG: u16 = 0x0200;
const SOURCE_TYPE_SHIFT: u16 = 10;

const GENERAL_NO_CONTROLLER: u16 = 0;
const GENERAL_NOTE_ON_VELOCITY: u16 = 2;
const GENERAL_NOTE_ON_KEY: u16 = 3;

const TRANSFORM_ABSOLUTE: u16 = 2;
const DESTINATION_LINK_FLAG: u16 = 0x8000;

/// One modulator record (`pmod`/`imod`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modulator {
    pub source: u16,
    pub destination: u16,
    pub amount: i16,
    pub amount_source: u16,
    pub transform: u16,
}

impl Modulator {
    /// Parses a 10-byte modulator record.
    pub fn from_record(record: &[u8]) -> Self {
        let u16_at = |at: usize| u16::from_le_bytes([record[at], record[at + 1]]);
        Self {
            source: u16_at(0),
            destination: u16_at(2),
            amount: u16_at(4) as i16,
            amount_source: u16_at(6),
            transform: u16_at(8),
        }
    }

    /// Two modulators are identical when everything but the amount matches.
    pub fn is_identical(&self, other: &Modulator) -> bool {
        self.source == other.source
            && self.destination == other.destination
            && self.amount_source == other.amount_source
            && self.transform == other.transform
    }

    /// Contribution to the destination generator for a note, or `None` when the
    /// modulator cannot be evaluated at note-on.
    pub fn evaluate(&self, key: u8, velocity: u8) -> Option<(GeneratorKind, f32)> {
        if self.destination & DESTINATION_LINK_FLAG != 0 {
            return None;
        }
        let destination = GeneratorKind::from_raw(self.destination)?;
        let source = source_value(self.source, key, velocity)?;
        let amount_source = source_value(self.amount_source, key, velocity)?;

        let mut value = self.amount as f32 * source * amount_source;
        if self.transform == TRANSFORM_ABSOLUTE {
            value = value.abs();
        }
        Some((destination, value))
    }
}

/// Combines a global and a local modulator list; local entries replace identical globals.
pub fn merge(global: &[Modulator], local: &[Modulator]) -> Vec<Modulator> {
    let mut merged: Vec<Modulator> = global
        .iter()
        .filter(|g| !local.iter().any(|l| l.is_identical(g)))
        .copied()
        .collect();
    merged.extend_from_slice(local);
    merged
}

/// Adds the note-on contributions of `modulators` to `generators`.
pub fn apply(modulators: &[Modulator], key: u8, velocity: u8, generators: &mut GeneratorSet) {
    for modulator in modulators {
        if let Some((kind, value)) = modulator.evaluate(key, velocity) {
            generators.add(kind, value.round() as i32);
        }
    }
}

/// Normalized source value, or `None` for sources not known at note-on.
fn source_value(source: u16, key: u8, velocity: u8) -> Option<f32> {
    if source & SOURCE_CC_FLAG != 0 {
        return None;
    }
    let raw = match source & SOURCE_INDEX_MASK {
        GENERAL_NO_CONTROLLER => return Some(1.0),
        GENERAL_NOTE_ON_VELOCITY => velocity,
        GENERAL_NOTE_ON_KEY => key,
        _ => return None,
    };

    let mut x = raw as f32 / 128.0;
    if source & SOURCE_DIRECTION_FLAG != 0 {
        x = 1.0 - x;
    }
    let y = match source >> SOURCE_TYPE_SHIFT {
        0 => x,
        1 => concave(x),
        2 => 1.0 - concave(1.0 - x),
        3 => {
            if x >= 0.5 {
                1.0
            } else {
                0.0
            }
        }
        _ => return None,
    };

    if source & SOURCE_POLARITY_FLAG != 0 {
        Some(2.0 * y - 1.0)
    } else {
        Some(y)
    }
}

fn concave(x: f32) -> f32 {
    if x >= 1.0 {
        return 1.0;
    }
    (-(20.0 / 96.0) * (1.0 - x).powi(2).log10()).clamp(0.0, 1.0)
}
