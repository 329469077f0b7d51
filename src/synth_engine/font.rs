//! In-memory representation of a loaded SoundFont.
//!
//! Everything in here is immutable once the loader returns; engines share it
//! through an `Arc` so clones never copy sample data.

use crate::synth_engine::generators::{Generator, Range};
use crate::synth_engine::modulators::Modulator;

/// Sample header, with frame positions relative to [`SoundFontData::pool`].
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub start: usize,
    pub end: usize,
    pub loop_start: usize,
    pub loop_end: usize,
    pub sample_rate: u32,
    pub original_pitch: u8,
    pub pitch_correction: i8,
    pub sample_type: u16,
}

/// A preset or instrument zone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Zone {
    pub generators: Vec<Generator>,
    pub modulators: Vec<Modulator>,
    pub key_range: Option<Range>,
    pub vel_range: Option<Range>,
    /// Instrument index for preset zones, sample index for instrument zones.
    pub link: Option<usize>,
}

impl Zone {
    /// Whether this zone (with the level's global zone as fallback) covers the note.
    pub fn matches(&self, global: Option<&Zone>, key: u8, velocity: u8) -> bool {
        let key_range = self
            .key_range
            .or_else(|| global.and_then(|g| g.key_range))
            .unwrap_or(Range::FULL);
        let vel_range = self
            .vel_range
            .or_else(|| global.and_then(|g| g.vel_range))
            .unwrap_or(Range::FULL);

        key_range.contains(key) && vel_range.contains(velocity)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instrument {
    pub name: String,
    pub global: Option<Zone>,
    pub zones: Vec<Zone>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Preset {
    pub name: String,
    pub bank: u16,
    pub number: u16,
    pub global: Option<Zone>,
    pub zones: Vec<Zone>,
}

/// Parsed SoundFont: hydra tables plus the decoded sample pool.
#[derive(Debug, Clone)]
pub struct SoundFontData {
    /// Bank name from the `INAM` info chunk.
    pub name: String,
    /// Format version from the `ifil` info chunk.
    pub version: (u16, u16),
    /// Presets ordered by bank, then preset number.
    pub presets: Vec<Preset>,
    pub instruments: Vec<Instrument>,
    pub samples: Vec<Sample>,
    /// Mono sample frames normalized to -1.0..1.0.
    pub pool: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(key: Option<(u8, u8)>, vel: Option<(u8, u8)>) -> Zone {
        Zone {
            key_range: key.map(|(lo, hi)| Range { lo, hi }),
            vel_range: vel.map(|(lo, hi)| Range { lo, hi }),
            ..Zone::default()
        }
    }

    #[test]
    fn test_zone_without_ranges_matches_everything() {
        let z = zone(None, None);
        assert!(z.matches(None, 0, 0));
        assert!(z.matches(None, 127, 127));
    }

    #[test]
    fn test_zone_ranges() {
        let z = zone(Some((60, 72)), Some((1, 64)));
        assert!(z.matches(None, 60, 64));
        assert!(!z.matches(None, 59, 64));
        assert!(!z.matches(None, 60, 65));
    }

    #[test]
    fn test_zone_falls_back_to_global_range() {
        let global = zone(Some((36, 48)), None);
        let z = zone(None, None);
        assert!(z.matches(Some(&global), 40, 100));
        assert!(!z.matches(Some(&global), 60, 100));

        let own = zone(Some((60, 60)), None);
        assert!(own.matches(Some(&global), 60, 100));
    }
}
