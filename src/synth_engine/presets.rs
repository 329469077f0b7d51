//! Preset lookup by index or by (bank, number).

use crate::synth_engine::font::SoundFontData;

impl SoundFontData {
    pub fn preset_count(&self) -> usize {
        self.presets.len()
    }

    /// Index of the preset with this bank and number, if any.
    pub fn preset_index(&self, bank: i32, number: i32) -> Option<usize> {
        self.presets
            .iter()
            .position(|p| p.bank as i32 == bank && p.number as i32 == number)
    }

    /// Name of the preset at `index`; empty when the index is out of range.
    pub fn preset_name(&self, index: i32) -> &str {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.presets.get(i))
            .map_or("", |p| p.name.as_str())
    }

    /// Name of the preset with this bank and number; empty when there is none.
    pub fn bank_preset_name(&self, bank: i32, number: i32) -> &str {
        self.preset_index(bank, number)
            .map_or("", |i| self.presets[i].name.as_str())
    }
}
