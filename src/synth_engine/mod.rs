//! SoundFont Synthesis Engine
//!
//! This module turns SoundFont files into audio. It is organized into
//! sub-modules, each with a specific responsibility:
//!
//! - [`riff`], [`loader`], [`sf3`]: container parsing, hydra validation, sample decoding
//! - [`font`], [`generators`], [`modulators`], [`presets`]: the loaded SoundFont model
//! - [`region`]: merging preset and instrument zones for a note
//! - [`voice`], [`envelope`], [`lfo`], [`filter`], [`tables`]: per-voice DSP
//! - [`voice_pool`], [`channels`], [`mixer`]: polyphony, MIDI channel state, render loop
//! - [`synth_core`], [`audio_stream`]: several engines driven by a live output stream
//!
//! The main [`Engine`] struct ties these together behind a note/channel event
//! API and a `render` call that fills a float buffer.

use std::path::Path;
use std::sync::Arc;

use crate::synth_engine::channels::{Channel, Channels};
use crate::synth_engine::constants::{
    DEFAULT_MAX_VOICES, DRUM_BANK, DRUM_CHANNEL, MIDI_14BIT_MAX, MIDI_MAX, NUM_CHANNELS,
    SAMPLE_RATE_MAX, SAMPLE_RATE_MIN, VOLUME_MAX, VOLUME_MIN,
};
use crate::synth_engine::errors::{BufferError, EventError, LoadError};
use crate::synth_engine::font::SoundFontData;
use crate::synth_engine::mixer::{Mixer, OutputConfig, OutputMode};
use crate::synth_engine::region::resolve_regions;
use crate::synth_engine::tables::{SynthTables, tables};
use crate::synth_engine::voice::{Voice, VoiceNote};
use crate::synth_engine::voice_pool::VoicePool;

pub mod audio_stream;
pub mod channels;
pub mod constants;
pub mod envelope;
pub mod errors;
pub mod filter;
pub mod font;
pub mod generators;
pub mod lfo;
pub mod loader;
pub mod mixer;
pub mod modulators;
pub mod presets;
pub mod region;
pub mod riff;
pub mod sf3;
pub mod synth_core;
pub mod tables;
#[cfg(test)]
pub(crate) mod test_support;
pub mod voice;
pub mod voice_pool;

/// A SoundFont synthesizer instance.
///
/// Font data is shared between clones; channels, voices and output settings
/// belong to each instance.
pub struct Engine {
    font: Arc<SoundFontData>,
    tables: &'static SynthTables,
    channels: Channels,
    voices: VoicePool,
    mixer: Mixer,
    next_note_id: u64,
}

impl Clone for Engine {
    /// Returns an engine sharing the font and output configuration, with no
    /// playing voices and channels at their defaults.
    fn clone(&self) -> Self {
        let mut engine = Self::with_font(Arc::clone(&self.font));
        engine.mixer.output = self.mixer.output;
        engine.voices.resize(self.voices.capacity());
        engine
    }
}

fn midi_key(key: i32) -> Result<u8, EventError> {
    u8::try_from(key)
        .ok()
        .filter(|k| *k <= MIDI_MAX)
        .ok_or(EventError::InvalidKey(key))
}

fn finite(name: &'static str, value: f32) -> Result<f32, EventError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EventError::InvalidValue { name, value })
    }
}

fn bank_number(bank: i32) -> Result<u16, EventError> {
    u16::try_from(bank).map_err(|_| EventError::InvalidValue {
        name: "bank",
        value: bank as f32,
    })
}

fn midi_data(name: &'static str, value: i32) -> Result<u8, EventError> {
    u8::try_from(value)
        .ok()
        .filter(|v| *v <= MIDI_MAX)
        .ok_or(EventError::InvalidValue {
            name,
            value: value as f32,
        })
}

impl Engine {
    /// Loads a SoundFont from a file.
    pub fn from_file(path: &Path) -> Result<Self, LoadError> {
        let font = loader::load_file(path)?;
        Ok(Self::with_font(Arc::new(font)))
    }

    /// Loads a SoundFont from memory.
    pub fn from_bytes(data: &[u8]) -> Result<Self, LoadError> {
        let font = loader::load_bytes(data)?;
        Ok(Self::with_font(Arc::new(font)))
    }

    fn with_font(font: Arc<SoundFontData>) -> Self {
        let channels = default_channels(&font);
        Self {
            font,
            tables: tables(),
            channels,
            voices: VoicePool::new(DEFAULT_MAX_VOICES),
            mixer: Mixer::new(OutputConfig::default()),
            next_note_id: 0,
        }
    }

    pub fn output(&self) -> OutputConfig {
        self.mixer.output
    }

    // ---- Preset queries ----

    pub fn preset_count(&self) -> usize {
        self.font.preset_count()
    }

    /// Preset index for (bank, number), or -1.
    pub fn preset_index(&self, bank: i32, number: i32) -> i32 {
        self.font
            .preset_index(bank, number)
            .map_or(-1, |i| i as i32)
    }

    pub fn preset_name(&self, index: i32) -> &str {
        self.font.preset_name(index)
    }

    pub fn bank_preset_name(&self, bank: i32, number: i32) -> &str {
        self.font.bank_preset_name(bank, number)
    }

    // ---- Configuration ----

    /// Sets output layout, sample rate and global gain in dB.
    pub fn set_output(
        &mut self,
        mode: OutputMode,
        sample_rate: i32,
        gain_db: f32,
    ) -> Result<(), EventError> {
        let rate = u32::try_from(sample_rate)
            .ok()
            .filter(|r| (SAMPLE_RATE_MIN..=SAMPLE_RATE_MAX).contains(r))
            .ok_or(EventError::InvalidValue {
                name: "sample rate",
                value: sample_rate as f32,
            })?;
        let gain_db = finite("global gain", gain_db)?;

        log::debug!(
            "Output set to {:?} at {} Hz, {:+.1} dB",
            mode,
            rate,
            gain_db
        );
        self.mixer.output = OutputConfig {
            mode,
            sample_rate: rate,
            gain_db,
        };
        Ok(())
    }

    /// Sets the global gain as a linear scalar (1.0 = 0 dB).
    pub fn set_volume(&mut self, volume: f32) -> Result<(), EventError> {
        let volume = finite("volume", volume)?.clamp(VOLUME_MIN, VOLUME_MAX);
        self.mixer.output.gain_db = 20.0 * volume.log10();
        Ok(())
    }

    pub fn set_max_voices(&mut self, max_voices: usize) {
        self.voices.resize(max_voices);
    }

    #[cfg(test)]
    pub fn max_voices(&self) -> usize {
        self.voices.capacity()
    }

    /// Stops all voices and restores every channel to its defaults.
    pub fn reset(&mut self) {
        log::debug!("Resetting engine");
        self.voices.kill_all();
        self.channels = default_channels(&self.font);
    }

    pub fn active_voice_count(&self) -> usize {
        self.voices.active_count()
    }

    // ---- Preset-indexed events ----

    /// Plays a note on the preset at `index`.
    ///
    /// # Returns
    ///
    /// - `Ok(usize)`: Number of voices started (0 when the velocity is 0, which releases the note)
    /// - `Err(EventError)`: Bad index, key or velocity, or no region covers the note
    pub fn note_on_by_index(
        &mut self,
        index: i32,
        key: i32,
        velocity: f32,
    ) -> Result<usize, EventError> {
        let preset = usize::try_from(index)
            .ok()
            .filter(|i| *i < self.font.preset_count())
            .ok_or(EventError::InvalidPresetIndex(index))?;
        let key_u8 = midi_key(key)?;
        let velocity = finite("velocity", velocity)?.clamp(0.0, 1.0);

        if velocity <= 0.0 {
            self.release_where(false, |v| {
                v.note.channel.is_none() && v.note.preset_index == preset && v.note.key == key_u8
            });
            return Ok(0);
        }

        let started = self.start_note(preset, None, key_u8, velocity);
        if started == 0 {
            return Err(EventError::NoVoiceStarted { key });
        }
        Ok(started)
    }

    pub fn note_on_by_bank_preset(
        &mut self,
        bank: i32,
        number: i32,
        key: i32,
        velocity: f32,
    ) -> Result<usize, EventError> {
        let index = self.lookup(bank, number)?;
        self.note_on_by_index(index as i32, key, velocity)
    }

    /// Releases every playing voice.
    pub fn note_off_all(&mut self) {
        self.release_where(false, |_| true);
    }

    /// Releases direct-play voices of preset `index` started for `key`.
    pub fn note_off_by_index(&mut self, index: i32, key: i32) -> Result<(), EventError> {
        let preset = usize::try_from(index)
            .ok()
            .filter(|i| *i < self.font.preset_count())
            .ok_or(EventError::InvalidPresetIndex(index))?;
        let key = midi_key(key)?;
        self.release_where(false, |v| {
            v.note.channel.is_none() && v.note.preset_index == preset && v.note.key == key
        });
        Ok(())
    }

    pub fn note_off_by_bank_preset(
        &mut self,
        bank: i32,
        number: i32,
        key: i32,
    ) -> Result<(), EventError> {
        let index = self.lookup(bank, number)?;
        self.note_off_by_index(index as i32, key)
    }

    // ---- Channel events ----

    pub fn set_channel_preset_index(&mut self, channel: usize, index: i32) -> Result<(), EventError> {
        let preset = usize::try_from(index)
            .ok()
            .filter(|i| *i < self.font.preset_count())
            .ok_or(EventError::InvalidPresetIndex(index))?;
        let (bank, number) = {
            let p = &self.font.presets[preset];
            (p.bank, p.number)
        };
        let c = self.channels.get_mut(channel)?;
        c.preset_index = Some(preset);
        c.bank = bank;
        c.preset_number = number;
        Ok(())
    }

    /// Selects a preset by number in the channel's bank, or the drum bank when `drum` is set.
    ///
    /// Falls back like General MIDI players do: drum kits try (128, number), then
    /// (128, 0), then the channel bank; every lookup finally tries bank 0.
    pub fn set_channel_preset_number(
        &mut self,
        channel: usize,
        number: i32,
        drum: bool,
    ) -> Result<(), EventError> {
        let bank = self.channels.get(channel)?.bank;
        let preset = self.resolve_preset_number(bank, number, drum)?;
        self.commit_preset_number(channel, bank, preset, number, drum)
    }

    /// Sets the bank and selects a preset number in one step.
    ///
    /// The channel is left untouched when no preset matches.
    pub fn set_channel_bank_preset_number(
        &mut self,
        channel: usize,
        bank: i32,
        number: i32,
        drum: bool,
    ) -> Result<(), EventError> {
        self.channels.get(channel)?;
        let bank = bank_number(bank)?;
        let preset = self.resolve_preset_number(bank, number, drum)?;
        self.commit_preset_number(channel, bank, preset, number, drum)
    }

    pub fn set_channel_bank(&mut self, channel: usize, bank: i32) -> Result<(), EventError> {
        let bank = bank_number(bank)?;
        self.channels.get_mut(channel)?.bank = bank;
        Ok(())
    }

    pub fn set_channel_bank_preset(
        &mut self,
        channel: usize,
        bank: i32,
        number: i32,
    ) -> Result<(), EventError> {
        self.channels.get(channel)?;
        let preset = self.lookup(bank, number)?;
        let c = self.channels.get_mut(channel)?;
        c.preset_index = Some(preset);
        c.bank = bank as u16;
        c.preset_number = number as u16;
        Ok(())
    }

    pub fn set_channel_pan(&mut self, channel: usize, pan: f32) -> Result<(), EventError> {
        let pan = finite("pan", pan)?.clamp(0.0, 1.0);
        self.channels.get_mut(channel)?.pan = pan;
        Ok(())
    }

    pub fn set_channel_volume(&mut self, channel: usize, volume: f32) -> Result<(), EventError> {
        let volume = finite("volume", volume)?.clamp(VOLUME_MIN, VOLUME_MAX);
        self.channels.get_mut(channel)?.volume = volume;
        Ok(())
    }

    /// Sets the 14-bit pitch wheel position; values are clamped to 0..=16383.
    pub fn set_channel_pitch_wheel(&mut self, channel: usize, value: i32) -> Result<(), EventError> {
        let value = value.clamp(0, MIDI_14BIT_MAX as i32) as u16;
        self.channels.get_mut(channel)?.pitch_wheel = value;
        Ok(())
    }

    pub fn set_channel_pitch_range(&mut self, channel: usize, semitones: f32) -> Result<(), EventError> {
        let semitones = finite("pitch range", semitones)?;
        self.channels.get_mut(channel)?.pitch_range = semitones;
        Ok(())
    }

    pub fn set_channel_tuning(&mut self, channel: usize, semitones: f32) -> Result<(), EventError> {
        let semitones = finite("tuning", semitones)?;
        self.channels.get_mut(channel)?.tuning = semitones;
        Ok(())
    }

    /// Plays a note through the channel's preset. Silent when no preset is bound.
    pub fn channel_note_on(
        &mut self,
        channel: usize,
        key: i32,
        velocity: f32,
    ) -> Result<usize, EventError> {
        let preset = self.channels.get(channel)?.preset_index;
        let key = midi_key(key)?;
        let velocity = finite("velocity", velocity)?.clamp(0.0, 1.0);

        if velocity <= 0.0 {
            self.channel_release_key(channel, key)?;
            return Ok(0);
        }
        let Some(preset) = preset else {
            return Ok(0);
        };
        Ok(self.start_note(preset, Some(channel), key, velocity))
    }

    pub fn channel_note_off(&mut self, channel: usize, key: i32) -> Result<(), EventError> {
        self.channels.get(channel)?;
        let key = midi_key(key)?;
        self.channel_release_key(channel, key)
    }

    pub fn channel_note_off_all(&mut self, channel: usize) -> Result<(), EventError> {
        let sustain = self.channels.get(channel)?.sustain;
        self.release_where(sustain, |v| v.note.channel == Some(channel));
        Ok(())
    }

    /// Stops every voice of the channel without a release tail.
    pub fn channel_sounds_off(&mut self, channel: usize) -> Result<(), EventError> {
        self.channels.get(channel)?;
        for voice in self.voices.iter_mut() {
            if voice.note.channel == Some(channel) {
                voice.kill();
            }
        }
        Ok(())
    }

    /// Applies a MIDI control change.
    ///
    /// Handles bank select, volume, pan, expression, sustain pedal, the pitch
    /// bend range and tuning RPNs, and the channel mode messages 120, 121 and 123.
    /// Other controllers are accepted and ignored.
    pub fn channel_midi_control(
        &mut self,
        channel: usize,
        controller: i32,
        value: i32,
    ) -> Result<(), EventError> {
        self.channels.get(channel)?;
        let controller = midi_data("controller", controller)?;
        let value = midi_data("controller value", value)? as u16;

        let c = self.channels.get_mut(channel)?;
        match controller {
            0 => c.bank = value,
            6 => match c.rpn {
                0 => c.pitch_range = value as f32 + c.pitch_range.fract(),
                1 => c.tuning = c.tuning.trunc() + (value as f32 - 64.0) / 64.0,
                2 => c.tuning = (value as f32 - 64.0) + c.tuning.fract(),
                _ => {}
            },
            7 => c.midi_volume = (value << 7) | (c.midi_volume & 0x7F),
            39 => c.midi_volume = (c.midi_volume & 0x3F80) | value,
            10 => c.pan = value as f32 / MIDI_MAX as f32,
            11 => c.midi_expression = (value << 7) | (c.midi_expression & 0x7F),
            43 => c.midi_expression = (c.midi_expression & 0x3F80) | value,
            38 => {
                if c.rpn == 0 {
                    c.pitch_range = c.pitch_range.trunc() + value as f32 / 100.0;
                }
            }
            64 => {
                let on = value >= 64;
                c.sustain = on;
                if !on {
                    self.release_where(false, |v| {
                        v.note.channel == Some(channel) && v.sustained
                    });
                }
            }
            98 | 99 => c.rpn = channels::RPN_NONE,
            100 => c.rpn = (c.rpn & 0x3F80) | value,
            101 => c.rpn = (value << 7) | (c.rpn & 0x7F),
            120 => self.channel_sounds_off(channel)?,
            121 => c.reset_controllers(),
            123 => self.channel_note_off_all(channel)?,
            _ => {}
        }
        Ok(())
    }

    // ---- Channel getters ----

    fn channel(&self, channel: usize) -> Result<&Channel, EventError> {
        self.channels.get(channel)
    }

    /// Bound preset index, or -1.
    pub fn channel_preset_index(&self, channel: usize) -> Result<i32, EventError> {
        Ok(self.channel(channel)?.preset_index.map_or(-1, |i| i as i32))
    }

    pub fn channel_preset_bank(&self, channel: usize) -> Result<i32, EventError> {
        let c = self.channel(channel)?;
        Ok(c
            .preset_index
            .and_then(|i| self.font.presets.get(i))
            .map_or(c.bank, |p| p.bank) as i32)
    }

    pub fn channel_preset_number(&self, channel: usize) -> Result<i32, EventError> {
        let c = self.channel(channel)?;
        Ok(c
            .preset_index
            .and_then(|i| self.font.presets.get(i))
            .map_or(c.preset_number, |p| p.number) as i32)
    }

    pub fn channel_pan(&self, channel: usize) -> Result<f32, EventError> {
        Ok(self.channel(channel)?.pan)
    }

    pub fn channel_volume(&self, channel: usize) -> Result<f32, EventError> {
        Ok(self.channel(channel)?.volume)
    }

    pub fn channel_pitch_wheel(&self, channel: usize) -> Result<i32, EventError> {
        Ok(self.channel(channel)?.pitch_wheel as i32)
    }

    pub fn channel_pitch_range(&self, channel: usize) -> Result<f32, EventError> {
        Ok(self.channel(channel)?.pitch_range)
    }

    pub fn channel_tuning(&self, channel: usize) -> Result<f32, EventError> {
        Ok(self.channel(channel)?.tuning)
    }

    // ---- Rendering ----

    /// Renders `buffer.len() / channels` frames in the configured layout.
    ///
    /// With `mix` the output is added to the buffer, otherwise it replaces it.
    pub fn render(&mut self, buffer: &mut [f32], mix: bool) -> Result<usize, BufferError> {
        self.mixer.render(
            &mut self.voices,
            &self.channels,
            &self.font.pool,
            self.tables,
            buffer,
            mix,
        )
    }

    // ---- Internals ----

    fn lookup(&self, bank: i32, number: i32) -> Result<usize, EventError> {
        self.font
            .preset_index(bank, number)
            .ok_or(EventError::UnknownPreset { bank, number })
    }

    fn resolve_preset_number(&self, bank: u16, number: i32, drum: bool) -> Result<usize, EventError> {
        let bank = bank as i32;
        let mut candidates = Vec::with_capacity(4);
        if drum {
            candidates.extend([(DRUM_BANK as i32, number), (DRUM_BANK as i32, 0)]);
        }
        candidates.extend([(bank, number), (0, number)]);

        candidates
            .iter()
            .find_map(|&(b, n)| self.font.preset_index(b, n))
            .ok_or(EventError::UnknownPreset {
                bank: if drum { DRUM_BANK as i32 } else { bank },
                number,
            })
    }

    fn commit_preset_number(
        &mut self,
        channel: usize,
        bank: u16,
        preset: usize,
        number: i32,
        drum: bool,
    ) -> Result<(), EventError> {
        let c = self.channels.get_mut(channel)?;
        c.preset_index = Some(preset);
        c.drum = drum;
        c.preset_number = number as u16;
        c.bank = if drum { DRUM_BANK } else { bank };
        Ok(())
    }

    fn start_note(
        &mut self,
        preset_index: usize,
        channel: Option<usize>,
        key: u8,
        velocity: f32,
    ) -> usize {
        let midi_velocity = (velocity * MIDI_MAX as f32).round() as u8;
        let regions = resolve_regions(&self.font, preset_index, key, midi_velocity);

        self.next_note_id += 1;
        let note_id = self.next_note_id;
        let sample_rate = self.mixer.output.sample_rate as f32;

        let mut started = 0;
        for region in regions {
            if region.exclusive_class != 0 {
                self.voices
                    .kill_exclusive(channel, region.exclusive_class, note_id);
            }
            let play_order = self.voices.next_play_order();
            let Some(voice) = self.voices.allocate(note_id) else {
                log::debug!("No voice available for key {} (note {})", key, note_id);
                continue;
            };
            let note = VoiceNote {
                channel,
                preset_index,
                key,
                velocity,
                play_order,
                note_id,
            };
            voice.start(note, region, self.tables, sample_rate);
            started += 1;
        }
        started
    }

    fn channel_release_key(&mut self, channel: usize, key: u8) -> Result<(), EventError> {
        let sustain = self.channels.get(channel)?.sustain;
        self.release_where(sustain, |v| {
            v.note.channel == Some(channel) && v.note.key == key
        });
        Ok(())
    }

    /// Releases matching voices, or marks them as held when `hold` is set.
    fn release_where(&mut self, hold: bool, matches: impl Fn(&Voice) -> bool) {
        for voice in self.voices.iter_mut() {
            if voice.is_released() || !matches(voice) {
                continue;
            }
            if hold {
                voice.sustained = true;
            } else {
                voice.release();
            }
        }
    }
}

/// Channels at power-on: melodic channels on preset 0, the drum channel on
/// the first drum kit when the font has one.
fn default_channels(font: &SoundFontData) -> Channels {
    let mut channels = Channels::new();
    for index in 0..NUM_CHANNELS {
        let preset = if index == DRUM_CHANNEL {
            font.preset_index(DRUM_BANK as i32, 0).unwrap_or(0)
        } else {
            0
        };
        if let Ok(c) = channels.get_mut(index) {
            c.preset_index = (preset < font.presets.len()).then_some(preset);
        }
    }
    channels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth_engine::test_support::{drum_kit_sf2, piano_sf2};
    use std::io::Write;

    const RATE: usize = 44_100;

    fn piano() -> Engine {
        Engine::from_bytes(&piano_sf2()).unwrap()
    }

    fn render_stereo(engine: &mut Engine, frames: usize) -> Vec<f32> {
        let mut buffer = vec![0.0; frames * 2];
        engine.render(&mut buffer, true).unwrap();
        buffer
    }

    fn left(buffer: &[f32]) -> Vec<f32> {
        buffer.iter().step_by(2).copied().collect()
    }

    /// Frequency from the spacing of upward zero crossings, with sub-sample interpolation.
    fn frequency(signal: &[f32], sample_rate: f32) -> f32 {
        let mut crossings = Vec::new();
        for i in 1..signal.len() {
            let (a, b) = (signal[i - 1], signal[i]);
            if a < 0.0 && b >= 0.0 {
                crossings.push((i - 1) as f32 + a / (a - b));
            }
        }
        let first = crossings[0];
        let last = crossings[crossings.len() - 1];
        (crossings.len() - 1) as f32 * sample_rate / (last - first)
    }

    fn rms(signal: &[f32]) -> f32 {
        (signal.iter().map(|s| s * s).sum::<f32>() / signal.len() as f32).sqrt()
    }

    #[test]
    fn test_load_and_enumerate() {
        let engine = piano();
        assert_eq!(engine.preset_count(), 1);
        assert_eq!(engine.preset_index(0, 0), 0);
        assert_eq!(engine.preset_index(0, 1), -1);
        assert_eq!(engine.preset_name(0), "Grand Piano");
        assert_eq!(engine.bank_preset_name(0, 0), "Grand Piano");
    }

    #[test]
    fn test_preset_names_round_trip() {
        let engine = Engine::from_bytes(&drum_kit_sf2()).unwrap();
        for preset in &engine.font.presets {
            let index = engine.preset_index(preset.bank as i32, preset.number as i32);
            assert_ne!(index, -1);
            assert_eq!(engine.preset_name(index), preset.name);
            assert_eq!(
                engine.preset_name(index),
                engine.bank_preset_name(preset.bank as i32, preset.number as i32)
            );
        }
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&piano_sf2()).unwrap();
        let engine = Engine::from_file(file.path()).unwrap();
        assert_eq!(engine.preset_name(0), "Grand Piano");
    }

    #[test]
    fn test_silent_render() {
        let mut engine = piano();
        engine.set_output(OutputMode::Mono, 44_100, 0.0).unwrap();
        let mut buffer = vec![0.0; 1024];
        assert_eq!(engine.render(&mut buffer, true).unwrap(), 1024);
        assert!(buffer.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_note_plays_then_stops() {
        let mut engine = piano();
        engine
            .set_output(OutputMode::StereoInterleaved, 44_100, 0.0)
            .unwrap();
        assert_eq!(engine.note_on_by_index(0, 60, 1.0).unwrap(), 1);

        let playing = render_stereo(&mut engine, RATE);
        assert!(playing[..RATE / 10 * 2].iter().any(|s| *s != 0.0));
        assert!(playing.iter().all(|s| s.abs() <= 1.0));

        engine.note_off_all();
        let tail = left(&render_stereo(&mut engine, RATE));
        let window = 2205;
        let levels: Vec<f32> = tail.chunks(window).map(rms).collect();
        for pair in levels.windows(2) {
            assert!(pair[1] <= pair[0] + 1e-6, "rms rose: {:?}", pair);
        }
        assert!(*levels.last().unwrap() < 1e-4);
        assert_eq!(engine.active_voice_count(), 0);
    }

    #[test]
    fn test_voice_stealing() {
        let mut engine = piano();
        engine.set_max_voices(4);
        for key in 60..65 {
            engine.note_on_by_index(0, key, 1.0).unwrap();
        }
        assert_eq!(engine.active_voice_count(), 4);

        let mut keys: Vec<u8> = engine.voices.iter().map(|v| v.note.key).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec![61, 62, 63, 64]);
    }

    #[test]
    fn test_channel_pitch_wheel() {
        let mut engine = piano();
        engine.channel_note_on(0, 69, 1.0).unwrap();
        render_stereo(&mut engine, 4410);
        let before = frequency(&left(&render_stereo(&mut engine, RATE / 2)), RATE as f32);

        engine.set_channel_pitch_range(0, 2.0).unwrap();
        engine.set_channel_pitch_wheel(0, 16383).unwrap();
        render_stereo(&mut engine, 4410);
        let after = frequency(&left(&render_stereo(&mut engine, RATE / 2)), RATE as f32);

        // A4 from a C4 root playing a 441 Hz sample.
        assert!((before - 441.0 * 2f32.powf(9.0 / 12.0)).abs() < 1.0);
        assert!((after / before - 1.1225).abs() < 0.002);
    }

    #[test]
    fn test_channel_tuning_shifts_pitch() {
        let mut engine = piano();
        engine.channel_note_on(0, 69, 1.0).unwrap();
        render_stereo(&mut engine, 4410);
        let before = frequency(&left(&render_stereo(&mut engine, RATE / 2)), RATE as f32);

        engine.set_channel_tuning(0, -12.0).unwrap();
        render_stereo(&mut engine, 4410);
        let after = frequency(&left(&render_stereo(&mut engine, RATE / 2)), RATE as f32);

        assert!((after / before - 0.5).abs() < 0.002);
    }

    #[test]
    fn test_clone_independence() {
        let mut a = piano();
        let mut b = a.clone();
        a.note_on_by_index(0, 60, 1.0).unwrap();

        let from_b = render_stereo(&mut b, 1024);
        assert!(from_b.iter().all(|s| *s == 0.0));
        assert_eq!(b.active_voice_count(), 0);

        let from_a = render_stereo(&mut a, 1024);
        assert!(from_a.iter().any(|s| *s != 0.0));
    }

    #[test]
    fn test_clone_keeps_output_and_capacity() {
        let mut a = piano();
        a.set_output(OutputMode::Mono, 22_050, -6.0).unwrap();
        a.set_max_voices(8);
        a.set_channel_volume(0, 0.5).unwrap();

        let b = a.clone();
        assert_eq!(b.output(), a.output());
        assert_eq!(b.max_voices(), 8);
        assert_eq!(b.channel_volume(0).unwrap(), 1.0);
        assert!(Arc::ptr_eq(&a.font, &b.font));
    }

    #[test]
    fn test_determinism() {
        let play = |engine: &mut Engine| {
            engine.note_on_by_index(0, 60, 0.8).unwrap();
            engine.channel_note_on(0, 67, 0.5).unwrap();
            engine.set_channel_pitch_wheel(0, 10_000).unwrap();
            let mut out = render_stereo(engine, 3000);
            engine.note_off_all();
            out.extend(render_stereo(engine, 3000));
            out
        };
        let first = play(&mut piano());
        let second = play(&mut piano());
        assert_eq!(first, second);
    }

    #[test]
    fn test_reset_silences() {
        let mut engine = piano();
        engine.note_on_by_index(0, 60, 1.0).unwrap();
        engine.set_channel_pan(0, 0.0).unwrap();
        render_stereo(&mut engine, 512);
        engine.reset();
        assert_eq!(engine.active_voice_count(), 0);
        assert_eq!(engine.channel_pan(0).unwrap(), 0.5);
        assert!(render_stereo(&mut engine, 2048).iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_mix_flag_overwrites() {
        let mut engine = piano();
        let mut buffer = vec![1.0; 64];
        engine.render(&mut buffer, false).unwrap();
        assert!(buffer.iter().all(|s| *s == 0.0));

        let mut buffer = vec![1.0; 64];
        engine.render(&mut buffer, true).unwrap();
        assert!(buffer.iter().all(|s| *s == 1.0));
    }

    #[test]
    fn test_mono_is_average_of_stereo() {
        let mut stereo = piano();
        let mut mono = piano();
        mono.set_output(OutputMode::Mono, 44_100, 0.0).unwrap();
        stereo.set_channel_pan(0, 0.2).unwrap();
        mono.set_channel_pan(0, 0.2).unwrap();
        stereo.channel_note_on(0, 60, 1.0).unwrap();
        mono.channel_note_on(0, 60, 1.0).unwrap();

        let s = render_stereo(&mut stereo, 256);
        let mut m = vec![0.0; 256];
        mono.render(&mut m, true).unwrap();
        for (i, value) in m.iter().enumerate() {
            assert!((value - (s[2 * i] + s[2 * i + 1]) * 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn test_unweaved_layout() {
        let mut interleaved = piano();
        let mut unweaved = piano();
        unweaved
            .set_output(OutputMode::StereoUnweaved, 44_100, 0.0)
            .unwrap();
        interleaved.note_on_by_index(0, 60, 1.0).unwrap();
        unweaved.note_on_by_index(0, 60, 1.0).unwrap();

        let a = render_stereo(&mut interleaved, 128);
        let b = render_stereo(&mut unweaved, 128);
        for i in 0..128 {
            assert_eq!(a[2 * i], b[i]);
            assert_eq!(a[2 * i + 1], b[128 + i]);
        }
    }

    #[test]
    fn test_odd_buffer_is_rejected() {
        let mut engine = piano();
        let mut buffer = vec![0.5; 5];
        let err = engine.render(&mut buffer, true).unwrap_err();
        assert_eq!(err, BufferError::FrameSize { len: 5, frame: 2 });
        assert!(buffer.iter().all(|s| *s == 0.5));
    }

    #[test]
    fn test_note_on_errors() {
        let mut engine = piano();
        assert_eq!(
            engine.note_on_by_index(3, 60, 1.0),
            Err(EventError::InvalidPresetIndex(3))
        );
        assert_eq!(
            engine.note_on_by_bank_preset(0, 9, 60, 1.0),
            Err(EventError::UnknownPreset { bank: 0, number: 9 })
        );
        assert_eq!(
            engine.note_on_by_index(0, 128, 1.0),
            Err(EventError::InvalidKey(128))
        );
        assert!(engine.note_on_by_index(0, 60, f32::NAN).is_err());
        assert_eq!(engine.active_voice_count(), 0);
    }

    #[test]
    fn test_velocity_zero_releases() {
        let mut engine = piano();
        engine.note_on_by_index(0, 60, 1.0).unwrap();
        assert_eq!(engine.note_on_by_index(0, 60, 0.0), Ok(0));
        assert!(engine.voices.iter().all(|v| v.is_released()));
    }

    #[test]
    fn test_note_off_by_bank_preset() {
        let mut engine = piano();
        engine.note_on_by_bank_preset(0, 0, 60, 1.0).unwrap();
        engine.note_on_by_bank_preset(0, 0, 62, 1.0).unwrap();
        engine.note_off_by_bank_preset(0, 0, 60).unwrap();
        let released: Vec<u8> = engine
            .voices
            .iter()
            .filter(|v| v.is_released())
            .map(|v| v.note.key)
            .collect();
        assert_eq!(released, vec![60]);
        // Not playing is not an error.
        engine.note_off_by_index(0, 100).unwrap();
    }

    #[test]
    fn test_invalid_channel_mutates_nothing() {
        let mut engine = piano();
        assert_eq!(
            engine.set_channel_pan(16, 0.1),
            Err(EventError::InvalidChannel(16))
        );
        assert_eq!(
            engine.channel_note_on(99, 60, 1.0),
            Err(EventError::InvalidChannel(99))
        );
        assert!(engine.channel_preset_index(16).is_err());
        assert_eq!(engine.active_voice_count(), 0);
    }

    #[test]
    fn test_channel_presets() {
        let mut engine = Engine::from_bytes(&drum_kit_sf2()).unwrap();
        let kit = engine.preset_index(128, 0);
        assert_eq!(engine.channel_preset_index(DRUM_CHANNEL).unwrap(), kit);
        assert_eq!(engine.channel_preset_bank(DRUM_CHANNEL).unwrap(), 128);
        assert_eq!(engine.channel_preset_index(0).unwrap(), 0);

        engine.set_channel_preset_number(1, 0, true).unwrap();
        assert_eq!(engine.channel_preset_index(1).unwrap(), kit);

        engine.set_channel_bank_preset(2, 128, 0).unwrap();
        assert_eq!(engine.channel_preset_number(2).unwrap(), 0);
        assert_eq!(engine.channel_preset_bank(2).unwrap(), 128);

        assert_eq!(
            engine.set_channel_bank_preset(3, 5, 5),
            Err(EventError::UnknownPreset { bank: 5, number: 5 })
        );
        assert_eq!(engine.channel_preset_index(3).unwrap(), 0);

        assert!(engine.set_channel_preset_index(4, 7).is_err());
        engine.set_channel_bank(5, 3).unwrap();
        assert!(engine.set_channel_preset_number(5, 42, false).is_err());
    }

    #[test]
    fn test_failed_bank_preset_number_keeps_channel() {
        let mut engine = Engine::from_bytes(&drum_kit_sf2()).unwrap();
        assert_eq!(
            engine.set_channel_bank_preset_number(0, 5, 99, false),
            Err(EventError::UnknownPreset { bank: 5, number: 99 })
        );
        assert_eq!(engine.channels.get(0).unwrap().bank, 0);
        assert_eq!(engine.channel_preset_index(0).unwrap(), 0);
        assert!(engine.set_channel_bank_preset_number(0, -1, 0, false).is_err());
        assert_eq!(engine.channels.get(0).unwrap().bank, 0);

        // Bank 3 has no preset 0, so the lookup falls back to bank 0.
        engine.set_channel_bank_preset_number(1, 3, 0, false).unwrap();
        assert_eq!(engine.channels.get(1).unwrap().bank, 3);
        assert_eq!(engine.channel_preset_index(1).unwrap(), 0);

        let kit = engine.preset_index(128, 0);
        engine.set_channel_bank_preset_number(2, 0, 0, true).unwrap();
        assert_eq!(engine.channel_preset_index(2).unwrap(), kit);
        assert_eq!(engine.channel_preset_bank(2).unwrap(), 128);
    }

    #[test]
    fn test_exclusive_class_chokes() {
        let mut engine = Engine::from_bytes(&drum_kit_sf2()).unwrap();
        engine.channel_note_on(DRUM_CHANNEL, 42, 1.0).unwrap();
        assert_eq!(engine.active_voice_count(), 1);
        engine.channel_note_on(DRUM_CHANNEL, 46, 1.0).unwrap();
        assert_eq!(engine.active_voice_count(), 1);
        assert_eq!(engine.voices.iter().next().unwrap().note.key, 46);

        // Another channel is not choked.
        engine.set_channel_preset_number(1, 0, true).unwrap();
        engine.channel_note_on(1, 42, 1.0).unwrap();
        assert_eq!(engine.active_voice_count(), 2);
    }

    #[test]
    fn test_sustain_pedal_holds_notes() {
        let mut engine = piano();
        engine.channel_midi_control(0, 64, 127).unwrap();
        engine.channel_note_on(0, 60, 1.0).unwrap();
        engine.channel_note_off(0, 60).unwrap();
        assert!(engine.voices.iter().all(|v| !v.is_released() && v.sustained));

        engine.channel_midi_control(0, 64, 0).unwrap();
        assert!(engine.voices.iter().all(|v| v.is_released()));
    }

    #[test]
    fn test_channel_sounds_off_is_immediate() {
        let mut engine = piano();
        engine.channel_note_on(0, 60, 1.0).unwrap();
        engine.channel_note_on(1, 60, 1.0).unwrap();
        engine.channel_sounds_off(0).unwrap();
        assert_eq!(engine.active_voice_count(), 1);
        engine.channel_midi_control(1, 120, 0).unwrap();
        assert_eq!(engine.active_voice_count(), 0);
    }

    #[test]
    fn test_channel_note_off_all() {
        let mut engine = piano();
        engine.channel_note_on(0, 60, 1.0).unwrap();
        engine.channel_note_on(0, 64, 1.0).unwrap();
        engine.channel_note_on(1, 67, 1.0).unwrap();
        engine.channel_note_off_all(0).unwrap();
        let released: Vec<Option<usize>> = engine
            .voices
            .iter()
            .filter(|v| v.is_released())
            .map(|v| v.note.channel)
            .collect();
        assert_eq!(released, vec![Some(0), Some(0)]);
    }

    #[test]
    fn test_midi_volume_and_rpn() {
        let mut engine = piano();
        engine.channel_midi_control(0, 7, 64).unwrap();
        assert_eq!(engine.channels.get(0).unwrap().midi_volume, (64 << 7) | 0x7F);

        engine.channel_midi_control(0, 101, 0).unwrap();
        engine.channel_midi_control(0, 100, 0).unwrap();
        engine.channel_midi_control(0, 6, 12).unwrap();
        assert_eq!(engine.channel_pitch_range(0).unwrap(), 12.0);

        engine.channel_midi_control(0, 100, 2).unwrap();
        engine.channel_midi_control(0, 6, 66).unwrap();
        assert_eq!(engine.channel_tuning(0).unwrap(), 2.0);

        engine.set_channel_pitch_wheel(0, 0).unwrap();
        engine.channel_midi_control(0, 121, 0).unwrap();
        assert_eq!(engine.channel_pitch_wheel(0).unwrap(), 8192);

        assert!(engine.channel_midi_control(0, 128, 0).is_err());
        assert!(engine.channel_midi_control(0, 7, -1).is_err());
    }

    #[test]
    fn test_channel_volume_scales_output() {
        let mut full = piano();
        let mut half = piano();
        half.set_channel_volume(0, 0.5).unwrap();
        full.channel_note_on(0, 60, 1.0).unwrap();
        half.channel_note_on(0, 60, 1.0).unwrap();
        let a = render_stereo(&mut full, 256);
        let b = render_stereo(&mut half, 256);
        for (x, y) in a.iter().zip(&b) {
            assert!((x * 0.5 - y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_global_volume() {
        let mut engine = piano();
        engine.set_volume(0.0).unwrap();
        engine.note_on_by_index(0, 60, 1.0).unwrap();
        assert!(render_stereo(&mut engine, 256).iter().all(|s| *s == 0.0));
        assert!(engine.set_volume(f32::INFINITY).is_err());
    }

    #[test]
    fn test_set_output_validates() {
        let mut engine = piano();
        assert!(engine.set_output(OutputMode::Mono, 100, 0.0).is_err());
        assert!(engine.set_output(OutputMode::Mono, 44_100, f32::NAN).is_err());
        assert_eq!(engine.output(), OutputConfig::default());
    }

    #[test]
    fn test_shrinking_max_voices() {
        let mut engine = piano();
        for key in 60..70 {
            engine.note_on_by_index(0, key, 1.0).unwrap();
        }
        engine.set_max_voices(3);
        assert_eq!(engine.active_voice_count(), 3);
        assert_eq!(engine.max_voices(), 3);
    }
}
