//! Several SoundFont engines mixed into one stereo output.
//!
//! MIDI channels are bound to a loaded SoundFont with [`SynthCore::program_select`];
//! note events are then routed to that SoundFont's engine. Rendering overwrites
//! the buffer with the first engine and mixes the rest on top.
//!
//! The Python side keeps one instance as bookkeeping; the output stream owns a
//! [`SynthCore::fork`] of it and receives [`SynthMessage`]s.

use std::collections::BTreeMap;

use crate::messages::SynthMessage;
use crate::synth_engine::Engine;
use crate::synth_engine::constants::{DRUM_CHANNEL, MIDI_MAX};
use crate::synth_engine::errors::{BufferError, SynthError};
use crate::synth_engine::mixer::OutputMode;

pub struct SynthCore {
    gain_db: f32,
    sample_rate: i32,
    soundfonts: BTreeMap<u32, Engine>,
    next_sfid: u32,
    /// Channel to SoundFont id.
    channels: BTreeMap<usize, u32>,
}

fn midi_range(value: i32) -> Option<i32> {
    (0..=MIDI_MAX as i32).contains(&value).then_some(value)
}

impl SynthCore {
    /// # Parameters
    ///
    /// - `gain_db`: Gain applied to every SoundFont, in dB
    /// - `sample_rate`: Output rate in Hz shared by all SoundFonts
    pub fn new(gain_db: f32, sample_rate: i32) -> Self {
        Self {
            gain_db,
            sample_rate,
            soundfonts: BTreeMap::new(),
            next_sfid: 0,
            channels: BTreeMap::new(),
        }
    }

    pub fn sample_rate(&self) -> i32 {
        self.sample_rate
    }

    /// Registers a loaded engine and returns its SoundFont id.
    ///
    /// The engine is switched to interleaved stereo at the synth rate, with the
    /// synth gain plus `gain_db`.
    pub fn sfload(
        &mut self,
        mut engine: Engine,
        gain_db: f32,
        max_voices: usize,
    ) -> Result<u32, SynthError> {
        engine.set_output(
            OutputMode::StereoInterleaved,
            self.sample_rate,
            self.gain_db + gain_db,
        )?;
        engine.set_max_voices(max_voices);

        let sfid = self.next_sfid;
        self.next_sfid += 1;
        self.soundfonts.insert(sfid, engine);
        log::info!("Registered SoundFont {} ({} loaded)", sfid, self.soundfonts.len());
        Ok(sfid)
    }

    /// Stores an engine that was configured by another instance's [`sfload`](Self::sfload).
    pub fn register(&mut self, sfid: u32, engine: Engine) {
        self.soundfonts.insert(sfid, engine);
        self.next_sfid = self.next_sfid.max(sfid + 1);
    }

    /// Copy of a loaded engine with no voices, for publishing to another instance.
    pub fn engine_copy(&self, sfid: u32) -> Result<Engine, SynthError> {
        Ok(self.engine(sfid)?.clone())
    }

    /// Copy with the same SoundFonts and channel bindings and nothing playing.
    pub fn fork(&self) -> Self {
        let mut core = Self {
            gain_db: self.gain_db,
            sample_rate: self.sample_rate,
            soundfonts: self
                .soundfonts
                .iter()
                .map(|(sfid, engine)| (*sfid, engine.clone()))
                .collect(),
            next_sfid: self.next_sfid,
            channels: BTreeMap::new(),
        };
        for &chan in self.channels.keys() {
            let bound = self
                .program_info(chan)
                .and_then(|(sfid, bank, preset)| core.program_select(chan, sfid, bank, preset));
            if let Err(err) = bound {
                log::warn!("Channel {} not carried over: {}", chan, err);
            }
        }
        core
    }

    /// Drops a SoundFont and unbinds every channel that used it.
    pub fn sfunload(&mut self, sfid: u32) -> Result<(), SynthError> {
        self.soundfonts
            .remove(&sfid)
            .ok_or(SynthError::UnknownSoundFont(sfid))?;
        self.channels.retain(|_, bound| *bound != sfid);
        Ok(())
    }

    /// Binds `chan` to SoundFont `sfid` and selects `bank`/`preset` on it.
    pub fn program_select(
        &mut self,
        chan: usize,
        sfid: u32,
        bank: i32,
        preset: i32,
    ) -> Result<(), SynthError> {
        self.engine_mut(sfid)?
            .set_channel_bank_preset_number(chan, bank, preset, chan == DRUM_CHANNEL)?;
        self.channels.insert(chan, sfid);
        Ok(())
    }

    pub fn program_unset(&mut self, chan: usize) -> Result<(), SynthError> {
        self.channels
            .remove(&chan)
            .map(|_| ())
            .ok_or(SynthError::UnassignedChannel(chan))
    }

    /// Returns `(sfid, bank, preset)` of the channel.
    pub fn program_info(&self, chan: usize) -> Result<(u32, i32, i32), SynthError> {
        let sfid = self.sfid(chan)?;
        let engine = self.engine(sfid)?;
        let bank = engine.channel_preset_bank(chan)?;
        let preset = engine.channel_preset_number(chan)?;
        Ok((sfid, bank, preset))
    }

    pub fn sfpreset_name(&self, sfid: u32, bank: i32, number: i32) -> Result<String, SynthError> {
        Ok(self.engine(sfid)?.bank_preset_name(bank, number).to_string())
    }

    /// Whether [`noteon`](Self::noteon) would route the event to a SoundFont.
    pub fn accepts_note(&self, chan: i32, key: i32, vel: i32) -> bool {
        midi_range(key).is_some() && midi_range(vel).is_some() && self.is_routed(chan)
    }

    pub fn is_routed(&self, chan: i32) -> bool {
        usize::try_from(chan)
            .ok()
            .and_then(|chan| self.channels.get(&chan))
            .is_some_and(|sfid| self.soundfonts.contains_key(sfid))
    }

    /// Applies an event forwarded from the Python side.
    ///
    /// Events were validated before sending, so failures are ignored.
    pub fn apply(&mut self, message: SynthMessage) {
        match message {
            SynthMessage::LoadSoundFont { sfid, engine } => self.register(sfid, *engine),
            SynthMessage::UnloadSoundFont { sfid } => {
                let _ = self.sfunload(sfid);
            }
            SynthMessage::ProgramSelect {
                chan,
                sfid,
                bank,
                preset,
            } => {
                let _ = self.program_select(chan, sfid, bank, preset);
            }
            SynthMessage::ProgramUnset { chan } => {
                let _ = self.program_unset(chan);
            }
            SynthMessage::NoteOn { chan, key, vel } => {
                self.noteon(chan, key, vel);
            }
            SynthMessage::NoteOff { chan, key } => {
                self.noteoff(chan, key);
            }
        }
    }

    /// Plays a note with MIDI velocity `vel`.
    ///
    /// Returns `false` for out-of-range key or velocity and unassigned channels.
    pub fn noteon(&mut self, chan: i32, key: i32, vel: i32) -> bool {
        let (Some(key), Some(vel)) = (midi_range(key), midi_range(vel)) else {
            return false;
        };
        let Some((chan, engine)) = self.routed(chan) else {
            return false;
        };
        match engine.channel_note_on(chan, key, vel as f32 / MIDI_MAX as f32) {
            Ok(_) => true,
            Err(err) => {
                log::warn!("Note on for channel {} failed: {}", chan, err);
                false
            }
        }
    }

    pub fn noteoff(&mut self, chan: i32, key: i32) -> bool {
        let Some(key) = midi_range(key) else {
            return false;
        };
        let Some((chan, engine)) = self.routed(chan) else {
            return false;
        };
        engine.channel_note_off(chan, key).is_ok()
    }

    /// Renders interleaved stereo into `out`; silence when nothing is loaded.
    pub fn render(&mut self, out: &mut [f32]) -> Result<usize, BufferError> {
        if self.soundfonts.is_empty() {
            out.fill(0.0);
            return Ok(out.len() / 2);
        }
        let mut frames = 0;
        for (i, engine) in self.soundfonts.values_mut().enumerate() {
            frames = engine.render(out, i > 0)?;
        }
        Ok(frames)
    }

    fn sfid(&self, chan: usize) -> Result<u32, SynthError> {
        self.channels
            .get(&chan)
            .copied()
            .ok_or(SynthError::UnassignedChannel(chan))
    }

    fn engine(&self, sfid: u32) -> Result<&Engine, SynthError> {
        self.soundfonts
            .get(&sfid)
            .ok_or(SynthError::UnknownSoundFont(sfid))
    }

    fn engine_mut(&mut self, sfid: u32) -> Result<&mut Engine, SynthError> {
        self.soundfonts
            .get_mut(&sfid)
            .ok_or(SynthError::UnknownSoundFont(sfid))
    }

    fn routed(&mut self, chan: i32) -> Option<(usize, &mut Engine)> {
        let chan = usize::try_from(chan).ok()?;
        let sfid = *self.channels.get(&chan)?;
        self.soundfonts.get_mut(&sfid).map(|engine| (chan, engine))
    }
}
