//! Python `Synth` class: several SoundFonts mapped onto MIDI channels with live output.
//!
//! Calls are checked against a local [`SynthCore`] that never renders. While
//! playback runs, accepted calls are also sent to the stream's own copy.

use pyo3::exceptions::PyRuntimeError;
use pyo3::prelude::*;

use crate::messages::SynthMessage;
use crate::soundfont::load_engine;
use crate::synth_engine::audio_stream::{
    AudioStreamHandle, create_audio_stream, setup_logger, start_stream,
};
use crate::synth_engine::constants::DEFAULT_MAX_VOICES;
use crate::synth_engine::synth_core::SynthCore;

/// A synthesizer that loads SoundFonts and plays them through the default audio device.
#[pyclass]
pub struct Synth {
    core: SynthCore,
    stream_handle: Option<AudioStreamHandle>,
}

impl Synth {
    /// Forwards an event to the audio thread; a no-op while stopped.
    fn send(&self, message: SynthMessage) -> PyResult<()> {
        let Some(handle) = &self.stream_handle else {
            return Ok(());
        };
        let mut producer_guard = handle
            .producer
            .lock()
            .map_err(|_| PyRuntimeError::new_err("Failed to acquire producer lock"))?;
        producer_guard
            .push(message)
            .map_err(|_| PyRuntimeError::new_err("Failed to send event - buffer may be full"))
    }
}

#[pymethods]
impl Synth {
    /// # Parameters
    ///
    /// - `gain`: Output gain in relative dB
    /// - `samplerate`: Output sample rate in Hz
    #[new]
    #[pyo3(signature = (gain = 0.0, samplerate = 44100))]
    pub fn new(gain: f32, samplerate: i32) -> Self {
        setup_logger();
        Synth {
            core: SynthCore::new(gain, samplerate),
            stream_handle: None,
        }
    }

    /// Load a SoundFont from a filename or `bytes` and return its id.
    #[pyo3(signature = (source, gain = 0.0, max_voices = DEFAULT_MAX_VOICES))]
    pub fn sfload(
        &mut self,
        source: &Bound<'_, PyAny>,
        gain: f32,
        max_voices: usize,
    ) -> PyResult<u32> {
        let engine = load_engine(source)?;
        let sfid = self.core.sfload(engine, gain, max_voices)?;
        if self.stream_handle.is_some() {
            let engine = Box::new(self.core.engine_copy(sfid)?);
            if let Err(err) = self.send(SynthMessage::LoadSoundFont { sfid, engine }) {
                self.core.sfunload(sfid)?;
                return Err(err);
            }
        }
        Ok(sfid)
    }

    pub fn sfunload(&mut self, sfid: u32) -> PyResult<()> {
        self.core.sfunload(sfid)?;
        self.send(SynthMessage::UnloadSoundFont { sfid })
    }

    /// Select a bank and preset of SoundFont `sfid` for a channel.
    pub fn program_select(&mut self, chan: usize, sfid: u32, bank: i32, preset: i32) -> PyResult<()> {
        self.core.program_select(chan, sfid, bank, preset)?;
        self.send(SynthMessage::ProgramSelect {
            chan,
            sfid,
            bank,
            preset,
        })
    }

    pub fn program_unset(&mut self, chan: usize) -> PyResult<()> {
        self.core.program_unset(chan)?;
        self.send(SynthMessage::ProgramUnset { chan })
    }

    /// Returns `(sfid, bank, preset)` of a channel.
    pub fn program_info(&self, chan: usize) -> PyResult<(u32, i32, i32)> {
        Ok(self.core.program_info(chan)?)
    }

    pub fn sfpreset_name(&self, sfid: u32, bank: i32, number: i32) -> PyResult<String> {
        Ok(self.core.sfpreset_name(sfid, bank, number)?)
    }

    /// Play a note; `False` when the key, velocity or channel is not usable.
    pub fn noteon(&self, chan: i32, key: i32, vel: i32) -> PyResult<bool> {
        if !self.core.accepts_note(chan, key, vel) {
            return Ok(false);
        }
        self.send(SynthMessage::NoteOn { chan, key, vel })?;
        Ok(true)
    }

    pub fn noteoff(&self, chan: i32, key: i32) -> PyResult<bool> {
        if !self.core.accepts_note(chan, key, 0) {
            return Ok(false);
        }
        self.send(SynthMessage::NoteOff { chan, key })?;
        Ok(true)
    }

    /// Start audio playback.
    pub fn start(&mut self) -> PyResult<()> {
        if self.stream_handle.is_some() {
            return Err(PyRuntimeError::new_err("Synth already started"));
        }

        let handle = create_audio_stream(self.core.fork()).map_err(|e| {
            PyRuntimeError::new_err(format!("Failed to create audio stream: {e}"))
        })?;
        start_stream(&handle.stream)
            .map_err(|e| PyRuntimeError::new_err(format!("Failed to start audio stream: {e}")))?;
        self.stream_handle = Some(handle);
        Ok(())
    }

    /// Stop audio playback.
    pub fn stop(&mut self) {
        if self.stream_handle.take().is_some() {
            log::info!("Audio output stopped");
        }
    }
}
