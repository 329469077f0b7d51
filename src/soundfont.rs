//! Python `SoundFont` and `OutputMode` classes.

use std::path::PathBuf;

use numpy::{
    PyArrayDescrMethods, PyArrayDyn, PyArrayMethods, PyUntypedArray, PyUntypedArrayMethods,
};
use pyo3::create_exception;
use pyo3::exceptions::{PyException, PyTypeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyByteArray, PyBytes, PySlice, PyTuple};

use crate::synth_engine::Engine;
use crate::synth_engine::audio_stream::setup_logger;
use crate::synth_engine::errors::{BufferError, EventError, LoadError, SynthError};
use crate::synth_engine::mixer;

create_exception!(_tinysoundfont, SoundFontException, PyException);

impl From<LoadError> for PyErr {
    fn from(err: LoadError) -> Self {
        SoundFontException::new_err(err.to_string())
    }
}

impl From<EventError> for PyErr {
    fn from(err: EventError) -> Self {
        PyValueError::new_err(err.to_string())
    }
}

impl From<BufferError> for PyErr {
    fn from(err: BufferError) -> Self {
        match err {
            BufferError::DataType | BufferError::Unsupported => PyTypeError::new_err(err.to_string()),
            _ => PyValueError::new_err(err.to_string()),
        }
    }
}

impl From<SynthError> for PyErr {
    fn from(err: SynthError) -> Self {
        match err {
            SynthError::Event(err) => err.into(),
            other => SoundFontException::new_err(other.to_string()),
        }
    }
}

/// Layout of rendered samples.
#[pyclass(eq, eq_int)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputMode {
    StereoInterleaved,
    StereoUnweaved,
    Mono,
}

impl From<OutputMode> for mixer::OutputMode {
    fn from(mode: OutputMode) -> Self {
        match mode {
            OutputMode::StereoInterleaved => mixer::OutputMode::StereoInterleaved,
            OutputMode::StereoUnweaved => mixer::OutputMode::StereoUnweaved,
            OutputMode::Mono => mixer::OutputMode::Mono,
        }
    }
}

/// Loads an engine from a path (`str`/`os.PathLike`) or `bytes`.
pub(crate) fn load_engine(source: &Bound<'_, PyAny>) -> PyResult<Engine> {
    if let Ok(bytes) = source.extract::<Bound<'_, PyBytes>>() {
        return Ok(Engine::from_bytes(bytes.as_bytes())?);
    }
    let path: PathBuf = source.extract().map_err(|_| {
        PyTypeError::new_err("SoundFont source must be a path or bytes")
    })?;
    Ok(Engine::from_file(&path)?)
}

/// Renders over a copy of native-endian f32 bytes and returns the new bytes.
///
/// bytearray storage has no alignment guarantee, so samples are decoded first.
fn render_ne_bytes(
    engine: &mut Engine,
    bytes: &[u8],
    mix: bool,
) -> Result<(usize, Vec<u8>), BufferError> {
    let mut samples: Vec<f32> = if mix {
        bytes
            .chunks_exact(4)
            .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .collect()
    } else {
        vec![0.0; bytes.len() / 4]
    };
    let frames = engine.render(&mut samples, mix)?;
    let rendered = samples.iter().flat_map(|s| s.to_ne_bytes()).collect();
    Ok((frames, rendered))
}

fn arity_error(name: &str, expected: &str, found: usize) -> PyErr {
    PyTypeError::new_err(format!(
        "{name}() takes {expected} arguments ({found} given)"
    ))
}

/// A loaded SoundFont with its own voices, channels and output settings.
#[pyclass]
pub struct SoundFont {
    engine: Engine,
}

impl SoundFont {
    /// Renders into a bytearray of native-endian f32 frames.
    fn render_bytearray(&mut self, buffer: &Bound<'_, PyByteArray>, mix: bool) -> PyResult<usize> {
        let frame_bytes = self.engine.output().mode.channels() * size_of::<f32>();
        if buffer.len() % frame_bytes != 0 {
            return Err(BufferError::FrameSize {
                len: buffer.len(),
                frame: frame_bytes,
            }
            .into());
        }

        let (frames, rendered) = render_ne_bytes(&mut self.engine, &buffer.to_vec(), mix)?;
        let py = buffer.py();
        buffer.set_item(PySlice::full(py), PyBytes::new(py, &rendered))?;
        Ok(frames)
    }

    /// Renders in place into a C-contiguous float32 array of shape (frames, channels).
    fn render_array(&mut self, array: &Bound<'_, PyUntypedArray>, mix: bool) -> PyResult<usize> {
        let py = array.py();
        if !array.dtype().is_equiv_to(&numpy::dtype::<f32>(py)) {
            return Err(BufferError::DataType.into());
        }
        if array.ndim() != 2 {
            return Err(BufferError::Dimensions(array.ndim()).into());
        }
        let expected = self.engine.output().mode.channels();
        let found = array.shape()[1];
        if found != expected {
            return Err(BufferError::Shape { expected, found }.into());
        }
        if !array.is_c_contiguous() {
            return Err(BufferError::NotContiguous.into());
        }

        let array = array
            .extract::<Bound<'_, PyArrayDyn<f32>>>()
            .map_err(|_| PyErr::from(BufferError::DataType))?;
        let mut view = array
            .try_readwrite()
            .map_err(|_| PyErr::from(BufferError::Borrowed))?;
        let samples = view
            .as_slice_mut()
            .map_err(|_| PyErr::from(BufferError::NotContiguous))?;
        Ok(self.engine.render(samples, mix)?)
    }
}

#[pymethods]
impl SoundFont {
    /// Load a SoundFont from a filename or from `bytes`.
    #[new]
    pub fn new(source: &Bound<'_, PyAny>) -> PyResult<Self> {
        setup_logger();
        Ok(SoundFont {
            engine: load_engine(source)?,
        })
    }

    /// Copy sharing the sample data, with fresh voices and channels.
    pub fn copy(&self) -> Self {
        SoundFont {
            engine: self.engine.clone(),
        }
    }

    pub fn __copy__(&self) -> Self {
        self.copy()
    }

    /// Stop all playing notes immediately and reset all channel parameters.
    pub fn reset(&mut self) {
        self.engine.reset();
    }

    pub fn get_preset_count(&self) -> usize {
        self.engine.preset_count()
    }

    /// Preset index for a bank and preset number, or -1.
    pub fn get_preset_index(&self, bank: i32, preset: i32) -> i32 {
        self.engine.preset_index(bank, preset)
    }

    /// `get_preset_name(index)` or `get_preset_name(bank, number)`.
    #[pyo3(signature = (*args))]
    pub fn get_preset_name(&self, args: &Bound<'_, PyTuple>) -> PyResult<String> {
        let name = match args.len() {
            1 => self.engine.preset_name(args.extract::<(i32,)>()?.0),
            2 => {
                let (bank, number) = args.extract::<(i32, i32)>()?;
                self.engine.bank_preset_name(bank, number)
            }
            n => return Err(arity_error("get_preset_name", "1 or 2", n)),
        };
        Ok(name.to_string())
    }

    #[pyo3(signature = (mode, samplerate = 44100, global_gain_db = 0.0))]
    pub fn set_output(&mut self, mode: OutputMode, samplerate: i32, global_gain_db: f32) -> PyResult<()> {
        Ok(self.engine.set_output(mode.into(), samplerate, global_gain_db)?)
    }

    /// Global gain as a linear scalar (1.0 = unchanged).
    pub fn set_volume(&mut self, volume: f32) -> PyResult<()> {
        Ok(self.engine.set_volume(volume)?)
    }

    pub fn set_max_voices(&mut self, max_voices: usize) {
        self.engine.set_max_voices(max_voices);
    }

    pub fn active_voice_count(&self) -> usize {
        self.engine.active_voice_count()
    }

    /// `note_on(index, key, vel)` or `note_on(bank, number, key, vel)`; returns voices started.
    #[pyo3(signature = (*args))]
    pub fn note_on(&mut self, args: &Bound<'_, PyTuple>) -> PyResult<usize> {
        let started = match args.len() {
            3 => {
                let (index, key, vel) = args.extract::<(i32, i32, f32)>()?;
                self.engine.note_on_by_index(index, key, vel)?
            }
            4 => {
                let (bank, number, key, vel) = args.extract::<(i32, i32, i32, f32)>()?;
                self.engine.note_on_by_bank_preset(bank, number, key, vel)?
            }
            n => return Err(arity_error("note_on", "3 or 4", n)),
        };
        Ok(started)
    }

    /// `note_off()`, `note_off(index, key)` or `note_off(bank, number, key)`.
    #[pyo3(signature = (*args))]
    pub fn note_off(&mut self, args: &Bound<'_, PyTuple>) -> PyResult<()> {
        match args.len() {
            0 => self.engine.note_off_all(),
            2 => {
                let (index, key) = args.extract::<(i32, i32)>()?;
                self.engine.note_off_by_index(index, key)?;
            }
            3 => {
                let (bank, number, key) = args.extract::<(i32, i32, i32)>()?;
                self.engine.note_off_by_bank_preset(bank, number, key)?;
            }
            n => return Err(arity_error("note_off", "0, 2 or 3", n)),
        }
        Ok(())
    }

    pub fn set_channel_preset_index(&mut self, channel: usize, index: i32) -> PyResult<()> {
        Ok(self.engine.set_channel_preset_index(channel, index)?)
    }

    #[pyo3(signature = (channel, number, drum = false))]
    pub fn set_channel_preset_number(&mut self, channel: usize, number: i32, drum: bool) -> PyResult<()> {
        Ok(self.engine.set_channel_preset_number(channel, number, drum)?)
    }

    pub fn set_channel_bank(&mut self, channel: usize, bank: i32) -> PyResult<()> {
        Ok(self.engine.set_channel_bank(channel, bank)?)
    }

    pub fn set_channel_bank_preset(&mut self, channel: usize, bank: i32, number: i32) -> PyResult<()> {
        Ok(self.engine.set_channel_bank_preset(channel, bank, number)?)
    }

    pub fn set_channel_pan(&mut self, channel: usize, pan: f32) -> PyResult<()> {
        Ok(self.engine.set_channel_pan(channel, pan)?)
    }

    pub fn set_channel_volume(&mut self, channel: usize, volume: f32) -> PyResult<()> {
        Ok(self.engine.set_channel_volume(channel, volume)?)
    }

    pub fn set_channel_pitch_wheel(&mut self, channel: usize, value: i32) -> PyResult<()> {
        Ok(self.engine.set_channel_pitch_wheel(channel, value)?)
    }

    pub fn set_channel_pitch_range(&mut self, channel: usize, semitones: f32) -> PyResult<()> {
        Ok(self.engine.set_channel_pitch_range(channel, semitones)?)
    }

    pub fn set_channel_tuning(&mut self, channel: usize, semitones: f32) -> PyResult<()> {
        Ok(self.engine.set_channel_tuning(channel, semitones)?)
    }

    pub fn get_channel_preset_index(&self, channel: usize) -> PyResult<i32> {
        Ok(self.engine.channel_preset_index(channel)?)
    }

    pub fn get_channel_preset_bank(&self, channel: usize) -> PyResult<i32> {
        Ok(self.engine.channel_preset_bank(channel)?)
    }

    pub fn get_channel_preset_number(&self, channel: usize) -> PyResult<i32> {
        Ok(self.engine.channel_preset_number(channel)?)
    }

    pub fn get_channel_pan(&self, channel: usize) -> PyResult<f32> {
        Ok(self.engine.channel_pan(channel)?)
    }

    pub fn get_channel_volume(&self, channel: usize) -> PyResult<f32> {
        Ok(self.engine.channel_volume(channel)?)
    }

    pub fn get_channel_pitch_wheel(&self, channel: usize) -> PyResult<i32> {
        Ok(self.engine.channel_pitch_wheel(channel)?)
    }

    pub fn get_channel_pitch_range(&self, channel: usize) -> PyResult<f32> {
        Ok(self.engine.channel_pitch_range(channel)?)
    }

    pub fn get_channel_tuning(&self, channel: usize) -> PyResult<f32> {
        Ok(self.engine.channel_tuning(channel)?)
    }

    pub fn channel_note_on(&mut self, channel: usize, key: i32, vel: f32) -> PyResult<usize> {
        Ok(self.engine.channel_note_on(channel, key, vel)?)
    }

    /// Release one key, or every note of the channel when `key` is omitted.
    #[pyo3(signature = (channel, key = None))]
    pub fn channel_note_off(&mut self, channel: usize, key: Option<i32>) -> PyResult<()> {
        match key {
            Some(key) => self.engine.channel_note_off(channel, key)?,
            None => self.engine.channel_note_off_all(channel)?,
        }
        Ok(())
    }

    pub fn channel_sounds_off(&mut self, channel: usize) -> PyResult<()> {
        Ok(self.engine.channel_sounds_off(channel)?)
    }

    pub fn channel_midi_control(&mut self, channel: usize, controller: i32, value: i32) -> PyResult<()> {
        Ok(self.engine.channel_midi_control(channel, controller, value)?)
    }

    /// Render into a `bytearray` or a float32 numpy array; returns frames rendered.
    #[pyo3(signature = (buffer, mix = true))]
    pub fn render(&mut self, buffer: &Bound<'_, PyAny>, mix: bool) -> PyResult<usize> {
        if let Ok(bytearray) = buffer.extract::<Bound<'_, PyByteArray>>() {
            return self.render_bytearray(&bytearray, mix);
        }
        if let Ok(array) = buffer.extract::<Bound<'_, PyUntypedArray>>() {
            return self.render_array(&array, mix);
        }
        Err(BufferError::Unsupported.into())
    }
}
