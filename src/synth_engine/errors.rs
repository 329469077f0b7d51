//! Synthesizer error types.

use thiserror::Error;

/// Errors that can occur while loading a SoundFont.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Failed to open or read the SoundFont file.
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// The data does not start with a `RIFF`/`sfbk` header.
    #[error("not a SoundFont file (expected RIFF/sfbk signature)")]
    Signature,

    /// A chunk header claims more bytes than are available.
    #[error("truncated chunk '{chunk}': needs {needed} bytes, {available} available")]
    Truncated {
        /// Four character chunk identifier.
        chunk: String,
        /// Bytes the header announced.
        needed: usize,
        /// Bytes actually left in the data.
        available: usize,
    },

    /// A required chunk is absent.
    #[error("missing required chunk '{0}'")]
    MissingChunk(&'static str),

    /// A hydra table has a length that is not a whole number of records.
    #[error("table '{table}' has invalid size {size} (record size {record_size})")]
    TableSize {
        /// Table identifier.
        table: &'static str,
        /// Table length in bytes.
        size: usize,
        /// Fixed record size of the table.
        record_size: usize,
    },

    /// A hydra record references an entry outside its target table.
    #[error("table '{table}' record {record} references index {index} (limit {limit})")]
    IndexOutOfRange {
        /// Table holding the faulty reference.
        table: &'static str,
        /// Record number within the table.
        record: usize,
        /// Referenced index.
        index: usize,
        /// Exclusive upper bound for the reference.
        limit: usize,
    },

    /// A sample header points outside the sample pool.
    #[error("sample '{name}' range {start}..{end} exceeds sample pool of {pool} frames")]
    SampleRange {
        /// Sample name.
        name: String,
        /// Start frame.
        start: usize,
        /// End frame.
        end: usize,
        /// Pool length in frames.
        pool: usize,
    },

    /// Failed to decode a compressed (SF3) sample.
    #[error("failed to decode compressed sample '{name}': {source}")]
    Decode {
        /// Sample name.
        name: String,
        /// Underlying decoder error.
        #[source]
        source: symphonia::core::errors::Error,
    },

    /// The file defines no presets.
    #[error("SoundFont contains no presets")]
    NoPresets,
}

/// Errors raised when a render buffer cannot be used.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferError {
    /// Array element type is not 32-bit float.
    #[error("buffer must contain 32-bit floats")]
    DataType,

    /// Array has the wrong number of dimensions.
    #[error("buffer must be 2-dimensional (frames, channels), got {0} dimensions")]
    Dimensions(usize),

    /// Array has the wrong number of columns.
    #[error("buffer must have {expected} channels per frame, got {found}")]
    Shape {
        /// Channels required by the output mode.
        expected: usize,
        /// Channels found in the array.
        found: usize,
    },

    /// Buffer length is not a whole number of frames.
    #[error("buffer size {len} is not a multiple of the frame size {frame}")]
    FrameSize {
        /// Buffer length (bytes or floats).
        len: usize,
        /// Frame size in the same unit.
        frame: usize,
    },

    /// Array memory is not contiguous.
    #[error("buffer must be C-contiguous")]
    NotContiguous,

    /// Array is already borrowed elsewhere.
    #[error("buffer is already borrowed")]
    Borrowed,

    /// Object is neither a bytearray nor a numpy array.
    #[error("buffer must be a bytearray or a numpy float32 array")]
    Unsupported,
}

/// Errors raised by note and channel events.
#[derive(Debug, Error, PartialEq)]
pub enum EventError {
    /// Channel number outside `0..NUM_CHANNELS`.
    #[error("invalid channel {0}")]
    InvalidChannel(usize),

    /// Preset index outside the preset list.
    #[error("invalid preset index {0}")]
    InvalidPresetIndex(i32),

    /// No preset with this bank and number exists.
    #[error("no preset for bank {bank} number {number}")]
    UnknownPreset {
        /// Requested bank.
        bank: i32,
        /// Requested preset number.
        number: i32,
    },

    /// The note matched no region so no voice was started.
    #[error("no voice started for key {key}")]
    NoVoiceStarted {
        /// Requested key.
        key: i32,
    },

    /// Key outside the MIDI range.
    #[error("key {0} out of range (expected 0..=127)")]
    InvalidKey(i32),

    /// Non-finite or out-of-range value.
    #[error("{name} value {value} out of range")]
    InvalidValue {
        /// Parameter name.
        name: &'static str,
        /// Rejected value.
        value: f32,
    },
}

/// Errors raised by the multi-SoundFont [`SynthCore`](crate::synth_engine::synth_core::SynthCore).
#[derive(Debug, Error)]
pub enum SynthError {
    /// No SoundFont is registered under this id.
    #[error("no SoundFont loaded with id {0}")]
    UnknownSoundFont(u32),

    /// The channel has no program selected.
    #[error("channel {0} has no program assigned")]
    UnassignedChannel(usize),

    /// Loading the SoundFont failed.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// The underlying engine rejected the event.
    #[error(transparent)]
    Event(#[from] EventError),
}
