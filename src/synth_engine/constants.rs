//! Synthesizer configuration constants and limits.

/// Number of MIDI channels held by every engine.
pub const NUM_CHANNELS: usize = 16;

/// Channel (0-indexed) that defaults to the General MIDI drum bank.
pub const DRUM_CHANNEL: usize = 9;

/// Bank number conventionally holding drum kits.
pub const DRUM_BANK: u16 = 128;

/// Default number of simultaneous voices.
pub const DEFAULT_MAX_VOICES: usize = 256;

/// Default output sample rate in Hz.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Lowest accepted output sample rate in Hz.
pub const SAMPLE_RATE_MIN: u32 = 8_000;

/// Highest accepted output sample rate in Hz.
pub const SAMPLE_RATE_MAX: u32 = 192_000;

/// Frames rendered between control-rate updates (LFOs, mod envelope, pitch, filter).
pub const RENDER_BLOCK_FRAMES: usize = 64;

/// Highest 14-bit controller value (pitch wheel, MIDI volume/expression).
pub const MIDI_14BIT_MAX: u16 = 16_383;

/// Centre position of the pitch wheel.
pub const PITCH_WHEEL_CENTER: u16 = 8_192;

/// Default pitch wheel range in semitones.
pub const DEFAULT_PITCH_RANGE: f32 = 2.0;

/// Highest MIDI key / velocity / controller value.
pub const MIDI_MAX: u8 = 127;

/// Envelope floor in dB; anything below is treated as silence.
pub const ENVELOPE_FLOOR_DB: f32 = -100.0;

/// Filter cutoffs at or above this frequency bypass the filter.
pub const FILTER_BYPASS_HZ: f32 = 20_000.0;

/// Frequency of absolute cent 0 (MIDI key 0) in Hz.
pub const CENT_ZERO_HZ: f32 = 8.175_799;

/// Minimum scalar volume accepted by `set_volume`/`set_channel_volume`.
pub const VOLUME_MIN: f32 = 0.0;

/// Maximum scalar volume accepted by `set_volume`/`set_channel_volume`.
pub const VOLUME_MAX: f32 = 16.0;
