//! Message definitions for communication between Python and the audio thread.
//!
//! The Python-side [`Synth`](crate::synth::Synth) validates every call against its
//! own bookkeeping and then forwards it through the ring buffer, where the
//! stream callback applies it to the [`SynthCore`](crate::synth_engine::synth_core::SynthCore)
//! it owns.

use crate::synth_engine::Engine;

/// Message that is emitted from the Python side.
pub enum SynthMessage {
    /// Publish a configured engine under a SoundFont id.
    ///
    /// # Parameters
    /// * `sfid` - Id already assigned on the Python side
    /// * `engine` - Engine with its output settings applied and no voices
    LoadSoundFont { sfid: u32, engine: Box<Engine> },

    /// Drop a SoundFont and unbind its channels.
    UnloadSoundFont { sfid: u32 },

    /// Bind a channel to a SoundFont preset.
    ProgramSelect {
        chan: usize,
        sfid: u32,
        bank: i32,
        preset: i32,
    },

    /// Unbind a channel.
    ProgramUnset { chan: usize },

    /// Play a note.
    ///
    /// # Parameters
    /// * `chan` - MIDI channel bound with `ProgramSelect`
    /// * `key` - MIDI key (0 to 127)
    /// * `vel` - MIDI velocity (0 to 127)
    NoteOn { chan: i32, key: i32, vel: i32 },

    /// Release a note.
    NoteOff { chan: i32, key: i32 },
}
