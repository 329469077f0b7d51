//! MIDI channel state.

use crate::synth_engine::constants::{
    DEFAULT_PITCH_RANGE, DRUM_BANK, DRUM_CHANNEL, MIDI_14BIT_MAX, NUM_CHANNELS, PITCH_WHEEL_CENTER,
};
use crate::synth_engine::errors::EventError;
use crate::synth_engine::voice::VoiceControl;

/// RPN value meaning "no parameter selected".
pub const RPN_NONE: u16 = 0x3FFF;

#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub preset_index: Option<usize>,
    pub bank: u16,
    pub preset_number: u16,
    pub drum: bool,
    pub pan: f32,
    pub volume: f32,
    pub pitch_wheel: u16,
    pub pitch_range: f32,
    pub tuning: f32,
    pub midi_volume: u16,
    pub midi_expression: u16,
    pub sustain: bool,
    pub rpn: u16,
}

impl Channel {
    pub fn new(drum: bool) -> Self {
        Self {
            preset_index: None,
            bank: if drum { DRUM_BANK } else { 0 },
            preset_number: 0,
            drum,
            pan: 0.5,
            volume: 1.0,
            pitch_wheel: PITCH_WHEEL_CENTER,
            pitch_range: DEFAULT_PITCH_RANGE,
            tuning: 0.0,
            midi_volume: MIDI_14BIT_MAX,
            midi_expression: MIDI_14BIT_MAX,
            sustain: false,
            rpn: RPN_NONE,
        }
    }

    /// Pitch offset from tuning and the pitch wheel, in cents.
    pub fn pitch_cents(&self) -> f32 {
        let wheel = (self.pitch_wheel as f32 - PITCH_WHEEL_CENTER as f32) / PITCH_WHEEL_CENTER as f32;
        (self.tuning + wheel * self.pitch_range) * 100.0
    }

    pub fn gain(&self) -> f32 {
        let midi_volume = self.midi_volume as f32 / MIDI_14BIT_MAX as f32;
        let expression = self.midi_expression as f32 / MIDI_14BIT_MAX as f32;
        self.volume * midi_volume * midi_volume * expression * expression
    }

    pub fn control(&self) -> VoiceControl {
        VoiceControl {
            pitch_cents: self.pitch_cents(),
            gain: self.gain(),
            pan: self.pan,
        }
    }

    /// Restores the controllers affected by "reset all controllers" (CC 121).
    pub fn reset_controllers(&mut self) {
        self.pitch_wheel = PITCH_WHEEL_CENTER;
        self.midi_expression = MIDI_14BIT_MAX;
        self.sustain = false;
        self.rpn = RPN_NONE;
    }
}

/// The sixteen channels of an engine.
#[derive(Debug, Clone)]
pub struct Channels {
    channels: Vec<Channel>,
}

impl Channels {
    pub fn new() -> Self {
        Self {
            channels: (0..NUM_CHANNELS)
                .map(|c| Channel::new(c == DRUM_CHANNEL))
                .collect(),
        }
    }

    pub fn get(&self, channel: usize) -> Result<&Channel, EventError> {
        self.channels
            .get(channel)
            .ok_or(EventError::InvalidChannel(channel))
    }

    pub fn get_mut(&mut self, channel: usize) -> Result<&mut Channel, EventError> {
        self.channels
            .get_mut(channel)
            .ok_or(EventError::InvalidChannel(channel))
    }

    /// Control values for a voice owned by `channel`; defaults for unknown channels.
    pub fn control(&self, channel: usize) -> VoiceControl {
        self.channels
            .get(channel)
            .map_or_else(VoiceControl::default, Channel::control)
    }
}

impl Default for Channels {
    fn default() -> Self {
        Self::new()
    }
}
