//! Render loop: mixes active voices into the caller's buffer.
//!
//! Voices are rendered into stereo scratch buffers first; the configured
//! [`OutputMode`] then decides how the scratch is laid out in the output.

use cpal::Sample;

use crate::synth_engine::channels::Channels;
use crate::synth_engine::constants::DEFAULT_SAMPLE_RATE;
use crate::synth_engine::errors::BufferError;
use crate::synth_engine::tables::SynthTables;
use crate::synth_engine::voice::VoiceControl;
use crate::synth_engine::voice_pool::VoicePool;

/// Output sample layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Two channels, frames interleaved as `[L0 R0 L1 R1 ...]`.
    #[default]
    StereoInterleaved,
    /// Two channels, all left samples followed by all right samples.
    StereoUnweaved,
    /// One channel, the average of left and right.
    Mono,
}

impl OutputMode {
    pub fn channels(self) -> usize {
        match self {
            OutputMode::Mono => 1,
            OutputMode::StereoInterleaved | OutputMode::StereoUnweaved => 2,
        }
    }
}

/// Output configuration set through `set_output`/`set_volume`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputConfig {
    pub mode: OutputMode,
    pub sample_rate: u32,
    /// Global gain in dB; negative infinity mutes.
    pub gain_db: f32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            mode: OutputMode::default(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            gain_db: 0.0,
        }
    }
}

impl OutputConfig {
    pub fn gain(&self) -> f32 {
        10.0_f32.powf(self.gain_db / 20.0)
    }
}

/// Owns the output configuration and the stereo scratch buffers.
#[derive(Debug, Clone, Default)]
pub struct Mixer {
    pub output: OutputConfig,
    left: Vec<f32>,
    right: Vec<f32>,
}

impl Mixer {
    pub fn new(output: OutputConfig) -> Self {
        Self {
            output,
            left: Vec::new(),
            right: Vec::new(),
        }
    }

    /// Renders `output.len() / channels` frames.
    ///
    /// # Parameters
    ///
    /// - `voices`: Voice pool to advance
    /// - `channels`: Channel state the voices read at control rate
    /// - `pool`: Shared sample frames
    /// - `output`: Destination in the configured layout
    /// - `mix`: Add into `output` when true, overwrite it otherwise
    ///
    /// # Returns
    ///
    /// - `Ok(usize)`: Number of frames rendered
    /// - `Err(BufferError::FrameSize)`: `output` is not a whole number of frames
    pub fn render(
        &mut self,
        voices: &mut VoicePool,
        channels: &Channels,
        pool: &[f32],
        tables: &SynthTables,
        output: &mut [f32],
        mix: bool,
    ) -> Result<usize, BufferError> {
        let frame = self.output.mode.channels();
        if output.len() % frame != 0 {
            return Err(BufferError::FrameSize {
                len: output.len(),
                frame,
            });
        }
        let frames = output.len() / frame;

        self.left.clear();
        self.left.resize(frames, Sample::EQUILIBRIUM);
        self.right.clear();
        self.right.resize(frames, Sample::EQUILIBRIUM);

        let sample_rate = self.output.sample_rate as f32;
        for voice in voices.iter_mut() {
            let control = voice
                .note
                .channel
                .map_or_else(VoiceControl::default, |c| channels.control(c));
            voice.render(
                pool,
                &control,
                tables,
                sample_rate,
                &mut self.left,
                &mut self.right,
            );
        }

        if !mix {
            output.fill(Sample::EQUILIBRIUM);
        }
        write_layout(
            self.output.mode,
            &self.left,
            &self.right,
            self.output.gain(),
            output,
        );
        Ok(frames)
    }
}

/// Adds the scaled stereo scratch into `output` using the layout of `mode`.
pub fn write_layout(mode: OutputMode, left: &[f32], right: &[f32], gain: f32, output: &mut [f32]) {
    let frames = left.len().min(right.len());
    match mode {
        OutputMode::StereoInterleaved => {
            for (i, frame) in output.chunks_exact_mut(2).take(frames).enumerate() {
                frame[0] += left[i] * gain;
                frame[1] += right[i] * gain;
            }
        }
        OutputMode::StereoUnweaved => {
            let (out_left, out_right) = output.split_at_mut(frames);
            for i in 0..frames {
                out_left[i] += left[i] * gain;
                out_right[i] += right[i] * gain;
            }
        }
        OutputMode::Mono => {
            for (i, out) in output.iter_mut().take(frames).enumerate() {
                *out += (left[i] + right[i]) * 0.5 * gain;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth_engine::tables::tables;

    #[test]
    fn test_mode_channels() {
        assert_eq!(OutputMode::Mono.channels(), 1);
        assert_eq!(OutputMode::StereoInterleaved.channels(), 2);
        assert_eq!(OutputMode::StereoUnweaved.channels(), 2);
    }

    #[test]
    fn test_layouts() {
        let left = [1.0, 2.0];
        let right = [3.0, 4.0];

        let mut out = [0.0; 4];
        write_layout(OutputMode::StereoInterleaved, &left, &right, 1.0, &mut out);
        assert_eq!(out, [1.0, 3.0, 2.0, 4.0]);

        let mut out = [0.0; 4];
        write_layout(OutputMode::StereoUnweaved, &left, &right, 1.0, &mut out);
        assert_eq!(out, [1.0, 2.0, 3.0, 4.0]);

        let mut out = [0.0; 2];
        write_layout(OutputMode::Mono, &left, &right, 0.5, &mut out);
        assert_eq!(out, [1.0, 1.5]);
    }

    #[test]
    fn test_layout_adds() {
        let mut out = [1.0, 1.0];
        write_layout(OutputMode::Mono, &[1.0, 1.0], &[1.0, 1.0], 1.0, &mut out);
        assert_eq!(out, [2.0, 2.0]);
    }

    #[test]
    fn test_gain_db() {
        let mut config = OutputConfig::default();
        assert!((config.gain() - 1.0).abs() < 1e-6);
        config.gain_db = -6.0;
        assert!((config.gain() - 0.501_187).abs() < 1e-4);
        config.gain_db = f32::NEG_INFINITY;
        assert_eq!(config.gain(), 0.0);
    }

    #[test]
    fn test_render_silence_and_mix_flag() {
        let mut mixer = Mixer::new(OutputConfig::default());
        let mut voices = VoicePool::new(4);
        let channels = Channels::new();

        let mut out = vec![0.5; 8];
        let frames = mixer
            .render(&mut voices, &channels, &[], tables(), &mut out, true)
            .unwrap();
        assert_eq!(frames, 4);
        assert!(out.iter().all(|s| *s == 0.5));

        mixer
            .render(&mut voices, &channels, &[], tables(), &mut out, false)
            .unwrap();
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_render_rejects_partial_frame() {
        let mut mixer = Mixer::new(OutputConfig::default());
        let mut voices = VoicePool::new(1);
        let mut out = vec![0.0; 3];
        let result = mixer.render(&mut voices, &Channels::new(), &[], tables(), &mut out, true);
        assert_eq!(result, Err(BufferError::FrameSize { len: 3, frame: 2 }));
    }
}
