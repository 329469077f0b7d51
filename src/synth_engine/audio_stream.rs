//! Audio Stream Module
//!
//! Live playback of a [`SynthCore`] through the default CPAL output device:
//! - Logger setup shared by the Python classes
//! - Stereo stream configuration at the synth sample rate
//! - Ring buffer carrying events from Python to the audio callback

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Sample, Stream, StreamConfig};
use env_logger::{Builder, Env};
use rtrb::{Consumer, Producer, RingBuffer};
use std::sync::Mutex;

use crate::messages::SynthMessage;
use crate::synth_engine::synth_core::SynthCore;

const OUTPUT_CHANNELS: u16 = 2;
const BUFFER_FRAMES: u32 = 512;
const MESSAGE_CAPACITY: usize = 1024;

/// Handle to a running output stream; dropping it stops playback.
pub struct AudioStreamHandle {
    pub stream: Stream,
    pub producer: Mutex<Producer<SynthMessage>>,
    pub output_sample_rate: u32,
}

/// Setup and configure the logger
pub fn setup_logger() {
    // `RUST_LOG` overrides the default level, e.g. `RUST_LOG=debug`.
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .try_init()
        .unwrap_or(());
}

/// Applies every pending event to the synth owned by the audio thread.
pub fn drain_messages(consumer: &mut Consumer<SynthMessage>, core: &mut SynthCore) {
    while let Ok(message) = consumer.pop() {
        core.apply(message);
    }
}

/// Create the output stream; the callback takes ownership of `core`.
///
/// Events pushed to the returned producer are applied at the start of each
/// buffer. A failed render outputs silence.
pub fn create_audio_stream(
    mut core: SynthCore,
) -> Result<AudioStreamHandle, Box<dyn std::error::Error>> {
    setup_logger();

    let sample_rate = u32::try_from(core.sample_rate()).map_err(|_| "invalid synth sample rate")?;

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or("No audio device found")?;

    log::info!(
        "Starting audio output... ({} ch@{} Hz)",
        OUTPUT_CHANNELS,
        sample_rate
    );

    // Python -> audio thread
    let (producer, mut consumer) = RingBuffer::new(MESSAGE_CAPACITY);

    let stream_config = StreamConfig {
        channels: OUTPUT_CHANNELS,
        sample_rate,
        buffer_size: BufferSize::Fixed(BUFFER_FRAMES),
    };

    let stream = device.build_output_stream(
        &stream_config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            drain_messages(&mut consumer, &mut core);
            if core.render(data).is_err() {
                data.fill(Sample::EQUILIBRIUM);
            }
        },
        |err| {
            log::error!("Audio stream error: {}", err);
        },
        None,
    )?;

    Ok(AudioStreamHandle {
        stream,
        producer: Mutex::new(producer),
        output_sample_rate: sample_rate,
    })
}

/// Start playing the audio stream
pub fn start_stream(stream: &Stream) -> Result<(), Box<dyn std::error::Error>> {
    stream.play()?;
    Ok(())
}
