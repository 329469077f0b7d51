//! Decoding of Ogg/Vorbis compressed samples stored in SF3 files.

use std::io::Cursor;

use symphonia::core::{
    audio::SampleBuffer as SymphoniaSampleBuffer, codecs::DecoderOptions,
    errors::Error as SymphoniaError, formats::FormatOptions, io::MediaSourceStream,
    meta::MetadataOptions, probe::Hint,
};
use symphonia::default::{get_codecs, get_probe};

use crate::synth_engine::errors::LoadError;

/// Sample type bit marking an Ogg/Vorbis compressed sample.
pub const SAMPLE_TYPE_COMPRESSED: u16 = 0x0010;

/// Decodes one compressed sample into mono frames normalized to -1.0..1.0.
///
/// # Parameters
///
/// - `name`: Sample name, used in error reports
/// - `bytes`: The complete Ogg stream of the sample
///
/// # Returns
///
/// - `Ok(Vec<f32>)`: Decoded mono frames
/// - `Err(LoadError::Decode)`: The stream could not be probed or decoded
pub fn decode_compressed_sample(name: &str, bytes: &[u8]) -> Result<Vec<f32>, LoadError> {
    let decode_err = |source: SymphoniaError| LoadError::Decode {
        name: name.to_string(),
        source,
    };

    let cursor = Cursor::new(bytes.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    hint.with_extension("ogg");

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(decode_err)?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| decode_err(SymphoniaError::DecodeError("no default track")))?;
    let track_id = track.id;
    let channels = track
        .codec_params
        .channels
        .map(|c| c.count())
        .unwrap_or(1);

    let mut decoder = get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(decode_err)?;

    let mut decoded: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(err) => return Err(decode_err(err)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let audio_buf = match decoder.decode(&packet) {
            Ok(buf) => buf,
            Err(SymphoniaError::DecodeError(msg)) => {
                log::warn!("Skipping corrupt packet in sample '{}': {}", name, msg);
                continue;
            }
            Err(err) => return Err(decode_err(err)),
        };
        let spec = *audio_buf.spec();
        let duration = audio_buf.capacity() as u64;

        let mut sample_buf = SymphoniaSampleBuffer::<f32>::new(duration, spec);
        sample_buf.copy_interleaved_ref(audio_buf);
        decoded.extend_from_slice(sample_buf.samples());
    }

    Ok(downmix_to_mono(decoded, channels))
}

/// Averages interleaved frames down to a single channel.
pub fn downmix_to_mono(samples: Vec<f32>, channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples;
    }
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}
