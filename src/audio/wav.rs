//! WAV file reading and writing.
//!
//! Multi-channel files are reduced to their first channel; integer PCM is
//! scaled to [-1, 1].

use super::SampleBuffer;
use crate::error::AudioLoadError;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::Path;

/// Loads the first channel of a WAV file as floating-point samples.
///
/// # Errors
///
/// Returns error if the file cannot be read, uses an unsupported bit depth,
/// or contains no samples.
pub fn load_wav<P: AsRef<Path>>(path: P) -> Result<SampleBuffer, AudioLoadError> {
    let mut reader = WavReader::open(path.as_ref())?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => {
            if spec.bits_per_sample != 32 {
                return Err(AudioLoadError::UnsupportedFormat(format!(
                    "{}-bit float samples",
                    spec.bits_per_sample
                )));
            }
            reader
                .samples::<f32>()
                .step_by(channels)
                .collect::<Result<_, _>>()?
        }
        SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(AudioLoadError::UnsupportedFormat(format!(
                    "{}-bit integer samples",
                    spec.bits_per_sample
                )));
            }
            let scale = (1u64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .step_by(channels)
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    if samples.is_empty() {
        return Err(AudioLoadError::Empty);
    }

    tracing::debug!(
        path = %path.as_ref().display(),
        sample_rate = spec.sample_rate,
        channels,
        samples = samples.len(),
        "loaded WAV"
    );
    Ok(SampleBuffer::new(samples, spec.sample_rate))
}

/// Writes a mono buffer as a 16-bit PCM WAV file.
///
/// # Errors
///
/// Returns error if the file cannot be created or written.
pub fn write_wav<P: AsRef<Path>>(buffer: &SampleBuffer, path: P) -> Result<(), AudioLoadError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: buffer.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &sample in &buffer.samples {
        // Convert f32 (-1.0 to 1.0) to i16
        let value = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
        writer.write_sample(value)?;
    }
    writer.finalize()?;
    Ok(())
}
