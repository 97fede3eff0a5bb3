//! PCM input for the transcription core.
//!
//! The core only ever sees single-channel `f32` samples plus a sample rate.
//! This module provides that buffer type and a WAV loader that produces it.

mod wav;

pub use wav::{load_wav, write_wav};

/// A captured mono waveform.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    /// Samples in [-1, 1].
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl SampleBuffer {
    /// Wraps samples captured at `sample_rate`.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the buffer holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in milliseconds.
    pub fn duration_ms(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 * 1000.0 / self.sample_rate as f64
    }
}
