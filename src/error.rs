//! Error types for transcription and MIDI encoding.
//!
//! Signal-quality rejections (silence, out-of-range pitch, notes arriving too
//! soon) are not errors and never show up here. These types only cover
//! caller-contract violations and I/O at the edges of the crate.

use std::path::PathBuf;
use thiserror::Error;

/// A caller violated a precondition of the transcription core.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// `encode` was called with no notes.
    #[error("cannot encode an empty note list")]
    EmptyNoteList,

    /// The trailing note is still open; the segmenter must be finalized first.
    #[error("last note (MIDI {midi}) is still open; finalize the segmenter before encoding")]
    UnfinalizedNote { midi: u8 },

    /// A textual note name could not be parsed.
    #[error("invalid note name: {0:?}")]
    InvalidNoteName(String),

    /// Pulses per quarter note must fit the 15-bit SMF division field.
    #[error("ppqn must be between 1 and 32767, got {0}")]
    InvalidPpqn(u32),

    /// MIDI channels are 0-15.
    #[error("channel must be between 0 and 15, got {0}")]
    InvalidChannel(u8),

    /// Tempo must be a positive, finite BPM value.
    #[error("tempo must be a positive finite BPM value, got {0}")]
    InvalidTempo(f64),

    /// A configuration field is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A wall-clock call was made on a session timed by an external clock.
    #[error("session uses an external clock; use process_at instead of process")]
    ClockMismatch,
}

/// Failure loading or saving a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Failure turning an audio file into a sample buffer.
#[derive(Debug, Error)]
pub enum AudioLoadError {
    #[error("failed to read WAV file: {0}")]
    Wav(#[from] hound::Error),

    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("audio file contains no samples")]
    Empty,
}
