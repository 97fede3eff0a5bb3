//! sound2midi - monophonic audio to Standard MIDI File transcription.
//!
//! This library provides the transcription core: autocorrelation pitch
//! estimation, note segmentation, and SMF encoding.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod error;
pub mod midi;
pub mod transcriber;

// Re-export commonly used types
pub use analysis::{estimate, LiveTranscriber, NoteSegmenter, PitchEstimate};
pub use audio::{load_wav, SampleBuffer};
pub use config::TranscriberConfig;
pub use error::{AudioLoadError, ConfigError, ValidationError};
pub use midi::{encode, parse_smf, MidiOutput, NoteEvent};
pub use transcriber::Transcriber;
