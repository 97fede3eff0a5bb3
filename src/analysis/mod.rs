//! Audio analysis: pitch estimation, note segmentation and chunk driving.

mod driver;
mod estimator;
mod segmenter;

pub use driver::{ChunkDriver, LiveTranscriber, StartListener, StopListener};
pub use estimator::{estimate, EstimatorSettings, PitchEstimate};
pub use segmenter::{NoteSegmenter, PreviewListener, SegmenterSettings};
