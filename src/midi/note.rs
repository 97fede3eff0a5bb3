//! Transcribed note representation.
//!
//! A note event is one note-on/note-off pair produced by the segmenter, timed
//! in milliseconds relative to the segmenter's origin.

use super::{frequency_from_note_number, note_from_number, octave_from_note};
use serde::{Deserialize, Serialize};

/// Provisional duration given to a note when it opens, in milliseconds.
pub const PROVISIONAL_DURATION_MS: f64 = 0.1;

/// A single transcribed note.
///
/// Only the most recently opened event of a segmenter can have
/// `closed == false`; every earlier event is final.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    /// MIDI note number (0-127). 69 = A4.
    pub midi: u8,

    /// Note velocity (0-127).
    pub velocity: u8,

    /// Onset time in milliseconds.
    pub start_ms: f64,

    /// Duration in milliseconds. Provisional until `closed` is set.
    pub duration_ms: f64,

    /// Whether the note-off time is known.
    pub closed: bool,
}

impl NoteEvent {
    /// Opens a new note at `start_ms` with a provisional duration.
    ///
    /// # Arguments
    ///
    /// * `midi` - MIDI note number (clamped to 0-127)
    /// * `velocity` - Note velocity (clamped to 0-127)
    /// * `start_ms` - Onset time in milliseconds
    pub fn open(midi: u8, velocity: u8, start_ms: f64) -> Self {
        Self {
            midi: midi.min(127),
            velocity: velocity.min(127),
            start_ms,
            duration_ms: PROVISIONAL_DURATION_MS,
            closed: false,
        }
    }

    /// Creates an already closed note. Mostly useful for building note lists
    /// to encode directly.
    pub fn closed(midi: u8, velocity: u8, start_ms: f64, duration_ms: f64) -> Self {
        Self {
            duration_ms,
            closed: true,
            ..Self::open(midi, velocity, start_ms)
        }
    }

    /// Closes the note at `time_ms`.
    pub(crate) fn close_at(&mut self, time_ms: f64) {
        self.duration_ms = time_ms - self.start_ms;
        self.closed = true;
    }

    /// Returns the note-off time in milliseconds.
    pub fn end_ms(&self) -> f64 {
        self.start_ms + self.duration_ms
    }

    /// Note name with octave, e.g. `"Bb4"` or `"A#4"`.
    pub fn name(&self, sharps: bool) -> String {
        note_from_number(self.midi, sharps)
    }

    /// MIDI octave of this note.
    pub fn octave(&self) -> i8 {
        octave_from_note(self.midi)
    }

    /// Equal-tempered frequency of this note in Hz.
    pub fn frequency(&self) -> f64 {
        frequency_from_note_number(self.midi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_note() {
        let note = NoteEvent::open(69, 100, 250.0);
        assert!(!note.closed);
        assert_eq!(note.duration_ms, PROVISIONAL_DURATION_MS);
        assert_eq!(note.name(false), "A4");
        assert_eq!(note.octave(), 4);
        assert!((note.frequency() - 440.0).abs() < 1e-9);
    }

    #[test]
    fn test_clamping() {
        let note = NoteEvent::open(200, 200, 0.0);
        assert_eq!(note.midi, 127);
        assert_eq!(note.velocity, 127);
    }

    #[test]
    fn test_close_at() {
        let mut note = NoteEvent::open(60, 90, 100.0);
        note.close_at(600.0);
        assert!(note.closed);
        assert_eq!(note.duration_ms, 500.0);
        assert_eq!(note.end_ms(), 600.0);
    }

    #[test]
    fn test_serialization() {
        let note = NoteEvent::closed(70, 64, 0.0, 93.75);
        let json = serde_json::to_string(&note).unwrap();
        let loaded: NoteEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, note);
    }
}
