//! MIDI note model, naming, and Standard MIDI File encoding.
//!
//! This module maps between frequencies, MIDI note numbers and note names,
//! and hosts the SMF writer used for transcription output and the reader
//! used to inspect it.

mod midi_export;
mod midi_import;
mod note;

pub use midi_export::{encode, tick_duration_ms, MidiEvent, MidiOutput, MidiTrackModel};
pub use midi_import::{parse_smf, ParsedNote, ParsedSmf, SmfParseError};
pub use note::NoteEvent;

use crate::error::ValidationError;

/// Reference pitch for A4 (MIDI 69) in Hz.
pub const A4_FREQUENCY: f64 = 440.0;

/// MIDI note number of A4.
pub const A4_NOTE: u8 = 69;

/// Pitch class names spelled with flats, indexed by `midi % 12`.
pub const NOTE_FLATS: [&str; 12] = [
    "C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B",
];

/// Pitch class names spelled with sharps, indexed by `midi % 12`.
pub const NOTE_SHARPS: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Maps a frequency to the nearest equal-tempered MIDI note number.
///
/// Returns `None` for non-positive or non-finite frequencies. Results are
/// clamped to 0-127.
///
/// # Examples
///
/// ```
/// use sound2midi::midi::note_from_pitch;
///
/// assert_eq!(note_from_pitch(440.0), Some(69));
/// assert_eq!(note_from_pitch(-1.0), None);
/// ```
pub fn note_from_pitch(frequency: f64) -> Option<u8> {
    if !frequency.is_finite() || frequency <= 0.0 {
        return None;
    }
    let semitones = 12.0 * (frequency / A4_FREQUENCY).log2();
    let note = semitones.round() + A4_NOTE as f64;
    Some(note.clamp(0.0, 127.0) as u8)
}

/// Returns the equal-tempered frequency of a MIDI note number.
pub fn frequency_from_note_number(midi: u8) -> f64 {
    A4_FREQUENCY * 2f64.powf((midi as f64 - A4_NOTE as f64) / 12.0)
}

/// Cents by which `frequency` deviates from the pitch of `midi`, floored.
pub fn cents_off_from_pitch(frequency: f64, midi: u8) -> i32 {
    (1200.0 * (frequency / frequency_from_note_number(midi)).log2()).floor() as i32
}

/// MIDI octave of a note number (C4 = 60 is octave 4).
pub fn octave_from_note(midi: u8) -> i8 {
    (midi / 12) as i8 - 1
}

/// Converts a MIDI note number to a name with octave, e.g. `"Bb4"`.
///
/// # Arguments
///
/// * `midi` - MIDI note number (0-127)
/// * `sharps` - spell accidentals with sharps instead of flats
pub fn note_from_number(midi: u8, sharps: bool) -> String {
    let names = if sharps { &NOTE_SHARPS } else { &NOTE_FLATS };
    format!("{}{}", names[(midi % 12) as usize], octave_from_note(midi))
}

/// Frequency of a pitch class index (0 = C) in a given octave.
pub fn pitch_from_index_and_octave(index: usize, octave: i32) -> f64 {
    A4_FREQUENCY * 2f64.powf((octave * 12 + index as i32 - 57) as f64 / 12.0)
}

/// Parses a note name such as `"A4"`, `"C#3"` or `"Eb-1"` into a MIDI number.
///
/// Names containing `#` are looked up in the sharp spelling table, all
/// others in the flat table.
///
/// # Errors
///
/// Returns `ValidationError::InvalidNoteName` if the pitch class or octave
/// cannot be parsed or the note falls outside 0-127.
pub fn name_to_note(name: &str) -> Result<u8, ValidationError> {
    let (index, octave) = parse_note_name(name)?;
    let midi = (octave + 1) * 12 + index as i32;
    u8::try_from(midi)
        .ok()
        .filter(|m| *m <= 127)
        .ok_or_else(|| ValidationError::InvalidNoteName(name.to_string()))
}

/// Parses a note name into its frequency in Hz.
///
/// # Errors
///
/// Returns `ValidationError::InvalidNoteName` for unknown names.
///
/// # Examples
///
/// ```
/// use sound2midi::midi::pitch_from_note;
///
/// let a4 = pitch_from_note("A4").unwrap();
/// assert!((a4 - 440.0).abs() < 1e-9);
/// assert!(pitch_from_note("H2").is_err());
/// ```
pub fn pitch_from_note(name: &str) -> Result<f64, ValidationError> {
    let (index, octave) = parse_note_name(name)?;
    Ok(pitch_from_index_and_octave(index, octave))
}

fn parse_note_name(name: &str) -> Result<(usize, i32), ValidationError> {
    let invalid = || ValidationError::InvalidNoteName(name.to_string());
    let trimmed = name.trim();

    let octave_start = trimmed
        .find(|c: char| c.is_ascii_digit() || c == '-')
        .ok_or_else(invalid)?;
    let (class, octave) = trimmed.split_at(octave_start);

    let table = if class.contains('#') {
        &NOTE_SHARPS
    } else {
        &NOTE_FLATS
    };
    let index = table.iter().position(|&n| n == class).ok_or_else(invalid)?;
    let octave: i32 = octave.parse().map_err(|_| invalid())?;
    Ok((index, octave))
}
