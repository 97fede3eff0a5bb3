//! Standard MIDI File (SMF) reading.
//!
//! Parses .mid data back into note tuples so encoded transcriptions can be
//! inspected and verified. Supports Format 0 and Format 1 files with
//! metrical timing.
//!
//! # Limitations
//!
//! - Only note on/off events and the first set-tempo event are read
//! - Ticks are absolute per track and are not rescaled
//! - Other MIDI events (program changes, pitch bend, etc.) are ignored

use midly::{Format, MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur while parsing an SMF byte stream.
#[derive(Debug, Error)]
pub enum SmfParseError {
    /// The bytes are not a valid Standard MIDI File.
    #[error("MIDI parse error: {0}")]
    Parse(String),
    /// Valid SMF, but a layout this reader does not handle.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// One note reconstructed from a note-on/note-off pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedNote {
    pub channel: u8,
    pub key: u8,
    pub velocity: u8,
    pub on_tick: u32,
    pub off_tick: u32,
}

/// Contents of a parsed SMF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSmf {
    /// Ticks per quarter note from the header.
    pub ppqn: u16,
    /// Tempo from the first set-tempo meta event, if any.
    pub microseconds_per_beat: Option<u32>,
    /// Tick of the end-of-track marker in the last track.
    pub end_tick: u32,
    /// Notes ordered by onset tick, ties broken by track order.
    pub notes: Vec<ParsedNote>,
}

impl ParsedSmf {
    /// Tempo in beats per minute, if a set-tempo event was present.
    pub fn tempo_bpm(&self) -> Option<f64> {
        self.microseconds_per_beat
            .filter(|us| *us > 0)
            .map(|us| 60_000_000.0 / us as f64)
    }
}

/// State for tracking active notes during parsing.
/// Key is (channel, key), value is (on_tick, velocity).
type ActiveNotes = HashMap<(u8, u8), (u32, u8)>;

/// Parses SMF bytes into notes and timing information.
///
/// # Errors
///
/// Returns error if the data is not a valid SMF, uses SMPTE timecode, or is
/// a Format 2 (sequential) file.
pub fn parse_smf(data: &[u8]) -> Result<ParsedSmf, SmfParseError> {
    let smf = Smf::parse(data).map_err(|e| SmfParseError::Parse(e.to_string()))?;

    let ppqn = match smf.header.timing {
        Timing::Metrical(tpb) => tpb.as_int(),
        Timing::Timecode(_, _) => {
            return Err(SmfParseError::UnsupportedFormat(
                "SMPTE timecode timing not supported".to_string(),
            ))
        }
    };
    if smf.header.format == Format::Sequential {
        return Err(SmfParseError::UnsupportedFormat(
            "Format 2 (sequential) MIDI files not supported".to_string(),
        ));
    }

    let mut microseconds_per_beat = None;
    let mut end_tick = 0;
    let mut notes = Vec::new();

    for track in &smf.tracks {
        let mut active: ActiveNotes = HashMap::new();
        let mut current_tick: u32 = 0;

        for event in track {
            current_tick += event.delta.as_int();

            match event.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => {
                    microseconds_per_beat.get_or_insert(tempo.as_int());
                }
                TrackEventKind::Meta(MetaMessage::EndOfTrack) => {
                    end_tick = current_tick;
                }
                TrackEventKind::Midi { channel, message } => {
                    let ch = channel.as_int();
                    match message {
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            active.insert((ch, key.as_int()), (current_tick, vel.as_int()));
                        }
                        // Note on with velocity 0 is a note off
                        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                            if let Some((on_tick, velocity)) = active.remove(&(ch, key.as_int())) {
                                notes.push(ParsedNote {
                                    channel: ch,
                                    key: key.as_int(),
                                    velocity,
                                    on_tick,
                                    off_tick: current_tick,
                                });
                            }
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }

        if !active.is_empty() {
            tracing::warn!(
                unterminated = active.len(),
                "track ended with notes still sounding"
            );
        }
    }

    // Stable sort keeps track order for equal onsets
    notes.sort_by_key(|n| n.on_tick);

    Ok(ParsedSmf {
        ppqn,
        microseconds_per_beat,
        end_tick,
        notes,
    })
}
