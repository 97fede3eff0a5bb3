//! Standard MIDI File (SMF) encoding of transcribed notes.
//!
//! Produces SMF Format 0 (one track) with:
//! - A set-tempo meta event at tick 0
//! - Interleaved note-on/note-off pairs in temporal order
//! - An end-of-track meta event at the last note-off tick
//!
//! Notes are monophonic and non-overlapping, so emitting each note's on/off
//! pair in list order already yields non-decreasing ticks.

use super::note::NoteEvent;
use crate::error::ValidationError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Largest delta time representable as a 4-byte VLQ.
const MAX_VLQ: u32 = 0x0FFF_FFFF;

/// Largest tempo value representable in the 3-byte set-tempo payload.
const MAX_TEMPO_MICROS: u32 = 0x00FF_FFFF;

/// Writes a variable-length quantity (VLQ) used for delta times in MIDI.
///
/// VLQ encodes values using 7 bits per byte, with the MSB indicating
/// whether more bytes follow (1 = more bytes, 0 = last byte).
///
/// # Arguments
///
/// * `value` - The value to encode (clamped to 0x0FFFFFFF)
/// * `buffer` - Output buffer to write to
fn write_vlq(value: u32, buffer: &mut Vec<u8>) {
    let mut temp = value.min(MAX_VLQ);
    let mut bytes = [0u8; 4];
    let mut len = 0;

    loop {
        bytes[len] = (temp & 0x7F) as u8;
        len += 1;
        temp >>= 7;
        if temp == 0 {
            break;
        }
    }

    // Most significant group first; every byte but the last has the MSB set
    for i in (0..len).rev() {
        if i > 0 {
            buffer.push(bytes[i] | 0x80);
        } else {
            buffer.push(bytes[i]);
        }
    }
}

/// A single event in the encoded track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    /// Note on: channel, pitch, velocity
    NoteOn { channel: u8, pitch: u8, velocity: u8 },
    /// Note off: channel, pitch, release velocity (always 0 here)
    NoteOff { channel: u8, pitch: u8, velocity: u8 },
    /// Set tempo: microseconds per quarter note
    SetTempo { microseconds_per_beat: u32 },
    /// End of track (meta event)
    EndOfTrack,
}

/// Writes a single MIDI event to the buffer (without delta time).
fn write_event(event: &MidiEvent, buffer: &mut Vec<u8>) {
    match event {
        MidiEvent::NoteOn {
            channel,
            pitch,
            velocity,
        } => {
            buffer.push(0x90 | (channel & 0x0F));
            buffer.push(pitch & 0x7F);
            buffer.push(velocity & 0x7F);
        }
        MidiEvent::NoteOff {
            channel,
            pitch,
            velocity,
        } => {
            buffer.push(0x80 | (channel & 0x0F));
            buffer.push(pitch & 0x7F);
            buffer.push(velocity & 0x7F);
        }
        MidiEvent::SetTempo {
            microseconds_per_beat,
        } => {
            // Meta event: FF 51 03 tt tt tt
            buffer.push(0xFF);
            buffer.push(0x51);
            buffer.push(0x03);
            buffer.push((microseconds_per_beat >> 16) as u8);
            buffer.push((microseconds_per_beat >> 8) as u8);
            buffer.push(*microseconds_per_beat as u8);
        }
        MidiEvent::EndOfTrack => {
            // Meta event: FF 2F 00
            buffer.push(0xFF);
            buffer.push(0x2F);
            buffer.push(0x00);
        }
    }
}

/// Encoded MIDI output in the form the caller asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiOutput {
    /// Raw SMF bytes.
    Raw(Vec<u8>),
    /// SMF bytes as standard base64 text.
    Base64(String),
}

impl MidiOutput {
    /// Wraps SMF bytes, base64-encoding them unless `raw` is set.
    pub fn from_smf(bytes: Vec<u8>, raw: bool) -> Self {
        if raw {
            MidiOutput::Raw(bytes)
        } else {
            MidiOutput::Base64(STANDARD.encode(bytes))
        }
    }

    /// Returns the bytes to write to a file: the SMF itself, or the ASCII
    /// base64 text.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            MidiOutput::Raw(bytes) => bytes,
            MidiOutput::Base64(text) => text.into_bytes(),
        }
    }
}

/// The single track of a transcription, as `(delta_ticks, event)` pairs.
///
/// Built once from a finalized note list and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct MidiTrackModel {
    ppqn: u16,
    events: Vec<(u32, MidiEvent)>,
}

impl MidiTrackModel {
    /// Builds the track for a finalized note list.
    ///
    /// # Arguments
    ///
    /// * `notes` - Closed notes in onset order
    /// * `tempo_bpm` - Tempo written to the set-tempo event and used for ticks
    /// * `ppqn` - Pulses per quarter note (1-32767)
    /// * `channel` - MIDI channel (0-15)
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the list is empty, its last note is still
    /// open, or any timing/channel parameter is out of range.
    pub fn build(
        notes: &[NoteEvent],
        tempo_bpm: f64,
        ppqn: u32,
        channel: u8,
    ) -> Result<Self, ValidationError> {
        let last = notes.last().ok_or(ValidationError::EmptyNoteList)?;
        if !last.closed {
            return Err(ValidationError::UnfinalizedNote { midi: last.midi });
        }
        if !(tempo_bpm.is_finite() && tempo_bpm > 0.0) {
            return Err(ValidationError::InvalidTempo(tempo_bpm));
        }
        let division = u16::try_from(ppqn)
            .ok()
            .filter(|p| (1..=0x7FFF).contains(p))
            .ok_or(ValidationError::InvalidPpqn(ppqn))?;
        if channel > 15 {
            return Err(ValidationError::InvalidChannel(channel));
        }

        let tick_ms = tick_duration_ms(tempo_bpm, ppqn);
        let micros = (60_000_000.0 / tempo_bpm).round().clamp(1.0, MAX_TEMPO_MICROS as f64) as u32;

        let mut timed = Vec::with_capacity(notes.len() * 2 + 2);
        timed.push((
            0,
            MidiEvent::SetTempo {
                microseconds_per_beat: micros,
            },
        ));

        let mut last_tick = 0u32;
        for note in notes {
            let on_tick = ms_to_ticks(note.start_ms, tick_ms)
                .unwrap_or(last_tick)
                .max(last_tick);
            let off_tick = match ms_to_ticks(note.end_ms(), tick_ms) {
                Some(tick) => tick.max(on_tick),
                None => {
                    tracing::warn!(
                        midi = note.midi,
                        start_ms = note.start_ms,
                        "non-finite note-off time, emitting zero-length note"
                    );
                    on_tick
                }
            };

            timed.push((
                on_tick,
                MidiEvent::NoteOn {
                    channel,
                    pitch: note.midi,
                    velocity: note.velocity,
                },
            ));
            timed.push((
                off_tick,
                MidiEvent::NoteOff {
                    channel,
                    pitch: note.midi,
                    velocity: 0,
                },
            ));
            last_tick = off_tick;
        }
        timed.push((last_tick, MidiEvent::EndOfTrack));

        let mut previous = 0u32;
        let events = timed
            .into_iter()
            .map(|(tick, event)| {
                let delta = tick.saturating_sub(previous);
                previous = tick;
                (delta, event)
            })
            .collect();

        Ok(Self {
            ppqn: division,
            events,
        })
    }

    /// Returns the `(delta_ticks, event)` pairs in track order.
    pub fn events(&self) -> &[(u32, MidiEvent)] {
        &self.events
    }

    /// Returns the division (ticks per quarter note) of this track.
    pub fn ppqn(&self) -> u16 {
        self.ppqn
    }

    /// Encodes the MTrk chunk payload (events with VLQ delta times).
    fn track_data(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(self.events.len() * 4);
        for (delta, event) in &self.events {
            write_vlq(*delta, &mut buffer);
            write_event(event, &mut buffer);
        }
        buffer
    }

    /// Serializes the complete Standard MIDI File.
    pub fn to_smf_bytes(&self) -> Vec<u8> {
        let track_data = self.track_data();
        let mut out = Vec::with_capacity(14 + 8 + track_data.len());

        // Header chunk (MThd)
        out.extend_from_slice(b"MThd");
        out.extend_from_slice(&6u32.to_be_bytes()); // Header length (always 6)
        out.extend_from_slice(&0u16.to_be_bytes()); // Format 0 (single track)
        out.extend_from_slice(&1u16.to_be_bytes()); // One track
        out.extend_from_slice(&self.ppqn.to_be_bytes()); // Division

        // Track chunk (MTrk)
        out.extend_from_slice(b"MTrk");
        out.extend_from_slice(&(track_data.len() as u32).to_be_bytes());
        out.extend_from_slice(&track_data);
        out
    }
}

/// Duration of one tick in milliseconds at `tempo_bpm` and `ppqn`.
pub fn tick_duration_ms(tempo_bpm: f64, ppqn: u32) -> f64 {
    60_000.0 / (tempo_bpm * ppqn as f64)
}

/// Converts milliseconds to ticks, or `None` if the result is not finite.
fn ms_to_ticks(time_ms: f64, tick_ms: f64) -> Option<u32> {
    let ticks = (time_ms / tick_ms).round();
    if !ticks.is_finite() {
        return None;
    }
    Some(ticks.clamp(0.0, MAX_VLQ as f64) as u32)
}

/// Encodes a finalized note list as a Format 0 Standard MIDI File.
///
/// # Errors
///
/// See [`MidiTrackModel::build`].
pub fn encode(
    notes: &[NoteEvent],
    tempo_bpm: f64,
    ppqn: u32,
    channel: u8,
) -> Result<Vec<u8>, ValidationError> {
    let track = MidiTrackModel::build(notes, tempo_bpm, ppqn, channel)?;
    tracing::debug!(
        notes = notes.len(),
        events = track.events().len(),
        "encoded MIDI track"
    );
    Ok(track.to_smf_bytes())
}
