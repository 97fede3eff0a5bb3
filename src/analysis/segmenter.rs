//! Note segmentation.
//!
//! Turns a time-ordered stream of pitch estimates into discrete notes. Each
//! call passes a pitch-range gate and a refractory gate (unless forced), is
//! mapped to a MIDI note, and then either sustains the open note, closes it,
//! or closes it and opens a new one.
//!
//! Times passed to [`NoteSegmenter::add_note`] are measured on the caller's
//! clock; the origin given to [`NoteSegmenter::reset`] is subtracted once on
//! input, so every stored time and duration is relative to that origin.

use super::estimator::PitchEstimate;
use crate::config::TranscriberConfig;
use crate::midi::{note_from_pitch, NoteEvent};

/// Callback fired synchronously whenever a new note opens.
pub type PreviewListener = Box<dyn FnMut(&NoteEvent) + Send>;

/// Gating and mapping parameters of a [`NoteSegmenter`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmenterSettings {
    /// Lowest accepted pitch in Hz.
    pub pitch_min: f64,
    /// Highest accepted pitch in Hz.
    pub pitch_max: f64,
    /// Minimum time between accepted calls in milliseconds.
    pub min_interval_ms: f64,
    /// Velocity at zero amplitude.
    pub velocity_base: f64,
    /// Velocity per unit of amplitude.
    pub velocity_scale: f64,
    /// Map the mean of pitches seen since the last accepted call.
    pub smoothing: bool,
}

impl From<&TranscriberConfig> for SegmenterSettings {
    fn from(config: &TranscriberConfig) -> Self {
        Self {
            pitch_min: config.pitch_min,
            pitch_max: config.pitch_max,
            min_interval_ms: config.min_interval_ms(),
            velocity_base: config.velocity_base,
            velocity_scale: config.velocity_scale,
            smoothing: config.smoothing,
        }
    }
}

impl Default for SegmenterSettings {
    fn default() -> Self {
        Self::from(&TranscriberConfig::default())
    }
}

/// Stateful note segmenter.
///
/// Not reentrant: calls must be serialized and arrive in increasing time
/// order. Calls whose time is not later than the last accepted call are
/// rejected.
pub struct NoteSegmenter {
    settings: SegmenterSettings,
    notes: Vec<NoteEvent>,
    /// MIDI number of the open note, `None` while nothing sounds.
    last_note: Option<u8>,
    /// Time of the last accepted call, relative to the origin.
    last_event_ms: Option<f64>,
    pitch_sum: f64,
    pitch_count: u32,
    time_offset_ms: f64,
    listeners: Vec<PreviewListener>,
}

impl std::fmt::Debug for NoteSegmenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoteSegmenter")
            .field("settings", &self.settings)
            .field("notes", &self.notes)
            .field("last_note", &self.last_note)
            .field("last_event_ms", &self.last_event_ms)
            .field("time_offset_ms", &self.time_offset_ms)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl NoteSegmenter {
    /// Creates an empty segmenter with its origin at time 0.
    pub fn new(settings: SegmenterSettings) -> Self {
        Self {
            settings,
            notes: Vec::new(),
            last_note: None,
            last_event_ms: None,
            pitch_sum: 0.0,
            pitch_count: 0,
            time_offset_ms: 0.0,
            listeners: Vec::new(),
        }
    }

    /// Returns the settings this segmenter was built with.
    pub fn settings(&self) -> &SegmenterSettings {
        &self.settings
    }

    /// Registers a listener called each time a note opens.
    pub fn on_preview_note<F>(&mut self, listener: F)
    where
        F: FnMut(&NoteEvent) + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Clears all notes and state and moves the time origin to `origin_ms`.
    ///
    /// Registered listeners are kept.
    pub fn reset(&mut self, origin_ms: f64) {
        self.notes.clear();
        self.last_note = None;
        self.last_event_ms = None;
        self.clear_accumulator();
        self.time_offset_ms = origin_ms;
    }

    /// Feeds one pitch observation.
    ///
    /// # Arguments
    ///
    /// * `pitch` - Detected pitch in Hz, or `None` for silence
    /// * `amplitude` - Mean absolute amplitude, mapped to velocity
    /// * `time_ms` - Observation time on the caller's clock
    /// * `force` - Bypass the pitch-range and refractory gates
    ///
    /// # Returns
    ///
    /// `true` if the observation was accepted. Rejections are expected in
    /// continuous audio and are not errors. Silence is only accepted when
    /// forced; non-finite pitches are never accepted.
    pub fn add_note(&mut self, pitch: Option<f64>, amplitude: f64, time_ms: f64, force: bool) -> bool {
        let time = time_ms - self.time_offset_ms;
        if !time.is_finite() {
            tracing::trace!(time_ms, "dropped observation with non-finite time");
            return false;
        }

        match pitch {
            Some(hz) if !hz.is_finite() => {
                tracing::trace!(time, "dropped non-finite pitch");
                return false;
            }
            Some(hz) if !force && !(self.settings.pitch_min..=self.settings.pitch_max).contains(&hz) => {
                tracing::trace!(hz, time, "pitch outside configured range");
                return false;
            }
            None if !force => return false,
            _ => {}
        }

        if let Some(last) = self.last_event_ms {
            if time <= last {
                tracing::trace!(time, last, "dropped out-of-order observation");
                return false;
            }
        }

        if let (Some(hz), true) = (pitch, self.settings.smoothing) {
            self.pitch_sum += hz;
            self.pitch_count += 1;
        }

        if let Some(last) = self.last_event_ms {
            if !force && time - last < self.settings.min_interval_ms {
                return false;
            }
        }

        let mapped = match pitch {
            Some(_) if self.settings.smoothing && self.pitch_count > 0 => {
                Some(self.pitch_sum / self.pitch_count as f64)
            }
            other => other,
        };
        self.clear_accumulator();
        self.last_event_ms = Some(time);

        let note = mapped.and_then(note_from_pitch);
        if note == self.last_note {
            // Sustain, or silence while nothing sounds
            return true;
        }

        if self.last_note.is_some() {
            if let Some(open) = self.notes.last_mut() {
                open.close_at(time);
            }
        }

        if let Some(midi) = note {
            let event = NoteEvent::open(midi, self.velocity_for(amplitude), time);
            for listener in &mut self.listeners {
                listener(&event);
            }
            self.notes.push(event);
        }
        self.last_note = note;
        true
    }

    /// Feeds an estimator result.
    ///
    /// Pitched estimates go through both gates. Silent estimates are forced
    /// through as "no note" so an open note ends where the signal stops.
    pub fn add_estimate(&mut self, estimate: &PitchEstimate, time_ms: f64) -> bool {
        match estimate.pitch {
            Some(hz) => self.add_note(Some(hz), estimate.amplitude, time_ms, false),
            None if self.last_note.is_some() => {
                self.add_note(None, estimate.amplitude, time_ms, true)
            }
            None => false,
        }
    }

    /// Closes a still-open trailing note at `now_ms` and returns all notes.
    pub fn finalize(&mut self, now_ms: f64) -> &[NoteEvent] {
        let now = now_ms - self.time_offset_ms;
        if let Some(open) = self.notes.last_mut().filter(|n| !n.closed) {
            let end = if now.is_finite() {
                now.max(open.start_ms)
            } else {
                open.start_ms
            };
            open.close_at(end);
        }
        self.last_note = None;
        self.clear_accumulator();
        &self.notes
    }

    /// Notes produced so far, in onset order. The last one may be open.
    pub fn notes(&self) -> &[NoteEvent] {
        &self.notes
    }

    /// Consumes the segmenter, returning its notes.
    pub fn into_notes(self) -> Vec<NoteEvent> {
        self.notes
    }

    /// Whether a note is currently sounding.
    pub fn is_note_open(&self) -> bool {
        self.last_note.is_some()
    }

    /// Time origin set by the last reset.
    pub fn time_offset_ms(&self) -> f64 {
        self.time_offset_ms
    }

    fn velocity_for(&self, amplitude: f64) -> u8 {
        let amplitude = if amplitude.is_finite() { amplitude } else { 0.0 };
        let velocity = self.settings.velocity_base + self.settings.velocity_scale * amplitude;
        velocity.clamp(0.0, 127.0).round() as u8
    }

    fn clear_accumulator(&mut self) {
        self.pitch_sum = 0.0;
        self.pitch_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn segmenter(smoothing: bool) -> NoteSegmenter {
        // tempo 80, resolution 32: 23.4375 ms minimum interval
        let config = TranscriberConfig {
            tempo: 80.0,
            resolution: 32,
            smoothing,
            ..Default::default()
        };
        NoteSegmenter::new(SegmenterSettings::from(&config))
    }

    #[test]
    fn test_refractory_gate() {
        let mut seg = segmenter(false);
        assert!(seg.add_note(Some(440.0), 0.3, 100.0, false));
        assert!(!seg.add_note(Some(440.0), 0.3, 110.0, false));
        assert_eq!(seg.notes().len(), 1);

        // A different pitch within the interval is dropped too
        assert!(!seg.add_note(Some(880.0), 0.3, 120.0, false));
        assert_eq!(seg.notes().len(), 1);

        // Forcing bypasses the gate
        assert!(seg.add_note(Some(880.0), 0.3, 121.0, true));
        assert_eq!(seg.notes().len(), 2);
    }

    #[test]
    fn test_sustain_extends_one_note() {
        let mut seg = segmenter(false);
        for i in 0..10 {
            seg.add_note(Some(441.0), 0.3, i as f64 * 50.0, false);
        }
        assert_eq!(seg.notes().len(), 1);
        assert!(seg.is_note_open());

        let notes = seg.finalize(500.0);
        assert_eq!(notes.len(), 1);
        assert!(notes[0].closed);
        assert_eq!(notes[0].midi, 69);
        assert_eq!(notes[0].duration_ms, 500.0);
    }

    #[test]
    fn test_pitch_change_closes_previous() {
        let mut seg = segmenter(false);
        seg.add_note(Some(440.0), 0.2, 0.0, false);
        seg.add_note(Some(440.0), 0.2, 100.0, false);
        seg.add_note(Some(660.0), 0.2, 250.0, false);

        let notes = seg.notes();
        assert_eq!(notes.len(), 2);
        assert!(notes[0].closed);
        assert_eq!(notes[0].duration_ms, 250.0);
        assert!(!notes[1].closed);
        assert_eq!(notes[1].midi, 76);
        assert_eq!(notes[1].start_ms, 250.0);
    }

    #[test]
    fn test_pitch_range_gate() {
        let mut seg = segmenter(false);
        assert!(!seg.add_note(Some(5.0), 0.2, 0.0, false));
        assert!(!seg.add_note(Some(30_000.0), 0.2, 50.0, false));
        assert!(seg.notes().is_empty());

        // Rejected calls do not arm the refractory gate
        assert!(seg.add_note(Some(440.0), 0.2, 60.0, false));
    }

    #[test]
    fn test_non_finite_pitch_is_dropped() {
        let mut seg = segmenter(false);
        assert!(!seg.add_note(Some(f64::NAN), 0.2, 0.0, false));
        assert!(!seg.add_note(Some(f64::INFINITY), 0.2, 50.0, true));
        assert!(seg.notes().is_empty());
    }

    #[test]
    fn test_silence_closes_open_note() {
        let mut seg = segmenter(false);
        seg.add_note(Some(440.0), 0.2, 0.0, false);

        // Unforced silence is gated like an out-of-range pitch
        assert!(!seg.add_note(None, 0.0, 300.0, false));
        assert!(seg.is_note_open());

        let silent = PitchEstimate {
            pitch: None,
            rms: 0.0,
            amplitude: 0.0,
        };
        assert!(seg.add_estimate(&silent, 400.0));
        assert!(!seg.is_note_open());
        assert_eq!(seg.notes()[0].duration_ms, 400.0);
        assert!(seg.notes()[0].closed);

        // Silence with nothing open is a no-op
        assert!(!seg.add_estimate(&silent, 500.0));
        assert_eq!(seg.notes().len(), 1);
    }

    #[test]
    fn test_out_of_order_rejected() {
        let mut seg = segmenter(false);
        seg.add_note(Some(440.0), 0.2, 500.0, false);
        assert!(!seg.add_note(Some(880.0), 0.2, 400.0, true));
        assert!(!seg.add_note(Some(880.0), 0.2, 500.0, true));
        assert_eq!(seg.notes().len(), 1);
    }

    #[test]
    fn test_start_times_strictly_increase() {
        let mut seg = segmenter(false);
        let pitches = [440.0, 494.0, 523.0, 523.0, 440.0, 392.0];
        for (i, hz) in pitches.iter().enumerate() {
            seg.add_note(Some(*hz), 0.3, i as f64 * 30.0, false);
        }
        let notes = seg.finalize(200.0);
        assert_eq!(notes.len(), 5);
        assert!(notes.windows(2).all(|w| w[0].start_ms < w[1].start_ms));
        assert!(notes.iter().all(|n| n.closed));
    }

    #[test]
    fn test_velocity_mapping() {
        let mut seg = segmenter(false);
        seg.add_note(Some(440.0), 0.25, 0.0, false);
        seg.add_note(Some(880.0), 2.0, 100.0, false);
        // 40 + 200 * 0.25 = 90; 40 + 400 clamps to 127
        assert_eq!(seg.notes()[0].velocity, 90);
        assert_eq!(seg.notes()[1].velocity, 127);
    }

    #[test]
    fn test_smoothing_uses_mean_of_gated_pitches() {
        let mut seg = segmenter(true);
        seg.add_note(Some(440.0), 0.2, 0.0, false);
        // Dropped by the refractory gate but accumulated
        seg.add_note(Some(500.0), 0.2, 10.0, false);
        // Mean of 500 and 560 is 530 Hz -> MIDI 72 (C5 = 523 Hz)
        seg.add_note(Some(560.0), 0.2, 30.0, false);

        let notes = seg.notes();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].midi, 69);
        assert_eq!(notes[1].midi, 72);
    }

    #[test]
    fn test_preview_listener() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let mut seg = segmenter(false);
        seg.on_preview_note(move |note| sink.lock().unwrap().push(note.midi));
        seg.add_note(Some(440.0), 0.2, 0.0, false);
        seg.add_note(Some(440.0), 0.2, 50.0, false);
        seg.add_note(Some(880.0), 0.2, 100.0, false);

        assert_eq!(*seen.lock().unwrap(), vec![69, 81]);
    }

    #[test]
    fn test_reset_moves_origin() {
        let mut seg = segmenter(false);
        seg.add_note(Some(440.0), 0.2, 0.0, false);
        seg.reset(10_000.0);
        assert!(seg.notes().is_empty());
        assert!(!seg.is_note_open());

        seg.add_note(Some(440.0), 0.2, 10_250.0, false);
        let notes = seg.finalize(10_750.0);
        assert_eq!(notes[0].start_ms, 250.0);
        assert_eq!(notes[0].duration_ms, 500.0);
    }
}
