//! Feeding audio through the estimator and segmenter.
//!
//! [`ChunkDriver`] walks a complete waveform in fixed windows (offline mode).
//! [`LiveTranscriber`] analyses buffers as a capture callback delivers them,
//! timed by the wall clock (real-time mode).

use super::estimator::{estimate, EstimatorSettings, PitchEstimate};
use super::segmenter::{NoteSegmenter, SegmenterSettings};
use crate::config::TranscriberConfig;
use crate::error::ValidationError;
use crate::midi::NoteEvent;
use std::ops::Range;
use std::time::Instant;

/// Offline windowing of a full waveform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkDriver {
    sample_rate: u32,
    /// Distance between window starts, in samples.
    chunk_size: usize,
    /// Maximum samples analysed per window.
    window_cap: usize,
    estimator: EstimatorSettings,
}

impl ChunkDriver {
    /// Creates a driver for audio at `sample_rate`.
    ///
    /// Chunk size follows tempo and resolution; each window is capped at
    /// `config.min_sample` samples.
    pub fn new(config: &TranscriberConfig, sample_rate: u32) -> Self {
        Self {
            sample_rate,
            chunk_size: config.chunk_size_for(sample_rate),
            window_cap: config.min_sample.max(1),
            estimator: config.estimator_settings(),
        }
    }

    /// Distance between window starts in samples.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Analysis windows over a buffer of `len` samples, in order.
    ///
    /// The last window may be shorter than the others.
    pub fn windows(&self, len: usize) -> impl Iterator<Item = Range<usize>> + '_ {
        (0..len).step_by(self.chunk_size).map(move |start| {
            let end = (start + self.chunk_size.min(self.window_cap)).min(len);
            start..end
        })
    }

    /// Time in milliseconds of a sample position.
    pub fn position_to_ms(&self, position: usize) -> f64 {
        position as f64 * 1000.0 / self.sample_rate as f64
    }

    /// Feeds every window of `samples` through the estimator into
    /// `segmenter`, timing each at its first sample.
    ///
    /// # Returns
    ///
    /// The end-of-stream time in milliseconds, for finalizing the segmenter.
    pub fn run(&self, samples: &[f32], segmenter: &mut NoteSegmenter) -> f64 {
        let mut windows = 0usize;
        let mut accepted = 0usize;

        for window in self.windows(samples.len()) {
            let time_ms = self.position_to_ms(window.start);
            let result = estimate(&samples[window], self.sample_rate, &self.estimator);
            if segmenter.add_estimate(&result, time_ms) {
                accepted += 1;
            }
            windows += 1;
        }

        tracing::debug!(
            windows,
            accepted,
            chunk_size = self.chunk_size,
            notes = segmenter.notes().len(),
            "analysed waveform"
        );
        self.position_to_ms(samples.len())
    }
}

/// Listener fired when a live session starts.
pub type StartListener = Box<dyn FnMut() + Send>;

/// Listener fired when a live session stops, with the finalized notes.
pub type StopListener = Box<dyn FnMut(&[NoteEvent]) + Send>;

/// Which clock times the buffers of the current session.
#[derive(Debug, Clone, Copy, PartialEq)]
enum SessionClock {
    Idle,
    Wall(Instant),
    External,
}

/// Real-time transcription of a stream of captured buffers.
///
/// The owner of the capture device calls [`LiveTranscriber::process`] from
/// its callback (serialized, one buffer at a time) and [`LiveTranscriber::stop`]
/// when recording ends. A session times its buffers either by the wall
/// clock ([`LiveTranscriber::start`], or implicitly on the first `process`)
/// or by caller-supplied timestamps ([`LiveTranscriber::start_at`] and
/// [`LiveTranscriber::process_at`]).
pub struct LiveTranscriber {
    segmenter: NoteSegmenter,
    estimator: EstimatorSettings,
    sample_rate: u32,
    clock: SessionClock,
    /// Latest buffer time seen, on the session clock.
    last_time_ms: Option<f64>,
    start_listeners: Vec<StartListener>,
    stop_listeners: Vec<StopListener>,
}

impl std::fmt::Debug for LiveTranscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveTranscriber")
            .field("segmenter", &self.segmenter)
            .field("sample_rate", &self.sample_rate)
            .field("clock", &self.clock)
            .field("last_time_ms", &self.last_time_ms)
            .field("start_listeners", &self.start_listeners.len())
            .field("stop_listeners", &self.stop_listeners.len())
            .finish()
    }
}

impl LiveTranscriber {
    /// Creates a transcriber for buffers captured at `sample_rate`.
    pub fn new(config: &TranscriberConfig, sample_rate: u32) -> Self {
        Self {
            segmenter: NoteSegmenter::new(SegmenterSettings::from(config)),
            estimator: config.estimator_settings(),
            sample_rate,
            clock: SessionClock::Idle,
            last_time_ms: None,
            start_listeners: Vec::new(),
            stop_listeners: Vec::new(),
        }
    }

    /// Registers a listener fired when a note opens.
    pub fn on_preview_note<F>(&mut self, listener: F)
    where
        F: FnMut(&NoteEvent) + Send + 'static,
    {
        self.segmenter.on_preview_note(listener);
    }

    /// Registers a listener fired when a session starts.
    pub fn on_start<F>(&mut self, listener: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.start_listeners.push(Box::new(listener));
    }

    /// Registers a listener fired with the finalized notes when a session stops.
    pub fn on_stop<F>(&mut self, listener: F)
    where
        F: FnMut(&[NoteEvent]) + Send + 'static,
    {
        self.stop_listeners.push(Box::new(listener));
    }

    /// Starts a session with its origin at the current instant.
    pub fn start(&mut self) {
        self.begin(SessionClock::Wall(Instant::now()), 0.0);
    }

    /// Starts a session whose timestamps are measured on an external clock.
    pub fn start_at(&mut self, origin_ms: f64) {
        self.begin(SessionClock::External, origin_ms);
    }

    fn begin(&mut self, clock: SessionClock, origin_ms: f64) {
        self.clock = clock;
        self.last_time_ms = None;
        self.segmenter.reset(origin_ms);
        tracing::debug!(?clock, origin_ms, "live session started");
        for listener in &mut self.start_listeners {
            listener();
        }
    }

    /// Whether a session is in progress.
    pub fn is_running(&self) -> bool {
        self.clock != SessionClock::Idle
    }

    /// Milliseconds since the session origin.
    ///
    /// With an external clock this is the time of the latest buffer. Outside
    /// a session it is 0.
    pub fn elapsed_ms(&self) -> f64 {
        match self.clock {
            SessionClock::Idle => 0.0,
            SessionClock::Wall(origin) => origin.elapsed().as_secs_f64() * 1000.0,
            SessionClock::External => self
                .last_time_ms
                .map_or(0.0, |t| t - self.segmenter.time_offset_ms()),
        }
    }

    /// Analyses a buffer delivered now, starting a wall-clock session if none
    /// is running.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::ClockMismatch` if the session was started
    /// with [`LiveTranscriber::start_at`].
    pub fn process(&mut self, samples: &[f32]) -> Result<PitchEstimate, ValidationError> {
        match self.clock {
            SessionClock::Idle => self.start(),
            SessionClock::External => return Err(ValidationError::ClockMismatch),
            SessionClock::Wall(_) => {}
        }
        let now = self.elapsed_ms();
        Ok(self.process_at(now, samples))
    }

    /// Analyses a buffer captured at `time_ms` on the session clock.
    ///
    /// Outside a session this starts an external-clock session at origin 0.
    pub fn process_at(&mut self, time_ms: f64, samples: &[f32]) -> PitchEstimate {
        if self.clock == SessionClock::Idle {
            self.start_at(0.0);
        }
        let result = estimate(samples, self.sample_rate, &self.estimator);
        self.segmenter.add_estimate(&result, time_ms);
        self.last_time_ms = Some(self.last_time_ms.map_or(time_ms, |t| t.max(time_ms)));
        result
    }

    /// Notes so far; the last may still be open.
    pub fn notes(&self) -> &[NoteEvent] {
        self.segmenter.notes()
    }

    /// Ends the session and returns the finalized notes.
    ///
    /// A wall-clock session ends now. An external-clock session ends at the
    /// latest buffer time passed to [`LiveTranscriber::process_at`].
    pub fn stop(&mut self) -> Vec<NoteEvent> {
        let end = match self.clock {
            SessionClock::Wall(_) => self.elapsed_ms(),
            SessionClock::External | SessionClock::Idle => self
                .last_time_ms
                .unwrap_or_else(|| self.segmenter.time_offset_ms()),
        };
        self.stop_at(end)
    }

    /// Ends the session at `time_ms` and returns the finalized notes.
    pub fn stop_at(&mut self, time_ms: f64) -> Vec<NoteEvent> {
        self.clock = SessionClock::Idle;
        let notes = self.segmenter.finalize(time_ms).to_vec();
        tracing::debug!(notes = notes.len(), end_ms = time_ms, "live session stopped");
        for listener in &mut self.stop_listeners {
            listener(&notes);
        }
        notes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn tone(freq: f64, sample_rate: u32, ms: f64) -> Vec<f32> {
        let len = (sample_rate as f64 * ms / 1000.0) as usize;
        (0..len)
            .map(|i| (0.5 * (2.0 * PI * freq * i as f64 / sample_rate as f64).sin()) as f32)
            .collect()
    }

    fn config() -> TranscriberConfig {
        TranscriberConfig {
            tempo: 80.0,
            resolution: 32,
            sample_rate: 32_000,
            ..Default::default()
        }
    }

    #[test]
    fn test_windows_cover_buffer() {
        let driver = ChunkDriver::new(&config(), 32_000);
        assert_eq!(driver.chunk_size(), 3000);

        let windows: Vec<_> = driver.windows(7_200).collect();
        assert_eq!(windows, vec![0..500, 3000..3500, 6000..6500]);

        // Final partial window shorter than the cap is still produced
        let windows: Vec<_> = driver.windows(6_100).collect();
        assert_eq!(windows.last(), Some(&(6000..6100)));

        assert_eq!(driver.windows(0).count(), 0);
    }

    #[test]
    fn test_position_to_ms() {
        let driver = ChunkDriver::new(&config(), 32_000);
        assert_eq!(driver.position_to_ms(3000), 93.75);
        assert_eq!(driver.position_to_ms(32_000), 1000.0);
    }

    #[test]
    fn test_offline_single_tone() {
        let cfg = config();
        let samples = tone(440.0, 32_000, 600.0);
        let driver = ChunkDriver::new(&cfg, 32_000);
        let mut seg = NoteSegmenter::new(SegmenterSettings::from(&cfg));

        let end = driver.run(&samples, &mut seg);
        assert_eq!(end, 600.0);

        let notes = seg.finalize(end);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].midi, 69);
        assert_eq!(notes[0].start_ms, 0.0);
        assert_eq!(notes[0].duration_ms, 600.0);
    }

    #[test]
    fn test_live_session_with_external_clock() {
        let cfg = config();
        let mut live = LiveTranscriber::new(&cfg, 32_000);
        live.start_at(1_000.0);

        let a4 = tone(440.0, 32_000, 32.0);
        let silence = vec![0.0f32; a4.len()];

        assert!(live.process_at(1_000.0, &a4).has_pitch());
        live.process_at(1_100.0, &a4);
        assert!(!live.process_at(1_200.0, &silence).has_pitch());
        live.process_at(1_300.0, &tone(880.0, 32_000, 32.0));

        let notes = live.stop_at(1_500.0);
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].midi, 69);
        assert_eq!(notes[0].start_ms, 0.0);
        assert_eq!(notes[0].duration_ms, 200.0);
        assert_eq!(notes[1].midi, 81);
        assert_eq!(notes[1].start_ms, 300.0);
        assert_eq!(notes[1].duration_ms, 200.0);
    }

    #[test]
    fn test_live_session_with_wall_clock() {
        let mut live = LiveTranscriber::new(&config(), 32_000);
        live.start();
        live.process(&tone(440.0, 32_000, 32.0)).unwrap();
        assert_eq!(live.notes().len(), 1);

        let notes = live.stop();
        assert!(notes[0].closed);
        assert!(notes[0].duration_ms >= 0.0);
        assert!(!live.is_running());
    }

    #[test]
    fn test_process_without_start_uses_wall_clock() {
        let mut live = LiveTranscriber::new(&config(), 32_000);
        assert!(!live.is_running());

        live.process(&tone(440.0, 32_000, 32.0)).unwrap();
        assert!(live.is_running());
        std::thread::sleep(Duration::from_millis(60));
        live.process(&tone(880.0, 32_000, 32.0)).unwrap();

        let notes = live.stop();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].midi, 69);
        assert!(notes[0].duration_ms >= 55.0);
        assert_eq!(notes[1].midi, 81);
        assert!(notes.iter().all(|n| n.closed));
    }

    #[test]
    fn test_stop_ends_external_session_at_last_buffer() {
        let mut live = LiveTranscriber::new(&config(), 32_000);
        live.start_at(1_000.0);

        let a4 = tone(440.0, 32_000, 32.0);
        live.process_at(1_000.0, &a4);
        live.process_at(1_400.0, &a4);
        assert_eq!(live.elapsed_ms(), 400.0);

        let notes = live.stop();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].start_ms, 0.0);
        assert_eq!(notes[0].duration_ms, 400.0);
    }

    #[test]
    fn test_wall_clock_call_on_external_session_is_rejected() {
        let mut live = LiveTranscriber::new(&config(), 32_000);
        live.start_at(0.0);
        assert_eq!(
            live.process(&tone(440.0, 32_000, 32.0)),
            Err(ValidationError::ClockMismatch)
        );
        assert!(live.notes().is_empty());
    }

    #[test]
    fn test_start_and_stop_listeners() {
        let starts = Arc::new(AtomicUsize::new(0));
        let stopped_with = Arc::new(AtomicUsize::new(usize::MAX));

        let mut live = LiveTranscriber::new(&config(), 32_000);
        let counter = Arc::clone(&starts);
        live.on_start(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let seen = Arc::clone(&stopped_with);
        live.on_stop(move |notes| {
            seen.store(notes.len(), Ordering::SeqCst);
        });

        live.start_at(0.0);
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        live.process_at(0.0, &tone(440.0, 32_000, 32.0));
        live.stop_at(250.0);
        assert_eq!(stopped_with.load(Ordering::SeqCst), 1);

        // A new session resets the notes and fires the start listener again
        live.start_at(0.0);
        assert_eq!(starts.load(Ordering::SeqCst), 2);
        assert!(live.notes().is_empty());
    }
}
