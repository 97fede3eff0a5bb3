//! End-to-end transcription of a waveform into MIDI.
//!
//! [`Transcriber`] ties together one configuration, one segmenter and the
//! encoder: load samples, call [`Transcriber::sound_to_notes`], then
//! [`Transcriber::create_output`].

use crate::analysis::{ChunkDriver, NoteSegmenter, SegmenterSettings};
use crate::audio::SampleBuffer;
use crate::config::TranscriberConfig;
use crate::error::ValidationError;
use crate::midi::{encode, MidiOutput, NoteEvent};

/// Converts one waveform at a time into notes and SMF output.
#[derive(Debug)]
pub struct Transcriber {
    config: TranscriberConfig,
    segmenter: NoteSegmenter,
}

impl Transcriber {
    /// Creates a transcriber after validating `config`.
    ///
    /// # Errors
    ///
    /// Returns the first invalid configuration field.
    pub fn new(config: TranscriberConfig) -> Result<Self, ValidationError> {
        config.validate()?;
        let segmenter = NoteSegmenter::new(SegmenterSettings::from(&config));
        Ok(Self { config, segmenter })
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &TranscriberConfig {
        &self.config
    }

    /// Registers a listener fired synchronously whenever a note opens.
    pub fn on_preview_note<F>(&mut self, listener: F)
    where
        F: FnMut(&NoteEvent) + Send + 'static,
    {
        self.segmenter.on_preview_note(listener);
    }

    /// Transcribes a complete waveform, replacing any previous result.
    ///
    /// The waveform is analysed at its own sample rate. The returned notes
    /// are all closed; the last one ends at the end of the buffer.
    pub fn sound_to_notes(&mut self, audio: &SampleBuffer) -> &[NoteEvent] {
        self.segmenter.reset(0.0);
        if audio.sample_rate == 0 || audio.is_empty() {
            tracing::warn!("empty or rate-less buffer, nothing to transcribe");
            return self.segmenter.notes();
        }
        if audio.sample_rate != self.config.sample_rate {
            tracing::debug!(
                expected = self.config.sample_rate,
                actual = audio.sample_rate,
                "analysing at the buffer's own sample rate"
            );
        }

        let driver = ChunkDriver::new(&self.config, audio.sample_rate);
        let end_ms = driver.run(&audio.samples, &mut self.segmenter);
        self.segmenter.finalize(end_ms)
    }

    /// Notes from the last transcription.
    pub fn notes(&self) -> &[NoteEvent] {
        self.segmenter.notes()
    }

    /// Encodes the last transcription as a Standard MIDI File.
    ///
    /// # Arguments
    ///
    /// * `raw` - Return raw bytes instead of base64 text
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyNoteList` if nothing was transcribed.
    pub fn create_output(&self, raw: bool) -> Result<MidiOutput, ValidationError> {
        let bytes = encode(
            self.segmenter.notes(),
            self.config.tempo,
            self.config.ppqn,
            self.config.channel,
        )?;
        Ok(MidiOutput::from_smf(bytes, raw))
    }
}
