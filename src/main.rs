//! sound2midi - converts monophonic recordings into MIDI files.
//!
//! Each input WAV file is transcribed independently and written next to the
//! input (or into `--output`) as a Standard MIDI File.
//!
//! # Usage
//!
//! ```bash
//! sound2midi melody.wav                      # writes melody.mid
//! sound2midi -t 90 -o out/ take1.wav take2.wav
//! sound2midi --base64 --notes-json hum.wav   # writes hum.b64 and hum.notes.json
//! sound2midi --inspect melody.mid
//! ```

use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use sound2midi::midi::{note_from_number, parse_smf};
use sound2midi::{load_wav, MidiOutput, Transcriber, TranscriberConfig};
use std::fs;
use std::path::{Path, PathBuf};

/// What the invocation should do.
enum Command {
    /// Transcribe WAV files.
    Convert,
    /// Print the notes of an existing MIDI file.
    Inspect(PathBuf),
    /// Print the effective configuration as JSON.
    ShowConfig,
}

/// Command-line options for the application.
struct CliOptions {
    command: Command,
    inputs: Vec<PathBuf>,
    output_dir: Option<PathBuf>,
    config_path: Option<PathBuf>,
    base64: bool,
    notes_json: bool,
    overrides: Vec<(String, String)>,
}

const USAGE: &str = "\
sound2midi - transcribe monophonic audio to MIDI

Usage: sound2midi [OPTIONS] <INPUT.wav>...
       sound2midi --inspect <FILE.mid>
       sound2midi --show-config [OPTIONS]

Options:
  -o, --output DIR        Directory for output files (default: next to input)
  -c, --config PATH       JSON configuration file
  -t, --tempo BPM         Tempo written to the MIDI file
      --ppqn N            Ticks per quarter note
      --channel N         MIDI channel (0-15)
      --resolution N      Notes per beat
      --pitch-min HZ      Lowest accepted pitch
      --pitch-max HZ      Highest accepted pitch
      --no-smoothing      Map instantaneous pitch instead of the running mean
      --base64            Write base64 text (.b64) instead of binary .mid
      --notes-json        Also write the note list as JSON
      --inspect FILE      Print the notes of a MIDI file and exit
      --show-config       Print the effective configuration and exit
  -h, --help              Print this help message

Set RUST_LOG=debug for progress logging.";

impl CliOptions {
    /// Parses command-line arguments.
    fn parse() -> Result<Self> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let mut options = CliOptions {
            command: Command::Convert,
            inputs: Vec::new(),
            output_dir: None,
            config_path: None,
            base64: false,
            notes_json: false,
            overrides: Vec::new(),
        };

        let mut iter = args.into_iter();
        while let Some(arg) = iter.next() {
            let mut value = |name: &str| {
                iter.next()
                    .with_context(|| format!("{} requires a value", name))
            };
            match arg.as_str() {
                "-o" | "--output" => options.output_dir = Some(PathBuf::from(value(&arg)?)),
                "-c" | "--config" => options.config_path = Some(PathBuf::from(value(&arg)?)),
                "-t" | "--tempo" => options.overrides.push(("tempo".into(), value(&arg)?)),
                "--ppqn" | "--channel" | "--resolution" | "--pitch-min" | "--pitch-max" => {
                    let key = arg.trim_start_matches("--").replace('-', "_");
                    options.overrides.push((key, value(&arg)?));
                }
                "--no-smoothing" => options.overrides.push(("smoothing".into(), "false".into())),
                "--base64" => options.base64 = true,
                "--notes-json" => options.notes_json = true,
                "--inspect" => options.command = Command::Inspect(PathBuf::from(value(&arg)?)),
                "--show-config" => options.command = Command::ShowConfig,
                "-h" | "--help" => {
                    eprintln!("{}", USAGE);
                    std::process::exit(0);
                }
                other if other.starts_with('-') => {
                    bail!("Unknown option: {}\nUse --help for usage information", other)
                }
                other => options.inputs.push(PathBuf::from(other)),
            }
        }

        Ok(options)
    }

    /// Builds the configuration from the optional file plus CLI overrides.
    fn config(&self) -> Result<TranscriberConfig> {
        let mut config = match &self.config_path {
            Some(path) => TranscriberConfig::load_from_file(path)?,
            None => TranscriberConfig::default(),
        };

        for (key, raw) in &self.overrides {
            let parse_err = || format!("invalid value for {}: {}", key, raw);
            match key.as_str() {
                "tempo" => config.tempo = raw.parse().with_context(parse_err)?,
                "ppqn" => config.ppqn = raw.parse().with_context(parse_err)?,
                "channel" => config.channel = raw.parse().with_context(parse_err)?,
                "resolution" => config.resolution = raw.parse().with_context(parse_err)?,
                "pitch_min" => config.pitch_min = raw.parse().with_context(parse_err)?,
                "pitch_max" => config.pitch_max = raw.parse().with_context(parse_err)?,
                "smoothing" => config.smoothing = raw.parse().with_context(parse_err)?,
                _ => unreachable!("override keys come from the option table"),
            }
        }

        config.validate()?;
        Ok(config)
    }
}

/// Transcribes one WAV file and writes its outputs. Returns the MIDI path.
fn convert_file(input: &Path, options: &CliOptions, config: &TranscriberConfig) -> Result<PathBuf> {
    let audio = load_wav(input).with_context(|| format!("Failed to load {}", input.display()))?;

    let mut transcriber = Transcriber::new(config.clone())?;
    let note_count = transcriber.sound_to_notes(&audio).len();
    tracing::info!(
        input = %input.display(),
        notes = note_count,
        duration_ms = audio.duration_ms(),
        "transcribed"
    );

    let output = transcriber
        .create_output(!options.base64)
        .with_context(|| format!("No notes detected in {}", input.display()))?;

    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("transcription");
    let dir = match &options.output_dir {
        Some(dir) => dir.clone(),
        None => input.parent().map(Path::to_path_buf).unwrap_or_default(),
    };

    let extension = match output {
        MidiOutput::Raw(_) => "mid",
        MidiOutput::Base64(_) => "b64",
    };
    let midi_path = dir.join(format!("{}.{}", stem, extension));
    fs::write(&midi_path, output.into_bytes())
        .with_context(|| format!("Failed to write {}", midi_path.display()))?;

    if options.notes_json {
        let json_path = dir.join(format!("{}.notes.json", stem));
        let json = serde_json::to_string_pretty(transcriber.notes())?;
        fs::write(&json_path, json)
            .with_context(|| format!("Failed to write {}", json_path.display()))?;
    }

    Ok(midi_path)
}

/// Prints the notes of a MIDI file.
fn inspect(path: &Path) -> Result<()> {
    let data = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let smf = parse_smf(&data).with_context(|| format!("Failed to parse {}", path.display()))?;

    println!("{}", path.display());
    println!("  ppqn:  {}", smf.ppqn);
    match smf.tempo_bpm() {
        Some(bpm) => println!("  tempo: {:.2} BPM", bpm),
        None => println!("  tempo: (none)"),
    }
    println!("  notes: {}", smf.notes.len());
    for note in &smf.notes {
        println!(
            "  ch {:>2}  {:<4} vel {:>3}  ticks {:>6}..{:<6}",
            note.channel,
            note_from_number(note.key, false),
            note.velocity,
            note.on_tick,
            note.off_tick
        );
    }
    Ok(())
}

/// Main entry point.
fn main() -> Result<()> {
    let cli = CliOptions::parse()?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Command::Inspect(path) => return inspect(path),
        Command::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&cli.config()?)?);
            return Ok(());
        }
        Command::Convert => {}
    }

    if cli.inputs.is_empty() {
        eprintln!("{}", USAGE);
        bail!("No input files given");
    }
    let config = cli.config().context("Invalid configuration")?;

    if let Some(dir) = &cli.output_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    }

    // Each file gets its own transcriber; nothing is shared between them
    let results: Vec<(PathBuf, Result<PathBuf>)> = cli
        .inputs
        .par_iter()
        .map(|input| (input.clone(), convert_file(input, &cli, &config)))
        .collect();

    let mut failures = 0;
    for (input, result) in results {
        match result {
            Ok(path) => println!("{} -> {}", input.display(), path.display()),
            Err(e) => {
                tracing::error!("Conversion of {} failed: {:?}", input.display(), e);
                eprintln!("Error: {}: {:#}", input.display(), e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("{} of {} files failed", failures, cli.inputs.len());
    }
    Ok(())
}
