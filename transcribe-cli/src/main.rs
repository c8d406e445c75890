//! # Transcribe - command line front end
//!
//! Hosts the transcription core the way an editor would:
//! - **Audio**: decodes a WAV file to mono and runs the pitch scan on a
//!   dedicated worker thread, printing progress on stderr
//! - **Notes**: segments the pitch track and writes ABC-style notation
//! - **Readback**: decodes notation files into note lists (text or JSON)
//!
//! Logging goes through `env_logger`; set `RUST_LOG=debug` for detail.

mod cli;
mod wav;

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use transcribe_core::{
    analysis::{self, AnalysisEvent},
    notation::{self, NotationMetadata},
    segment, NoteEvent, PipelineConfig, PitchTrack,
};

use cli::{AudioArgs, Cli, Commands, NotesArgs};

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Audio(args) => transcribe_audio(&args),
        Commands::Notes(args) => print_notes(&args),
    }
}

fn transcribe_audio(args: &AudioArgs) -> Result<()> {
    let recording = wav::read_mono(&args.input)?;
    log::info!(
        "loaded {}: {:.2}s at {} Hz",
        args.input.display(),
        recording.duration(),
        recording.sample_rate
    );

    let config = load_config(args, recording.sample_rate)?;
    let sample_rate = recording.sample_rate;
    let track = run_analysis(recording.samples, sample_rate, &config)?;

    let notes = segment::segment(&track, &config.segmentation, &args.taps);
    let rendering = notation::render(&notes, &args.notation_options());
    eprintln!(
        "{} notes, {} BPM, {} frames analyzed",
        notes.len(),
        rendering.tempo_bpm,
        track.len()
    );

    write_output(args.output.as_deref(), &rendering.text)
}

/// Reads the optional config file and applies command line overrides.
fn load_config(args: &AudioArgs, sample_rate: u32) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let data = fs::read_to_string(path)
                .with_context(|| format!("cannot read config {}", path.display()))?;
            serde_json::from_str(&data)
                .with_context(|| format!("invalid config {}", path.display()))?
        }
        None => PipelineConfig::default(),
    };

    if let Some(frame_size) = args.frame_size {
        config.analysis.frame_size = frame_size;
    }
    if let Some(hop_size) = args.hop_size {
        config.analysis.hop_size = hop_size;
    }
    if let Some(confidence) = args.confidence {
        config.segmentation.confidence_threshold = confidence;
    }
    if let Some(min_duration) = args.min_duration {
        config.segmentation.min_note_duration = min_duration;
    }

    config
        .validate(sample_rate)
        .context("unusable analysis settings")?;
    log::debug!("using {config:?}");
    Ok(config)
}

/// Runs the pitch scan on a worker thread and reports progress on stderr.
fn run_analysis(
    samples: Vec<f32>,
    sample_rate: u32,
    config: &PipelineConfig,
) -> Result<PitchTrack> {
    let worker = analysis::spawn_analysis(samples, sample_rate, config.analysis);
    let mut stderr = io::stderr();

    for event in worker.events().iter() {
        match event {
            AnalysisEvent::Progress(fraction) => {
                let _ = write!(stderr, "\ranalyzing {:3.0}%", fraction * 100.0);
                let _ = stderr.flush();
            }
            AnalysisEvent::Finished(track) => {
                let _ = writeln!(stderr);
                return Ok(track);
            }
            AnalysisEvent::Cancelled => break,
        }
    }
    let _ = writeln!(stderr);
    bail!("pitch analysis stopped before finishing")
}

fn write_output(path: Option<&Path>, text: &str) -> Result<()> {
    match path {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("cannot write {}", path.display()))?;
            log::info!("wrote {}", path.display());
        }
        None => io::stdout()
            .write_all(text.as_bytes())
            .context("cannot write to stdout")?,
    }
    Ok(())
}

#[derive(Serialize)]
struct NotesDump<'a> {
    metadata: &'a NotationMetadata,
    notes: &'a [NoteEvent],
}

fn print_notes(args: &NotesArgs) -> Result<()> {
    let text = fs::read_to_string(&args.input)
        .with_context(|| format!("cannot read {}", args.input.display()))?;
    let decoded = notation::decode_str(&text)
        .with_context(|| format!("cannot decode {}", args.input.display()))?;

    let mut out = io::stdout().lock();
    if args.json {
        let dump = NotesDump {
            metadata: &decoded.metadata,
            notes: &decoded.notes,
        };
        serde_json::to_writer_pretty(&mut out, &dump)?;
        writeln!(out)?;
        return Ok(());
    }

    let metadata = &decoded.metadata;
    writeln!(
        out,
        "{} ({} BPM, {}, key {})",
        metadata.title, metadata.tempo_bpm, metadata.meter, metadata.key
    )?;
    for note in &decoded.notes {
        writeln!(
            out,
            "{:>4}  {:<4} {:>8.3}s {:>8.3}s",
            note.id,
            note.name(),
            note.start_time,
            note.end_time
        )?;
    }
    Ok(())
}
