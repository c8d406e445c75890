//! Command line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use transcribe_core::notation::{
    key::KeySignature, Meter, NotationOptions, DEFAULT_KEY, DEFAULT_TITLE,
};

/// Monophonic audio to ABC-style notation
#[derive(Parser, Debug)]
#[command(name = "transcribe")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Transcribe a WAV recording into notation
    Audio(AudioArgs),
    /// Read a notation file back into a note list
    Notes(NotesArgs),
}

#[derive(Args, Debug)]
pub struct AudioArgs {
    /// WAV file to transcribe (mixed down to mono)
    pub input: PathBuf,

    /// Note onsets in seconds, comma separated; switches to tap-guided segmentation
    #[arg(long, value_delimiter = ',')]
    pub taps: Vec<f64>,

    /// Tempo in quarter notes per minute (estimated from the notes if omitted)
    #[arg(long)]
    pub tempo: Option<u32>,

    /// Time signature such as 4/4, 3/4 or 6/8
    #[arg(long, default_value = "4/4")]
    pub meter: Meter,

    /// Key signature such as C, G, Bb, F#m or "D dor"
    #[arg(long, default_value = DEFAULT_KEY, value_parser = parse_key)]
    pub key: String,

    /// Title written to the notation header
    #[arg(long, default_value = DEFAULT_TITLE)]
    pub title: String,

    /// Semitones added to every note before writing
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub transpose: i32,

    /// JSON file with `analysis` and `segmentation` settings
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Samples per analysis frame (overrides the config file)
    #[arg(long)]
    pub frame_size: Option<usize>,

    /// Samples between analysis frames (overrides the config file)
    #[arg(long)]
    pub hop_size: Option<usize>,

    /// Minimum pitch confidence for a voiced frame (overrides the config file)
    #[arg(long)]
    pub confidence: Option<f32>,

    /// Shortest note in seconds (overrides the config file)
    #[arg(long)]
    pub min_duration: Option<f64>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl AudioArgs {
    pub fn notation_options(&self) -> NotationOptions {
        NotationOptions {
            title: self.title.clone(),
            tempo_bpm: self.tempo,
            meter: self.meter,
            key: self.key.clone(),
            transpose_semitones: self.transpose,
        }
    }
}

#[derive(Args, Debug)]
pub struct NotesArgs {
    /// Notation file to read
    pub input: PathBuf,

    /// Print notes and metadata as JSON
    #[arg(long)]
    pub json: bool,
}

fn parse_key(value: &str) -> Result<String, String> {
    match KeySignature::parse(value) {
        Some(_) => Ok(value.trim().to_string()),
        None => Err(format!("unknown key signature '{value}'")),
    }
}
