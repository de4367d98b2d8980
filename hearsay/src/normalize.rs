//! Normalize subcommand - convert source audio to 16 kHz mono WAV.

use color_eyre::Section;
use eyre::{Result, eyre};
use hearsay_eval::audio;
use std::path::PathBuf;
use std::time::Instant;

/// CLI arguments for audio normalization.
#[derive(clap::Args, Debug)]
pub struct Args {
    /// Directory of source audio files (wav, mp3, flac, ogg)
    pub input: PathBuf,

    /// Output directory for normalized WAVs (mirrors the input layout)
    #[arg(short, long)]
    pub output: PathBuf,
}

/// Resolved configuration for audio normalization.
#[derive(Debug)]
pub struct Config {
    pub input: PathBuf,
    pub output: PathBuf,
}

impl TryFrom<Args> for Config {
    type Error = eyre::Error;

    fn try_from(args: Args) -> Result<Self> {
        if !args.input.is_dir() {
            return Err(eyre!("input is not a directory: {:?}", args.input.display())
                .suggestion("pass the directory that holds the source audio files"));
        }

        Ok(Self {
            input: args.input,
            output: args.output,
        })
    }
}

pub fn execute(config: Config) -> Result<()> {
    tracing::info!(
        input = ?config.input.display(),
        output = ?config.output.display(),
        "normalizing audio"
    );

    let s = Instant::now();
    let summary = audio::normalize_dir(&config.input, &config.output)?;
    let d = s.elapsed();

    tracing::info!(
        duration = %format!("{:.2}s", d.as_secs_f32()),
        converted = summary.converted,
        skipped = summary.skipped,
        failed = summary.failed,
        "normalization finished"
    );

    println!(
        "normalized {} file(s), skipped {}, failed {}",
        summary.converted, summary.skipped, summary.failed
    );

    if summary.converted + summary.skipped == 0 {
        return Err(eyre!("no audio files found under {:?}", config.input.display())
            .suggestion("supported extensions: wav, mp3, flac, ogg"));
    }

    Ok(())
}
