//! Manifest subcommand - quality-control metadata and build split manifests.

use color_eyre::Section;
use eyre::{Context, Result, eyre};
use hearsay_eval::manifest::{self, QcPolicy};
use hearsay_eval::split::SplitConfig;
use hearsay_eval::types::Split;
use std::path::PathBuf;

/// CLI arguments for manifest construction.
#[derive(clap::Args, Debug)]
pub struct Args {
    /// Source metadata JSONL (one record per line)
    pub metadata: PathBuf,

    /// Root directory of normalized audio, for existence checks and
    /// relative-path resolution
    #[arg(short, long)]
    pub audio_root: Option<PathBuf>,

    /// Output directory for manifest_<split>.jsonl files
    #[arg(short, long, default_value = "manifests")]
    pub output: PathBuf,

    /// Seed for the speaker-grouped split shuffle
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Fraction of utterances assigned to test
    #[arg(long, default_value_t = 0.15)]
    pub test_fraction: f64,

    /// Fraction of the remaining utterances assigned to dev
    #[arg(long, default_value_t = 0.10)]
    pub dev_fraction: f64,

    /// Minimum utterance duration in seconds
    #[arg(long, default_value_t = 0.3)]
    pub min_duration_secs: f64,

    /// Maximum utterance duration in seconds
    #[arg(long, default_value_t = 30.0)]
    pub max_duration_secs: f64,

    /// Skip on-disk audio checks (existence, measured duration)
    #[arg(long)]
    pub no_audio_check: bool,
}

/// Resolved configuration for manifest construction.
#[derive(Debug)]
pub struct Config {
    pub metadata: PathBuf,
    pub audio_root: Option<PathBuf>,
    pub output: PathBuf,
    pub policy: QcPolicy,
    pub split: SplitConfig,
}

impl TryFrom<Args> for Config {
    type Error = eyre::Error;

    fn try_from(args: Args) -> Result<Self> {
        for (name, value) in [
            ("--test-fraction", args.test_fraction),
            ("--dev-fraction", args.dev_fraction),
        ] {
            if !(0.0..1.0).contains(&value) {
                return Err(eyre!("{name} must be in [0, 1), got {value}"));
            }
        }

        if args.min_duration_secs >= args.max_duration_secs {
            return Err(eyre!(
                "--min-duration-secs {} must be below --max-duration-secs {}",
                args.min_duration_secs,
                args.max_duration_secs
            ));
        }

        Ok(Self {
            metadata: args.metadata,
            audio_root: args.audio_root,
            output: args.output,
            policy: QcPolicy {
                min_duration_secs: args.min_duration_secs,
                max_duration_secs: args.max_duration_secs,
                require_audio: !args.no_audio_check,
                ..QcPolicy::default()
            },
            split: SplitConfig {
                seed: args.seed,
                test_fraction: args.test_fraction,
                dev_fraction: args.dev_fraction,
            },
        })
    }
}

pub fn execute(config: Config) -> Result<()> {
    tracing::info!(metadata = ?config.metadata.display(), "building manifest");

    let built = manifest::build_manifest(
        &config.metadata,
        config.audio_root.as_deref(),
        &config.policy,
        &config.split,
    )
    .wrap_err_with(|| format!("failed to build manifest from {:?}", config.metadata.display()))
    .with_suggestion(|| {
        "each metadata line needs id (or audio_filepath), text, and duration".to_string()
    })?;

    built
        .write_splits(&config.output)
        .wrap_err_with(|| format!("failed to write manifests to {:?}", config.output.display()))?;

    let summary = built.summary();
    for split in Split::ALL {
        println!("{}: {} utterance(s)", split, summary.split_sizes[split.as_str()]);
    }
    println!("dropped {} record(s)", summary.dropped.total);
    for (reason, count) in &summary.dropped.by_reason {
        println!("  {reason}: {count}");
    }

    tracing::info!(
        kept = summary.kept,
        dropped = summary.dropped.total,
        output = ?config.output.display(),
        "manifest written"
    );

    Ok(())
}
