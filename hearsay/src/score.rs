//! Score subcommand - re-score cached hypotheses without the recognizer.

use crate::bench::{self, EvalPlan};
use color_eyre::Section;
use eyre::{Context, Result};
use hearsay_eval::recognize::{Recognizer, ReplayRecognizer};
use hearsay_eval::report::hypotheses_file_name;
use std::path::PathBuf;

/// CLI arguments for replay scoring.
#[derive(clap::Args, Debug)]
pub struct Args {
    /// Directory containing manifest_<split>.jsonl files
    pub manifests: PathBuf,

    /// Directory containing hypotheses_<split>.jsonl from a bench run
    #[arg(long)]
    pub hypotheses: PathBuf,

    /// Splits to score (comma-separated)
    #[arg(short, long, value_delimiter = ',', default_value = "test")]
    pub splits: Vec<String>,

    /// Output directory for the report and per-utterance artifacts
    #[arg(short, long, default_value = "eval")]
    pub output: PathBuf,

    /// Model label carried into the report
    #[arg(long, default_value = "replay")]
    pub model: String,

    /// Language tag carried into the report
    #[arg(long)]
    pub language: Option<String>,

    /// Worker threads (default: available cores)
    #[arg(short, long)]
    pub workers: Option<usize>,
}

/// Resolved configuration for replay scoring.
#[derive(Debug)]
pub struct Config {
    pub(crate) plan: EvalPlan,
    pub(crate) hypotheses_dir: PathBuf,
}

impl TryFrom<Args> for Config {
    type Error = eyre::Error;

    fn try_from(args: Args) -> Result<Self> {
        Ok(Self {
            plan: EvalPlan {
                manifest_dir: args.manifests,
                splits: bench::parse_splits(&args.splits)?,
                workers: args.workers.unwrap_or_else(bench::default_workers),
                model: args.model,
                language: args.language,
                output: args.output,
            },
            hypotheses_dir: args.hypotheses,
        })
    }
}

pub fn execute(config: Config) -> Result<()> {
    bench::run_evaluation(&config.plan, &|split| {
        let path = config.hypotheses_dir.join(hypotheses_file_name(split));
        let replay = ReplayRecognizer::from_jsonl(&path)
            .wrap_err_with(|| format!("failed to read hypothesis cache: {:?}", path.display()))
            .with_suggestion(|| {
                format!("run `hearsay bench` first to produce {:?}", path.display())
            })?;
        Ok(Box::new(replay) as Box<dyn Recognizer>)
    })
}
