//! Bench subcommand - run a recognizer over manifest splits and score.

use color_eyre::Section;
use eyre::{Context, Result, eyre};
use hearsay_eval::batch;
use hearsay_eval::manifest::{self, manifest_file_name};
use hearsay_eval::recognize::{Recognizer, RecognizerConfig};
use hearsay_eval::report::{self, BenchReport, REPORT_FILE, SplitReport};
use hearsay_eval::types::Split;
use std::path::PathBuf;
use std::time::Instant;

/// CLI arguments for benchmarking a recognizer.
#[derive(clap::Args, Debug)]
pub struct Args {
    /// Directory containing manifest_<split>.jsonl files
    pub manifests: PathBuf,

    /// Recognizer executable; must print the hypothesis to stdout
    #[arg(short, long)]
    pub recognizer: String,

    /// Extra recognizer arguments; "{audio}" expands to the audio path
    /// (repeatable). Without a placeholder the path is appended.
    #[arg(long = "arg")]
    pub args: Vec<String>,

    /// Per-utterance recognition timeout in seconds
    #[arg(long, default_value_t = 120)]
    pub timeout_secs: u64,

    /// Splits to evaluate (comma-separated)
    #[arg(short, long, value_delimiter = ',', default_value = "test")]
    pub splits: Vec<String>,

    /// Output directory for the report and per-utterance artifacts
    #[arg(short, long, default_value = "eval")]
    pub output: PathBuf,

    /// Model label carried into the report
    #[arg(long, default_value = "external")]
    pub model: String,

    /// Language tag carried into the report
    #[arg(long)]
    pub language: Option<String>,

    /// Worker threads (default: available cores)
    #[arg(short, long)]
    pub workers: Option<usize>,
}

/// What to evaluate and where results go; shared with `score`.
#[derive(Debug)]
pub(crate) struct EvalPlan {
    pub manifest_dir: PathBuf,
    pub splits: Vec<Split>,
    pub workers: usize,
    pub model: String,
    pub language: Option<String>,
    pub output: PathBuf,
}

/// Resolved configuration for benchmarking.
#[derive(Debug)]
pub struct Config {
    pub(crate) plan: EvalPlan,
    pub(crate) recognizer: RecognizerConfig,
}

pub(crate) fn parse_splits(labels: &[String]) -> Result<Vec<Split>> {
    labels
        .iter()
        .map(|label| {
            label
                .parse::<Split>()
                .map_err(|e| eyre!(e).suggestion("valid splits are: train, dev, test"))
        })
        .collect()
}

pub(crate) fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl TryFrom<Args> for Config {
    type Error = eyre::Error;

    fn try_from(args: Args) -> Result<Self> {
        Ok(Self {
            plan: EvalPlan {
                manifest_dir: args.manifests,
                splits: parse_splits(&args.splits)?,
                workers: args.workers.unwrap_or_else(default_workers),
                model: args.model,
                language: args.language,
                output: args.output,
            },
            recognizer: RecognizerConfig::Command {
                program: args.recognizer,
                args: args.args,
                timeout_secs: args.timeout_secs,
            },
        })
    }
}

pub fn execute(config: Config) -> Result<()> {
    run_evaluation(&config.plan, &|_split| Ok(config.recognizer.build()?))
}

/// Load, recognize, score, and persist every requested split.
///
/// The whole run fails if a requested split is unreadable or empty;
/// per-utterance recognition failures are recorded, not fatal.
pub(crate) fn run_evaluation(
    plan: &EvalPlan,
    build_recognizer: &dyn Fn(Split) -> Result<Box<dyn Recognizer>>,
) -> Result<()> {
    let dropped = manifest::load_qc_summary(&plan.manifest_dir).map(|summary| summary.dropped);

    let mut split_reports = Vec::with_capacity(plan.splits.len());

    for &split in &plan.splits {
        let path = plan.manifest_dir.join(manifest_file_name(split));
        let utterances = manifest::load_split(&path)
            .wrap_err_with(|| format!("failed to read manifest: {:?}", path.display()))
            .with_suggestion(|| {
                format!("run `hearsay manifest` first to produce {:?}", path.display())
            })?;

        let recognizer = build_recognizer(split)?;

        let s = Instant::now();
        // A structural scoring failure loses this split only; the
        // remaining splits still score and land in the report.
        let outcome = match batch::run_split(&utterances, recognizer.as_ref(), plan.workers) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(split = %split, %err, "scoring failed, dropping split from the report");
                eprintln!("{split}: scoring failed: {err}");
                continue;
            }
        };
        let d = s.elapsed();

        tracing::info!(
            split = %split,
            duration = %format!("{:.2}s", d.as_secs_f32()),
            failures = outcome.recognition_failures,
            "split scored"
        );

        let split_report = SplitReport::from_outcome(split, &outcome, dropped.as_ref())
            .wrap_err_with(|| format!("cannot aggregate split {split}"))
            .with_suggestion(|| {
                "an empty split cannot be scored; check the manifest QC output".to_string()
            })?;

        report::write_split_artifacts(
            &plan.output,
            split,
            &outcome.hypotheses,
            &outcome.word_alignments,
            &outcome.char_alignments,
        )?;

        println!("{}", split_report.summary_line());
        split_reports.push(split_report);
    }

    if split_reports.is_empty() {
        return Err(eyre!("no requested split produced a scoreable result"));
    }

    let bench_report = BenchReport {
        model: plan.model.clone(),
        language: plan.language.clone(),
        splits: split_reports,
    };

    let report_path = plan.output.join(REPORT_FILE);
    bench_report
        .write_json(&report_path)
        .wrap_err_with(|| format!("failed to write report: {:?}", report_path.display()))?;

    tracing::info!(path = ?report_path.display(), "report written");

    Ok(())
}
