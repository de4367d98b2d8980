//! CLI argument definitions using clap.

use clap::{Parser, Subcommand};
use eyre::Result;

#[derive(Debug, Parser)]
#[command(name = "hearsay")]
#[command(about = "Benchmark ASR systems against accented-speech corpora")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Normalize source audio to 16 kHz mono PCM16 WAV
    Normalize(crate::normalize::Args),

    /// Quality-control metadata and build train/dev/test manifests
    Manifest(crate::manifest::Args),

    /// Run a recognizer over manifest splits and score WER/CER
    Bench(crate::bench::Args),

    /// Re-score cached hypotheses without invoking the recognizer
    Score(crate::score::Args),
}

/// Execute CLI command - separated for testing.
pub fn run_cli(cli: Cli) -> Result<()> {
    tracing::debug!(?cli, "parsed arguments");

    match cli.command {
        Commands::Normalize(args) => crate::normalize::execute(args.try_into()?),
        Commands::Manifest(args) => crate::manifest::execute(args.try_into()?),
        Commands::Bench(args) => crate::bench::execute(args.try_into()?),
        Commands::Score(args) => crate::score::execute(args.try_into()?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_normalize_command() {
        let cli = Cli::parse_from(["hearsay", "normalize", "raw/", "-o", "wavs/"]);

        match &cli.command {
            Commands::Normalize(crate::normalize::Args { input, output })
                if input.to_str() == Some("raw/") && output.to_str() == Some("wavs/") => {}
            _ => panic!("unexpected command: {:?}", cli.command),
        }
    }

    #[test]
    fn parses_manifest_with_defaults() {
        let cli = Cli::parse_from(["hearsay", "manifest", "meta.jsonl"]);

        match &cli.command {
            Commands::Manifest(args) => {
                assert_eq!(args.metadata.to_str(), Some("meta.jsonl"));
                assert_eq!(args.seed, 42);
                assert!((args.test_fraction - 0.15).abs() < 1e-9);
                assert!((args.dev_fraction - 0.10).abs() < 1e-9);
            }
            _ => panic!("unexpected command: {:?}", cli.command),
        }
    }

    #[test]
    fn parses_bench_with_split_list() {
        let cli = Cli::parse_from([
            "hearsay",
            "bench",
            "manifests/",
            "-r",
            "whisper-cli",
            "--arg",
            "{audio}",
            "--splits",
            "dev,test",
            "--timeout-secs",
            "60",
        ]);

        match &cli.command {
            Commands::Bench(args) => {
                assert_eq!(args.recognizer, "whisper-cli");
                assert_eq!(args.args, ["{audio}"]);
                assert_eq!(args.splits, ["dev", "test"]);
                assert_eq!(args.timeout_secs, 60);
            }
            _ => panic!("unexpected command: {:?}", cli.command),
        }
    }

    #[test]
    fn parses_score_command() {
        let cli = Cli::parse_from([
            "hearsay",
            "score",
            "manifests/",
            "--hypotheses",
            "eval/",
            "-o",
            "rescored/",
        ]);

        match &cli.command {
            Commands::Score(args) => {
                assert_eq!(args.hypotheses.to_str(), Some("eval/"));
                assert_eq!(args.output.to_str(), Some("rescored/"));
            }
            _ => panic!("unexpected command: {:?}", cli.command),
        }
    }

    #[test]
    fn rejects_bad_split_name_at_config_time() {
        let cli = Cli::parse_from([
            "hearsay",
            "bench",
            "manifests/",
            "-r",
            "echo",
            "--splits",
            "eval",
        ]);

        let Commands::Bench(args) = cli.command else {
            panic!("expected bench");
        };
        let config: Result<crate::bench::Config> = args.try_into();
        assert!(config.is_err());
    }
}
