//! hearsay-eval: ASR benchmark evaluation pipeline.
//!
//! Benchmarks speech recognizers against ground-truth transcripts for a
//! corpus of accented speech. The pipeline flows strictly forward:
//!
//! raw audio + metadata → [`audio`] (normalize) → [`manifest`] (QC +
//! [`split`]) → per split → [`recognize`] → [`align`] → [`report`].
//!
//! # Quick Start
//!
//! ```ignore
//! use hearsay_eval::{align::Granularity, batch, manifest, recognize, report};
//! use hearsay_eval::types::Split;
//!
//! let utterances = manifest::load_split("manifests/manifest_test.jsonl".as_ref())?;
//! let recognizer = recognize::RecognizerConfig::Command {
//!     program: "my-asr".into(),
//!     args: vec!["{audio}".into()],
//!     timeout_secs: 120,
//! }
//! .build()?;
//!
//! let outcome = batch::run_split(&utterances, recognizer.as_ref(), 8)?;
//! let split = report::SplitReport::from_outcome(Split::Test, &outcome, None)?;
//! println!("{}", split.summary_line());
//! ```

pub mod align;
pub mod audio;
pub mod batch;
pub mod error;
pub mod manifest;
pub mod recognize;
pub mod report;
pub mod split;
pub mod text;
pub mod types;
