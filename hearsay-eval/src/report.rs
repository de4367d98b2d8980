//! Corpus-level metric aggregation and report persistence.
//!
//! Counts are summed first and the rate derived second, so long
//! utterances weigh more than short ones; this is deliberately not an
//! average of per-utterance rates.

use crate::align::{AlignmentResult, Granularity, Rate};
use crate::batch::SplitOutcome;
use crate::error::{AggregationError, ManifestError, Result};
use crate::manifest::DropTally;
use crate::types::{Hypothesis, Split};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

/// Name of the JSON report inside an output directory.
pub const REPORT_FILE: &str = "report.json";

/// Per-split hypothesis cache file.
pub fn hypotheses_file_name(split: Split) -> String {
    format!("hypotheses_{split}.jsonl")
}

/// Per-split alignment drill-down file.
pub fn alignments_file_name(split: Split) -> String {
    format!("alignments_{split}.jsonl")
}

/// Summed edit operations and reference units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditTotals {
    pub substitutions: usize,
    pub insertions: usize,
    pub deletions: usize,
    pub reference_units: usize,
}

impl EditTotals {
    pub fn observe(&mut self, result: &AlignmentResult) {
        self.substitutions += result.substitutions;
        self.insertions += result.insertions;
        self.deletions += result.deletions;
        self.reference_units += result.reference_len;
    }

    /// Merge another accumulator; summing is associative and
    /// commutative, so batches can be combined in any order.
    pub fn merge(&mut self, other: &EditTotals) {
        self.substitutions += other.substitutions;
        self.insertions += other.insertions;
        self.deletions += other.deletions;
        self.reference_units += other.reference_units;
    }

    pub fn edits(&self) -> usize {
        self.substitutions + self.insertions + self.deletions
    }

    /// Corpus rate: total edits / total reference units.
    ///
    /// [`Rate::Undefined`] when edits exist against zero reference units.
    pub fn rate(&self) -> Rate {
        if self.reference_units == 0 {
            if self.edits() == 0 {
                Rate::Defined(0.0)
            } else {
                Rate::Undefined
            }
        } else {
            Rate::Defined(self.edits() as f64 / self.reference_units as f64)
        }
    }
}

/// Aggregate a set of per-utterance alignments into totals.
pub fn aggregate(results: &[AlignmentResult]) -> EditTotals {
    let mut totals = EditTotals::default();
    for result in results {
        totals.observe(result);
    }
    totals
}

/// One granularity's corpus metric: counts plus the derived rate.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CorpusMetric {
    #[serde(flatten)]
    pub totals: EditTotals,
    pub rate: Rate,
}

impl From<EditTotals> for CorpusMetric {
    fn from(totals: EditTotals) -> Self {
        Self {
            totals,
            rate: totals.rate(),
        }
    }
}

/// Metrics and trust counters for one split.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SplitReport {
    pub split: Split,
    pub utterances: usize,
    /// Records dropped during manifest QC, attributed to this split
    pub records_dropped: usize,
    /// Per-reason counts for this split's dropped records
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dropped_reasons: BTreeMap<String, usize>,
    pub recognition_failures: usize,
    pub wer: CorpusMetric,
    pub cer: CorpusMetric,
}

impl SplitReport {
    /// Fold a split's outcome into its report.
    ///
    /// # Errors
    ///
    /// [`AggregationError::EmptySplit`] when there is nothing to score.
    pub fn from_outcome(
        split: Split,
        outcome: &SplitOutcome,
        dropped: Option<&DropTally>,
    ) -> Result<Self> {
        if outcome.hypotheses.is_empty() {
            return Err(AggregationError::EmptySplit { split }.into());
        }

        Ok(Self {
            split,
            utterances: outcome.hypotheses.len(),
            records_dropped: dropped.map(|d| d.for_split(split)).unwrap_or(0),
            dropped_reasons: dropped.map(|d| d.reasons_for(split)).unwrap_or_default(),
            recognition_failures: outcome.recognition_failures,
            wer: aggregate(&outcome.word_alignments).into(),
            cer: aggregate(&outcome.char_alignments).into(),
        })
    }

    fn metric(&self, granularity: Granularity) -> &CorpusMetric {
        match granularity {
            Granularity::Word => &self.wer,
            Granularity::Char => &self.cer,
        }
    }

    /// One-line human summary, e.g. `test: 120 utts  WER 23.4%  CER 8.1%`.
    pub fn summary_line(&self) -> String {
        format!(
            "{}: {} utts  WER {}  CER {}  (dropped {}, failed {})",
            self.split,
            self.utterances,
            self.metric(Granularity::Word).rate,
            self.metric(Granularity::Char).rate,
            self.records_dropped,
            self.recognition_failures,
        )
    }
}

/// The persisted benchmark report: one entry per evaluated split.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BenchReport {
    /// Recognizer label carried into the report
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub splits: Vec<SplitReport>,
}

impl BenchReport {
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(ManifestError::Io)?;
        Ok(())
    }
}

/// Persist per-utterance rows as JSON Lines.
pub fn write_jsonl<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut file = std::fs::File::create(path).map_err(ManifestError::Io)?;
    for row in rows {
        serde_json::to_writer(&mut file, row)?;
        file.write_all(b"\n").map_err(ManifestError::Io)?;
    }
    Ok(())
}

/// Write a split's hypothesis cache and alignment drill-down files.
pub fn write_split_artifacts(
    dir: &Path,
    split: Split,
    hypotheses: &[Hypothesis],
    word: &[AlignmentResult],
    chars: &[AlignmentResult],
) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(ManifestError::Io)?;
    write_jsonl(&dir.join(hypotheses_file_name(split)), hypotheses)?;

    let mut alignments: Vec<&AlignmentResult> = Vec::with_capacity(word.len() + chars.len());
    alignments.extend(word);
    alignments.extend(chars);
    write_jsonl(&dir.join(alignments_file_name(split)), &alignments)?;

    Ok(())
}
