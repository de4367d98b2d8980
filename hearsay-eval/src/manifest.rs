//! Manifest construction: metadata quality control, speaker identity,
//! and split partitioning.
//!
//! Source metadata arrives as JSON Lines. Records failing validation are
//! dropped and tallied per reason, never fatal by themselves; the build
//! fails only when nothing survives or the speaker audit finds leakage.

use crate::audio;
use crate::error::{ManifestError, Result};
use crate::split::{self, SplitConfig};
use crate::types::{Speaker, Split, Utterance};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Name of the per-split manifest file inside a manifest directory.
pub fn manifest_file_name(split: Split) -> String {
    format!("manifest_{split}.jsonl")
}

/// Name of the quality-control summary written next to the manifests.
pub const QC_REPORT_FILE: &str = "qc_report.json";

/// One raw metadata record as read from the source JSONL.
///
/// Everything is optional at this stage; validation decides what a
/// usable record needs.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MetadataRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub audio_filepath: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub split: Option<String>,
    #[serde(default)]
    pub speaker_id: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub age_group: Option<String>,
    #[serde(default)]
    pub l1: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub qualification: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
}

/// Quality-control thresholds applied during validation.
#[derive(Clone, Copy, Debug)]
pub struct QcPolicy {
    /// Minimum whitespace tokens in the transcript
    pub min_tokens: usize,
    pub min_duration_secs: f64,
    pub max_duration_secs: f64,
    /// Allowed gap between metadata duration and measured WAV duration
    pub duration_tolerance_secs: f64,
    /// Check audio files on disk (existence, measured duration)
    pub require_audio: bool,
}

impl Default for QcPolicy {
    fn default() -> Self {
        Self {
            min_tokens: 1,
            min_duration_secs: 0.3,
            max_duration_secs: 30.0,
            duration_tolerance_secs: 0.10,
            require_audio: true,
        }
    }
}

/// Counts of dropped records, by reason and by declared split label.
///
/// A record can fail several checks at once: `total` counts it once,
/// `by_reason` counts every reason. Records without a declared split
/// label are tallied under `unassigned`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropTally {
    pub total: usize,
    pub by_reason: BTreeMap<String, usize>,
    pub by_split: BTreeMap<String, usize>,
    /// Reason counts nested under the declared split label
    #[serde(default)]
    pub by_split_reason: BTreeMap<String, BTreeMap<String, usize>>,
}

impl DropTally {
    fn record(&mut self, reasons: &[&str], declared_split: Option<&str>) {
        self.total += 1;
        let label = declared_split.unwrap_or("unassigned");
        *self.by_split.entry(label.to_string()).or_default() += 1;

        let split_reasons = self.by_split_reason.entry(label.to_string()).or_default();
        for reason in reasons {
            *self.by_reason.entry((*reason).to_string()).or_default() += 1;
            *split_reasons.entry((*reason).to_string()).or_default() += 1;
        }
    }

    /// Dropped count attributed to one split label.
    pub fn for_split(&self, split: Split) -> usize {
        self.by_split.get(split.as_str()).copied().unwrap_or(0)
    }

    /// Per-reason counts attributed to one split label.
    pub fn reasons_for(&self, split: Split) -> BTreeMap<String, usize> {
        self.by_split_reason
            .get(split.as_str())
            .cloned()
            .unwrap_or_default()
    }
}

/// Quality-control summary persisted as `qc_report.json`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct QcSummary {
    pub kept: usize,
    pub dropped: DropTally,
    pub split_sizes: BTreeMap<String, usize>,
}

/// Canonical, validated listing of utterances partitioned by split.
///
/// Insertion order follows the source metadata and is preserved for
/// reproducibility; it carries no semantic weight in scoring.
#[derive(Clone, Debug)]
pub struct Manifest {
    pub utterances: Vec<Utterance>,
    pub dropped: DropTally,
}

impl Manifest {
    /// Utterances of one split, in manifest order.
    pub fn split(&self, split: Split) -> Vec<&Utterance> {
        self.utterances.iter().filter(|u| u.split == split).collect()
    }

    pub fn split_len(&self, split: Split) -> usize {
        self.utterances.iter().filter(|u| u.split == split).count()
    }

    /// Summary of the build for persistence.
    pub fn summary(&self) -> QcSummary {
        let mut split_sizes = BTreeMap::new();
        for split in Split::ALL {
            split_sizes.insert(split.as_str().to_string(), self.split_len(split));
        }
        QcSummary {
            kept: self.utterances.len(),
            dropped: self.dropped.clone(),
            split_sizes,
        }
    }

    /// Write `manifest_<split>.jsonl` per split plus the QC summary.
    pub fn write_splits(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir).map_err(ManifestError::Io)?;

        for split in Split::ALL {
            let path = dir.join(manifest_file_name(split));
            let mut file = std::fs::File::create(&path).map_err(ManifestError::Io)?;
            for utterance in self.utterances.iter().filter(|u| u.split == split) {
                serde_json::to_writer(&mut file, utterance)?;
                file.write_all(b"\n").map_err(ManifestError::Io)?;
            }
        }

        let summary_path = dir.join(QC_REPORT_FILE);
        let json = serde_json::to_string_pretty(&self.summary())?;
        std::fs::write(summary_path, json).map_err(ManifestError::Io)?;

        Ok(())
    }
}

/// Load one split's utterances back from a manifest JSONL file.
pub fn load_split(path: &Path) -> Result<Vec<Utterance>> {
    let file = std::fs::File::open(path).map_err(ManifestError::Io)?;
    let reader = BufReader::new(file);

    let mut utterances = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(ManifestError::Io)?;
        if line.trim().is_empty() {
            continue;
        }
        utterances.push(serde_json::from_str(&line)?);
    }

    Ok(utterances)
}

/// Load the QC summary written next to the split manifests, if present.
pub fn load_qc_summary(dir: &Path) -> Option<QcSummary> {
    let raw = std::fs::read_to_string(dir.join(QC_REPORT_FILE)).ok()?;
    serde_json::from_str(&raw).ok()
}

/// Read metadata JSONL, returning parsed records and a count of
/// unparseable lines.
pub fn load_metadata(path: &Path) -> Result<(Vec<MetadataRecord>, usize)> {
    let file = std::fs::File::open(path).map_err(ManifestError::Io)?;
    let reader = BufReader::new(file);

    let mut records = Vec::new();
    let mut bad_lines = 0;

    for (lineno, line) in reader.lines().enumerate() {
        let line = line.map_err(ManifestError::Io)?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(record) => records.push(record),
            Err(err) => {
                tracing::warn!(line = lineno + 1, %err, "skipping malformed metadata line");
                bad_lines += 1;
            }
        }
    }

    Ok((records, bad_lines))
}

/// Build a validated manifest from a metadata JSONL file.
pub fn build_manifest(
    metadata_path: &Path,
    audio_root: Option<&Path>,
    policy: &QcPolicy,
    split_config: &SplitConfig,
) -> Result<Manifest> {
    let (records, bad_lines) = load_metadata(metadata_path)?;
    build_from_records(records, bad_lines, audio_root, policy, split_config)
}

/// A record that passed quality control, before split assignment.
struct CleanRow {
    id: String,
    audio_filepath: PathBuf,
    duration: f64,
    text: String,
    speaker: Speaker,
    declared_split: Option<Split>,
}

/// Validate records, synthesize speaker ids, assign splits, and audit.
pub fn build_from_records(
    records: Vec<MetadataRecord>,
    unparseable_lines: usize,
    audio_root: Option<&Path>,
    policy: &QcPolicy,
    split_config: &SplitConfig,
) -> Result<Manifest> {
    let mut dropped = DropTally::default();
    for _ in 0..unparseable_lines {
        dropped.record(&["bad_json"], None);
    }

    let mut rows: Vec<CleanRow> = Vec::new();
    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut speaker_synth = SpeakerSynthesizer::default();

    for record in records {
        match validate_record(&record, audio_root, policy) {
            Ok(mut row) => {
                if !seen_ids.insert(row.id.clone()) {
                    // first record wins, later duplicates drop
                    dropped.record(&["duplicate_id"], record.split.as_deref());
                    continue;
                }
                if row.speaker.speaker_id.is_empty() {
                    row.speaker.speaker_id = speaker_synth.assign(&row.speaker);
                }
                rows.push(row);
            }
            Err(reasons) => {
                let refs: Vec<&str> = reasons.iter().map(String::as_str).collect();
                dropped.record(&refs, record.split.as_deref());
            }
        }
    }

    if rows.is_empty() {
        return Err(ManifestError::NoValidRecords {
            rejected: dropped.total,
        }
        .into());
    }

    // Pre-assigned labels on every row bypass the seeded policy.
    let assignments: Vec<Split> = if rows.iter().all(|r| r.declared_split.is_some()) {
        rows.iter().map(|r| r.declared_split.unwrap()).collect()
    } else {
        let speaker_ids: Vec<String> =
            rows.iter().map(|r| r.speaker.speaker_id.clone()).collect();
        split::assign_splits(&speaker_ids, split_config)
    };

    split::audit_no_leakage(
        rows.iter()
            .map(|r| r.speaker.speaker_id.as_str())
            .zip(assignments.iter().copied()),
    )?;

    let utterances = rows
        .into_iter()
        .zip(assignments)
        .map(|(row, split)| Utterance {
            id: row.id,
            audio_filepath: row.audio_filepath,
            duration: row.duration,
            text: row.text,
            speaker: row.speaker,
            split,
        })
        .collect();

    Ok(Manifest { utterances, dropped })
}

/// Apply all QC checks to one record, collecting every failure reason.
fn validate_record(
    record: &MetadataRecord,
    audio_root: Option<&Path>,
    policy: &QcPolicy,
) -> std::result::Result<CleanRow, Vec<String>> {
    let mut reasons: Vec<String> = Vec::new();

    let id = record.id.clone().or_else(|| {
        record
            .audio_filepath
            .as_deref()
            .and_then(|p| Path::new(p).file_stem())
            .and_then(|s| s.to_str())
            .map(str::to_string)
    });
    if id.is_none() {
        reasons.push("no_id".into());
    }

    let audio_filepath = resolve_audio_path(record, audio_root);
    let audio_filepath = match audio_filepath {
        Some(path) => {
            if policy.require_audio && !path.exists() {
                reasons.push("file_missing".into());
            }
            Some(path)
        }
        None => {
            reasons.push("no_audio_path".into());
            None
        }
    };

    let text = record.text.as_deref().map(str::trim).unwrap_or("");
    if text.is_empty() {
        reasons.push("no_text".into());
    } else if text.split_whitespace().count() < policy.min_tokens {
        reasons.push("text_too_short".into());
    }

    // Prefer the measured WAV duration when the file is readable.
    let measured = audio_filepath
        .as_deref()
        .filter(|_| policy.require_audio)
        .and_then(|p| audio::wav_duration_secs(p).ok());
    let metadata_duration = record.duration.filter(|d| d.is_finite() && *d > 0.0);
    if record.duration.is_some() && metadata_duration.is_none() {
        reasons.push("no_duration".into());
    }

    let duration = measured.or(metadata_duration);
    match duration {
        None => reasons.push("no_duration".into()),
        Some(duration) => {
            if duration < policy.min_duration_secs {
                reasons.push("too_short".into());
            }
            if duration > policy.max_duration_secs {
                reasons.push("too_long".into());
            }
        }
    }

    if let (Some(measured), Some(meta)) = (measured, metadata_duration)
        && (measured - meta).abs() > policy.duration_tolerance_secs
    {
        reasons.push("duration_mismatch".into());
    }

    let declared_split = match record.split.as_deref() {
        None => None,
        Some(label) => match label.parse::<Split>() {
            Ok(split) => Some(split),
            Err(_) => {
                reasons.push("bad_split".into());
                None
            }
        },
    };

    if !reasons.is_empty() {
        reasons.sort();
        reasons.dedup();
        return Err(reasons);
    }

    Ok(CleanRow {
        id: id.expect("checked above"),
        audio_filepath: audio_filepath.expect("checked above"),
        duration: duration.expect("checked above"),
        text: text.to_string(),
        speaker: Speaker {
            speaker_id: record.speaker_id.clone().unwrap_or_default(),
            gender: record.gender.clone(),
            age_group: record.age_group.clone(),
            l1: record.l1.clone(),
            state: record.state.clone(),
            district: record.district.clone(),
            qualification: record.qualification.clone(),
            domain: record.domain.clone(),
        },
        declared_split,
    })
}

/// Resolve the audio path: explicit path (absolute, or joined under the
/// audio root), otherwise `<id>.wav` under the audio root.
fn resolve_audio_path(record: &MetadataRecord, audio_root: Option<&Path>) -> Option<PathBuf> {
    if let Some(raw) = record.audio_filepath.as_deref() {
        let path = Path::new(raw);
        return Some(match audio_root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        });
    }
    let id = record.id.as_deref()?;
    Some(audio_root?.join(format!("{id}.wav")))
}

/// Groups rows with identical demographics under one synthetic speaker.
#[derive(Default)]
struct SpeakerSynthesizer {
    by_key: HashMap<(String, String), String>,
}

impl SpeakerSynthesizer {
    fn assign(&mut self, speaker: &Speaker) -> String {
        let l1 = speaker.l1.clone().unwrap_or_else(|| "unknown".into());
        let state = speaker.state.clone().unwrap_or_else(|| "unknown".into());
        let next = self.by_key.len() + 1;
        self.by_key
            .entry((l1.clone(), state.clone()))
            .or_insert_with(|| format!("SPK_{l1}_{state}_{next}"))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, text: &str, duration: f64) -> MetadataRecord {
        MetadataRecord {
            id: Some(id.to_string()),
            audio_filepath: Some(format!("{id}.wav")),
            duration: Some(duration),
            text: Some(text.to_string()),
            ..MetadataRecord::default()
        }
    }

    fn lenient_policy() -> QcPolicy {
        QcPolicy {
            require_audio: false,
            ..QcPolicy::default()
        }
    }

    fn build(records: Vec<MetadataRecord>) -> Result<Manifest> {
        build_from_records(
            records,
            0,
            None,
            &lenient_policy(),
            &SplitConfig::default(),
        )
    }

    #[test]
    fn keeps_valid_records_in_input_order() {
        let manifest = build(vec![
            record("utt_1", "hello there", 2.0),
            record("utt_2", "good morning", 3.0),
        ])
        .unwrap();

        let ids: Vec<&str> = manifest.utterances.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, ["utt_1", "utt_2"]);
        assert_eq!(manifest.dropped.total, 0);
    }

    #[test]
    fn drops_record_missing_transcript_and_counts_it_once() {
        let mut bad = record("utt_2", "", 2.0);
        bad.text = None;
        bad.split = Some("test".into());
        let mut ok = record("utt_1", "hello", 2.0);
        ok.split = Some("test".into());

        let manifest = build(vec![ok, bad]).unwrap();

        assert_eq!(manifest.utterances.len(), 1);
        assert_eq!(manifest.dropped.total, 1);
        assert_eq!(manifest.dropped.by_reason["no_text"], 1);
        assert_eq!(manifest.dropped.for_split(Split::Test), 1);
        assert_eq!(manifest.dropped.reasons_for(Split::Test)["no_text"], 1);
        assert!(manifest.dropped.reasons_for(Split::Train).is_empty());
    }

    #[test]
    fn drops_out_of_range_durations() {
        let manifest = build(vec![
            record("ok", "fine", 2.0),
            record("short", "too short", 0.1),
            record("long", "too long", 45.0),
        ])
        .unwrap();

        assert_eq!(manifest.utterances.len(), 1);
        assert_eq!(manifest.dropped.by_reason["too_short"], 1);
        assert_eq!(manifest.dropped.by_reason["too_long"], 1);
    }

    #[test]
    fn first_duplicate_id_wins() {
        let manifest = build(vec![
            record("utt_1", "first version", 2.0),
            record("utt_1", "second version", 2.0),
        ])
        .unwrap();

        assert_eq!(manifest.utterances.len(), 1);
        assert_eq!(manifest.utterances[0].text, "first version");
        assert_eq!(manifest.dropped.by_reason["duplicate_id"], 1);
    }

    #[test]
    fn fails_when_nothing_survives() {
        let err = build(vec![record("utt_1", "", 0.0)]).unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Manifest(ManifestError::NoValidRecords { .. })
        ));
    }

    #[test]
    fn synthesizes_grouped_speaker_ids() {
        let mut a = record("utt_1", "one", 2.0);
        a.l1 = Some("hindi".into());
        a.state = Some("up".into());
        let mut b = record("utt_2", "two", 2.0);
        b.l1 = Some("hindi".into());
        b.state = Some("up".into());
        let mut c = record("utt_3", "three", 2.0);
        c.l1 = Some("tamil".into());
        c.state = Some("tn".into());

        let manifest = build(vec![a, b, c]).unwrap();

        let spk: Vec<&str> = manifest
            .utterances
            .iter()
            .map(|u| u.speaker.speaker_id.as_str())
            .collect();
        assert_eq!(spk[0], spk[1]);
        assert_ne!(spk[0], spk[2]);
        assert!(spk[0].starts_with("SPK_hindi_up_"));
    }

    #[test]
    fn preassigned_labels_bypass_policy() {
        let mut a = record("utt_1", "one", 2.0);
        a.split = Some("test".into());
        let mut b = record("utt_2", "two", 2.0);
        b.split = Some("train".into());
        b.l1 = Some("tamil".into());

        let manifest = build(vec![a, b]).unwrap();

        assert_eq!(manifest.utterances[0].split, Split::Test);
        assert_eq!(manifest.utterances[1].split, Split::Train);
    }

    #[test]
    fn preassigned_leakage_is_fatal() {
        let mut a = record("utt_1", "one", 2.0);
        a.split = Some("test".into());
        a.speaker_id = Some("spk".into());
        let mut b = record("utt_2", "two", 2.0);
        b.split = Some("train".into());
        b.speaker_id = Some("spk".into());

        let err = build(vec![a, b]).unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Manifest(ManifestError::SpeakerLeakage { .. })
        ));
    }

    #[test]
    fn round_trips_through_split_files() {
        let dir = std::env::temp_dir().join("hearsay_manifest_roundtrip");
        std::fs::remove_dir_all(&dir).ok();

        let mut a = record("utt_1", "one", 2.0);
        a.split = Some("test".into());
        let mut b = record("utt_2", "two", 2.0);
        b.split = Some("test".into());
        b.l1 = Some("tamil".into());
        let manifest = build(vec![a, b]).unwrap();
        manifest.write_splits(&dir).unwrap();

        let loaded = load_split(&dir.join(manifest_file_name(Split::Test))).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded, manifest.utterances);

        let summary = load_qc_summary(&dir).unwrap();
        assert_eq!(summary.kept, 2);
        assert_eq!(summary.split_sizes["test"], 2);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn counts_unparseable_lines() {
        let manifest = build_from_records(
            vec![record("utt_1", "hello", 2.0)],
            2,
            None,
            &lenient_policy(),
            &SplitConfig::default(),
        )
        .unwrap();

        assert_eq!(manifest.dropped.by_reason["bad_json"], 2);
        assert_eq!(manifest.dropped.by_split["unassigned"], 2);
        assert_eq!(manifest.dropped.by_split_reason["unassigned"]["bad_json"], 2);
    }
}
