//! Core types shared across the evaluation pipeline.

use crate::error::ManifestError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Corpus partition an utterance belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Dev,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Dev, Split::Test];

    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Dev => "dev",
            Split::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Split {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(Split::Train),
            "dev" | "validation" => Ok(Split::Dev),
            "test" => Ok(Split::Test),
            other => Err(ManifestError::UnknownSplit(other.to_string())),
        }
    }
}

/// Speaker identity and demographic attributes.
///
/// All demographic fields are optional; the speaker id is either taken
/// from the metadata or synthesized during manifest construction.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Speaker {
    pub speaker_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_group: Option<String>,
    /// Native language
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualification: Option<String>,
    /// Occupation domain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

/// One audio sample paired with its ground-truth transcript.
///
/// Built by the manifest builder and immutable afterwards; later stages
/// borrow utterances, they never copy or mutate them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub id: String,
    pub audio_filepath: PathBuf,
    /// Duration in seconds
    pub duration: f64,
    /// Reference transcript
    pub text: String,
    #[serde(flatten)]
    pub speaker: Speaker,
    pub split: Split,
}

/// Recognizer output for one utterance.
///
/// Produced exactly once per utterance. A failed recognition yields a
/// sentinel with empty text and the failure reason in `error`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Hypothesis {
    /// Successful recognition result.
    pub fn ok(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            error: None,
        }
    }

    /// Sentinel for a failed recognition: empty text, error flag set.
    pub fn failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: String::new(),
            error: Some(reason.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_round_trips_through_str() {
        for split in Split::ALL {
            assert_eq!(split.as_str().parse::<Split>().unwrap(), split);
        }
    }

    #[test]
    fn split_rejects_unknown_label() {
        assert!("eval".parse::<Split>().is_err());
    }

    #[test]
    fn failed_hypothesis_has_empty_text() {
        let hyp = Hypothesis::failed("utt_1", "timed out");
        assert!(hyp.is_failed());
        assert!(hyp.text.is_empty());
    }

    #[test]
    fn utterance_serializes_speaker_flat() {
        let utt = Utterance {
            id: "utt_1".into(),
            audio_filepath: "audio/utt_1.wav".into(),
            duration: 2.5,
            text: "hello".into(),
            speaker: Speaker {
                speaker_id: "SPK_hindi_up_1".into(),
                l1: Some("hindi".into()),
                ..Speaker::default()
            },
            split: Split::Test,
        };

        let json = serde_json::to_value(&utt).unwrap();
        assert_eq!(json["speaker_id"], "SPK_hindi_up_1");
        assert_eq!(json["l1"], "hindi");
        assert_eq!(json["split"], "test");
        assert!(json.get("gender").is_none());
    }
}
