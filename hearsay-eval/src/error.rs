//! Error types for hearsay-eval organized by pipeline stage.

use crate::types::Split;
use thiserror::Error;

/// Evaluation pipeline error variants organized by pipeline stage.
#[derive(Debug, Error)]
pub enum Error {
    /// Manifest construction stage error
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Audio normalization stage error
    #[error(transparent)]
    Audio(#[from] AudioError),

    /// Recognition adapter error
    #[error(transparent)]
    Recognition(#[from] RecognitionError),

    /// Alignment scoring stage error
    #[error(transparent)]
    Alignment(#[from] AlignmentError),

    /// Metric aggregation stage error
    #[error(transparent)]
    Aggregation(#[from] AggregationError),
}

/// Manifest loading and construction errors.
///
/// Individual records failing validation are dropped and tallied, never
/// surfaced as errors; these variants cover structural failures only.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// No record survived validation
    #[error("no valid records after quality control ({rejected} rejected)")]
    NoValidRecords { rejected: usize },

    /// A speaker was assigned to more than one split
    #[error("speaker {speaker_id} appears in both {first} and {second} splits")]
    SpeakerLeakage {
        speaker_id: String,
        first: Split,
        second: Split,
    },

    /// Unknown split label in a manifest file
    #[error("unknown split label: {0:?}")]
    UnknownSplit(String),

    /// IO error reading or writing manifest files
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Malformed JSON in a manifest file
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Audio decoding and normalization errors.
#[derive(Debug, Error)]
pub enum AudioError {
    /// Source codec cannot be decoded
    #[error("unsupported audio format: {extension:?}")]
    UnsupportedFormat { extension: String },

    /// WAV bit depth outside int16/int32/float
    #[error("unsupported WAV bit depth: {0}")]
    UnsupportedBitDepth(u16),

    /// Container holds no decodable audio track
    #[error("no audio track found")]
    NoAudioTrack,

    /// Resampler construction or processing failure
    #[error("resampling failed: {0}")]
    Resample(String),

    /// IO error reading source or writing normalized output
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// WAV file format error
    #[error(transparent)]
    Hound(#[from] hound::Error),

    /// Compressed format decode error
    #[error(transparent)]
    Symphonia(#[from] symphonia::core::errors::Error),
}

/// Per-utterance recognition failures.
///
/// These are recovered locally by the recognition adapter (sentinel
/// hypothesis substitution) and never abort a batch.
#[derive(Debug, Error)]
pub enum RecognitionError {
    /// Recognizer executable could not be started
    #[error("failed to spawn recognizer {program:?}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    /// Recognizer exited with a non-zero status
    #[error("recognizer exited with status {status}: {stderr}")]
    NonZeroExit { status: i32, stderr: String },

    /// Recognizer exceeded the per-utterance timeout and was killed
    #[error("recognizer timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Replay cache has no entry for the utterance
    #[error("no cached hypothesis for utterance {id}")]
    MissingEntry { id: String },

    /// Replay cache recorded a failure for the utterance
    #[error("cached hypothesis for utterance {id} is a recorded failure: {reason}")]
    CachedFailure { id: String, reason: String },
}

/// Structural alignment failures.
///
/// Well-formed text never triggers these; an occurrence indicates a
/// normalization bug or an unbounded input and aborts the affected split.
#[derive(Debug, Error)]
pub enum AlignmentError {
    /// Token sequence exceeds the edit-distance matrix bound
    #[error("sequence of {units} units exceeds alignment bound of {max}")]
    TooLong { units: usize, max: usize },
}

/// Corpus-level aggregation failures.
#[derive(Debug, Error)]
pub enum AggregationError {
    /// Split holds no utterances, so no metric is computable
    #[error("split {split} is empty, no metric can be computed")]
    EmptySplit { split: Split },
}

/// Result type alias for hearsay-eval operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

// Nested From implementations for automatic error conversion chains

// hound::Error → AudioError → Error
impl From<hound::Error> for Error {
    fn from(e: hound::Error) -> Self {
        Error::Audio(AudioError::Hound(e))
    }
}

// symphonia Error → AudioError → Error
impl From<symphonia::core::errors::Error> for Error {
    fn from(e: symphonia::core::errors::Error) -> Self {
        Error::Audio(AudioError::Symphonia(e))
    }
}

// serde_json::Error → ManifestError → Error
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Manifest(ManifestError::Json(e))
    }
}
