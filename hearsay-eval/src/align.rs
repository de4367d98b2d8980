//! Minimum-edit-distance alignment between reference and hypothesis text.
//!
//! Classic Levenshtein dynamic programming with unit costs, run at word
//! and character granularity over normalized text, with a backtrace that
//! recovers substitution/insertion/deletion counts deterministically.

use crate::error::{AlignmentError, Result};
use crate::text;
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum token count per sequence for the edit-distance matrix.
///
/// The DP matrix is O(|ref|·|hyp|); sequences beyond this bound are
/// rejected with [`AlignmentError::TooLong`] instead of letting memory
/// grow unbounded. Corpus utterances are QC-capped at 30 s, orders of
/// magnitude under the bound even at character granularity.
pub const MAX_ALIGN_UNITS: usize = 8192;

/// Token granularity for alignment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Word,
    Char,
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Granularity::Word => "word",
            Granularity::Char => "char",
        })
    }
}

/// An error rate, or the distinguished undefined marker.
///
/// The rate is undefined when the reference is empty but the hypothesis
/// is not: there are no reference units to divide by. It is never
/// silently coerced to a number. Serializes as a JSON number or null.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Rate {
    Defined(f64),
    Undefined,
}

impl Rate {
    /// Percentage with one decimal place, or `n/a` when undefined.
    pub fn display_percent(&self) -> String {
        match self {
            Rate::Defined(v) => format!("{:.1}%", v * 100.0),
            Rate::Undefined => "n/a".to_string(),
        }
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_percent())
    }
}

impl Serialize for Rate {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Rate::Defined(v) => serializer.serialize_some(v),
            Rate::Undefined => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for Rate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.map_or(Rate::Undefined, Rate::Defined))
    }
}

/// Edit-operation counts for one (reference, hypothesis) pair.
///
/// A pure function of its inputs: the same triple of (reference,
/// hypothesis, granularity) always reproduces the same counts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignmentResult {
    pub id: String,
    pub granularity: Granularity,
    pub substitutions: usize,
    pub insertions: usize,
    pub deletions: usize,
    /// Reference length in tokens of this granularity
    pub reference_len: usize,
}

impl AlignmentResult {
    /// Total edit operations.
    pub fn edits(&self) -> usize {
        self.substitutions + self.insertions + self.deletions
    }

    /// Per-utterance error rate: edits / reference length.
    ///
    /// [`Rate::Undefined`] when the reference is empty but edits exist.
    pub fn rate(&self) -> Rate {
        if self.reference_len == 0 {
            if self.edits() == 0 {
                Rate::Defined(0.0)
            } else {
                Rate::Undefined
            }
        } else {
            Rate::Defined(self.edits() as f64 / self.reference_len as f64)
        }
    }
}

/// Align a reference against a hypothesis at the given granularity.
///
/// Both sides are normalized with [`text::normalize`] first, so the
/// metric is insensitive to case, ASCII punctuation, and whitespace runs.
///
/// # Errors
///
/// [`AlignmentError::TooLong`] if either token sequence exceeds
/// [`MAX_ALIGN_UNITS`].
pub fn align(
    id: &str,
    reference: &str,
    hypothesis: &str,
    granularity: Granularity,
) -> Result<AlignmentResult> {
    let reference = text::normalize(reference);
    let hypothesis = text::normalize(hypothesis);

    let (substitutions, insertions, deletions, reference_len) = match granularity {
        Granularity::Word => {
            let ref_tokens = text::words(&reference);
            let hyp_tokens = text::words(&hypothesis);
            check_bound(ref_tokens.len().max(hyp_tokens.len()))?;
            let (s, i, d) = edit_counts(&ref_tokens, &hyp_tokens);
            (s, i, d, ref_tokens.len())
        }
        Granularity::Char => {
            let ref_tokens = text::chars(&reference);
            let hyp_tokens = text::chars(&hypothesis);
            check_bound(ref_tokens.len().max(hyp_tokens.len()))?;
            let (s, i, d) = edit_counts(&ref_tokens, &hyp_tokens);
            (s, i, d, ref_tokens.len())
        }
    };

    Ok(AlignmentResult {
        id: id.to_string(),
        granularity,
        substitutions,
        insertions,
        deletions,
        reference_len,
    })
}

fn check_bound(units: usize) -> Result<()> {
    if units > MAX_ALIGN_UNITS {
        return Err(AlignmentError::TooLong {
            units,
            max: MAX_ALIGN_UNITS,
        }
        .into());
    }
    Ok(())
}

/// Compute substitution/insertion/deletion counts via Levenshtein DP.
///
/// Cell (i,j) = min(del = (i-1,j)+1, ins = (i,j-1)+1, diag = (i-1,j-1)
/// + cost). The backtrace prefers, among equal-cost moves, diagonal
/// (match/substitution) first, then deletion, then insertion, so counts
/// are reproducible for any input pair.
fn edit_counts<T: PartialEq>(reference: &[T], hypothesis: &[T]) -> (usize, usize, usize) {
    let n = reference.len();
    let m = hypothesis.len();
    let width = m + 1;

    let mut dp = vec![0u32; (n + 1) * width];
    for i in 0..=n {
        dp[i * width] = i as u32;
    }
    for j in 0..=m {
        dp[j] = j as u32;
    }

    for i in 1..=n {
        for j in 1..=m {
            let cost = u32::from(reference[i - 1] != hypothesis[j - 1]);
            dp[i * width + j] = (dp[(i - 1) * width + j] + 1)
                .min(dp[i * width + j - 1] + 1)
                .min(dp[(i - 1) * width + j - 1] + cost);
        }
    }

    let (mut substitutions, mut insertions, mut deletions) = (0, 0, 0);
    let (mut i, mut j) = (n, m);

    while i > 0 || j > 0 {
        let here = dp[i * width + j];

        if i > 0 && j > 0 {
            let cost = u32::from(reference[i - 1] != hypothesis[j - 1]);
            if dp[(i - 1) * width + j - 1] + cost == here {
                substitutions += cost as usize;
                i -= 1;
                j -= 1;
                continue;
            }
        }

        if i > 0 && dp[(i - 1) * width + j] + 1 == here {
            deletions += 1;
            i -= 1;
            continue;
        }

        insertions += 1;
        j -= 1;
    }

    (substitutions, insertions, deletions)
}
