//! Deterministic speaker-grouped train/dev/test partitioning.
//!
//! Splits are assigned by speaker, never by row, so no speaker's
//! utterances leak between partitions. The assignment is reproducible:
//! speaker groups are sorted, shuffled with a seeded RNG, then filled
//! greedily by cumulative utterance count.

use crate::error::{ManifestError, Result};
use crate::types::Split;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::BTreeMap;
use std::collections::HashMap;

/// Split policy parameters.
#[derive(Clone, Copy, Debug)]
pub struct SplitConfig {
    /// Seed for the speaker shuffle
    pub seed: u64,
    /// Fraction of total utterances assigned to test
    pub test_fraction: f64,
    /// Fraction of the remaining utterances assigned to dev
    pub dev_fraction: f64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            test_fraction: 0.15,
            dev_fraction: 0.10,
        }
    }
}

/// Assign a split to each row from its speaker id.
///
/// Rows sharing a speaker id always land in the same split. Test is
/// filled first to `test_fraction` of all rows, then dev to
/// `dev_fraction` of the remainder; everything else is train. Given the
/// same speaker ids and seed, the assignment is identical across runs.
pub fn assign_splits(speaker_ids: &[String], config: &SplitConfig) -> Vec<Split> {
    // BTreeMap so group order is stable before the seeded shuffle
    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (row, speaker) in speaker_ids.iter().enumerate() {
        groups.entry(speaker).or_default().push(row);
    }

    let mut group_list: Vec<(&str, Vec<usize>)> = groups.into_iter().collect();
    let mut rng = StdRng::seed_from_u64(config.seed);
    group_list.shuffle(&mut rng);

    let total = speaker_ids.len();
    let test_target = (total as f64 * config.test_fraction).round() as usize;
    let rest = total.saturating_sub(test_target);
    let dev_target = (rest as f64 * config.dev_fraction).round() as usize;

    let mut assignments = vec![Split::Train; total];
    let mut test_count = 0;
    let mut dev_count = 0;

    for (_, rows) in group_list {
        let split = if test_count < test_target {
            test_count += rows.len();
            Split::Test
        } else if dev_count < dev_target {
            dev_count += rows.len();
            Split::Dev
        } else {
            Split::Train
        };

        for row in rows {
            assignments[row] = split;
        }
    }

    assignments
}

/// Verify no speaker id appears in more than one split.
///
/// # Errors
///
/// [`ManifestError::SpeakerLeakage`] on the first overlapping speaker.
pub fn audit_no_leakage<'a>(
    rows: impl IntoIterator<Item = (&'a str, Split)>,
) -> Result<()> {
    let mut seen: HashMap<&str, Split> = HashMap::new();

    for (speaker, split) in rows {
        match seen.get(speaker) {
            None => {
                seen.insert(speaker, split);
            }
            Some(&first) if first != split => {
                return Err(ManifestError::SpeakerLeakage {
                    speaker_id: speaker.to_string(),
                    first,
                    second: split,
                }
                .into());
            }
            Some(_) => {}
        }
    }

    Ok(())
}
