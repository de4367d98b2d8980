//! Parallel recognition and scoring over one split.
//!
//! Utterances are embarrassingly parallel: workers pull indices from a
//! shared atomic cursor over the read-only manifest slice, accumulate
//! results locally, and a single-threaded merge restores manifest order
//! afterwards. No shared mutable counters.

use crate::align::{self, AlignmentResult, Granularity};
use crate::error::Result;
use crate::recognize::{self, Recognizer};
use crate::types::{Hypothesis, Utterance};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Per-split recognition and scoring results, in manifest order.
#[derive(Clone, Debug, Default)]
pub struct SplitOutcome {
    pub hypotheses: Vec<Hypothesis>,
    pub word_alignments: Vec<AlignmentResult>,
    pub char_alignments: Vec<AlignmentResult>,
    pub recognition_failures: usize,
}

/// One scored utterance, tagged with its manifest index for the merge.
type ScoredRow = (usize, Hypothesis, AlignmentResult, AlignmentResult);

/// Recognize and score every utterance of a split on a worker pool.
///
/// Recognition failures are isolated per utterance (sentinel hypothesis,
/// scored as an empty transcription); alignment errors are structural
/// and abort the whole split.
pub fn run_split(
    utterances: &[Utterance],
    recognizer: &dyn Recognizer,
    workers: usize,
) -> Result<SplitOutcome> {
    let workers = workers.clamp(1, utterances.len().max(1));
    let cursor = AtomicUsize::new(0);

    tracing::info!(utterances = utterances.len(), workers, "scoring split");

    let locals = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                scope.spawn(|| {
                    let mut local: Vec<ScoredRow> = Vec::new();
                    loop {
                        let index = cursor.fetch_add(1, Ordering::Relaxed);
                        let Some(utterance) = utterances.get(index) else {
                            break;
                        };

                        let hypothesis = recognize::recognize(recognizer, utterance);
                        let word = align::align(
                            &utterance.id,
                            &utterance.text,
                            &hypothesis.text,
                            Granularity::Word,
                        )?;
                        let chars = align::align(
                            &utterance.id,
                            &utterance.text,
                            &hypothesis.text,
                            Granularity::Char,
                        )?;

                        local.push((index, hypothesis, word, chars));
                    }
                    Ok::<_, crate::error::Error>(local)
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| handle.join().expect("scoring worker panicked"))
            .collect::<Result<Vec<_>>>()
    })?;

    // Single-threaded merge back into manifest order.
    let mut rows: Vec<ScoredRow> = locals.into_iter().flatten().collect();
    rows.sort_by_key(|(index, ..)| *index);

    let mut outcome = SplitOutcome::default();
    for (_, hypothesis, word, chars) in rows {
        if hypothesis.is_failed() {
            outcome.recognition_failures += 1;
        }
        outcome.hypotheses.push(hypothesis);
        outcome.word_alignments.push(word);
        outcome.char_alignments.push(chars);
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecognitionError;
    use crate::types::{Speaker, Split};

    struct EchoReference;

    impl Recognizer for EchoReference {
        fn transcribe(&self, utterance: &Utterance) -> Result<String, RecognitionError> {
            Ok(utterance.text.clone())
        }
    }

    /// Fails on one utterance id, echoes the reference otherwise.
    struct FailOn(&'static str);

    impl Recognizer for FailOn {
        fn transcribe(&self, utterance: &Utterance) -> Result<String, RecognitionError> {
            if utterance.id == self.0 {
                Err(RecognitionError::Timeout { secs: 1 })
            } else {
                Ok(utterance.text.clone())
            }
        }
    }

    fn utterances(n: usize) -> Vec<Utterance> {
        (0..n)
            .map(|i| Utterance {
                id: format!("utt_{i}"),
                audio_filepath: format!("{i}.wav").into(),
                duration: 1.0,
                text: format!("sample number {i}"),
                speaker: Speaker {
                    speaker_id: "spk".into(),
                    ..Speaker::default()
                },
                split: Split::Test,
            })
            .collect()
    }

    #[test]
    fn preserves_manifest_order_across_workers() {
        let utts = utterances(37);
        let outcome = run_split(&utts, &EchoReference, 4).unwrap();

        assert_eq!(outcome.hypotheses.len(), 37);
        for (hypothesis, utterance) in outcome.hypotheses.iter().zip(&utts) {
            assert_eq!(hypothesis.id, utterance.id);
        }
        assert!(outcome.word_alignments.iter().all(|a| a.edits() == 0));
        assert_eq!(outcome.recognition_failures, 0);
    }

    #[test]
    fn one_failure_does_not_lose_the_rest() {
        let utts = utterances(10);
        let outcome = run_split(&utts, &FailOn("utt_4"), 3).unwrap();

        assert_eq!(outcome.recognition_failures, 1);
        assert_eq!(outcome.word_alignments.len(), 10);

        // The failed utterance scores as an empty transcription.
        let failed = &outcome.word_alignments[4];
        assert_eq!(failed.deletions, failed.reference_len);

        // Everyone else is untouched.
        for (i, alignment) in outcome.word_alignments.iter().enumerate() {
            if i != 4 {
                assert_eq!(alignment.edits(), 0, "utt_{i} should score clean");
            }
        }
    }

    #[test]
    fn single_worker_matches_parallel_run() {
        let utts = utterances(12);
        let serial = run_split(&utts, &FailOn("utt_7"), 1).unwrap();
        let parallel = run_split(&utts, &FailOn("utt_7"), 4).unwrap();

        assert_eq!(serial.word_alignments, parallel.word_alignments);
        assert_eq!(serial.char_alignments, parallel.char_alignments);
        assert_eq!(serial.recognition_failures, parallel.recognition_failures);
    }

    #[test]
    fn empty_split_yields_empty_outcome() {
        let outcome = run_split(&[], &EchoReference, 4).unwrap();
        assert!(outcome.hypotheses.is_empty());
    }
}
