//! Recognition adapter: pluggable recognizer backends behind one
//! capability, with per-utterance failure isolation.
//!
//! A failed recognition never aborts the batch: [`recognize`] substitutes
//! a sentinel hypothesis (empty text, error flag set) so the remaining
//! utterances score unaffected.

use crate::error::{ManifestError, RecognitionError, Result};
use crate::types::{Hypothesis, Utterance};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Placeholder in command arguments replaced with the utterance audio path.
pub const AUDIO_PLACEHOLDER: &str = "{audio}";

/// Longest stderr excerpt carried into a recognition error.
const STDERR_EXCERPT_LEN: usize = 400;

/// The recognition capability: one utterance in, hypothesis text out.
///
/// Implementations must be shareable across scoring workers.
pub trait Recognizer: Send + Sync {
    fn transcribe(&self, utterance: &Utterance) -> std::result::Result<String, RecognitionError>;
}

/// Tagged recognizer backend selection, decided by configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum RecognizerConfig {
    /// External recognizer executable invoked per utterance
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
    /// Replay from a previously written hypothesis JSONL file
    Replay { hypotheses: PathBuf },
}

fn default_timeout_secs() -> u64 {
    120
}

impl RecognizerConfig {
    pub fn build(&self) -> Result<Box<dyn Recognizer>> {
        match self {
            RecognizerConfig::Command {
                program,
                args,
                timeout_secs,
            } => Ok(Box::new(CommandRecognizer::new(
                program.clone(),
                args.clone(),
                Duration::from_secs(*timeout_secs),
            ))),
            RecognizerConfig::Replay { hypotheses } => {
                Ok(Box::new(ReplayRecognizer::from_jsonl(hypotheses)?))
            }
        }
    }
}

/// Invoke the recognizer on one utterance, applying the sentinel policy.
///
/// Failures are logged and folded into a sentinel [`Hypothesis`]; this
/// function never returns an error.
pub fn recognize(recognizer: &dyn Recognizer, utterance: &Utterance) -> Hypothesis {
    match recognizer.transcribe(utterance) {
        Ok(text) => Hypothesis::ok(&utterance.id, text.trim()),
        Err(err) => {
            tracing::warn!(id = %utterance.id, %err, "recognition failed, recording sentinel");
            Hypothesis::failed(&utterance.id, err.to_string())
        }
    }
}

/// Spawns an external recognizer executable per utterance.
///
/// `{audio}` in the argument list expands to the utterance audio path;
/// without a placeholder the path is appended. The hypothesis is read
/// from stdout. The per-utterance timeout is enforced by polling the
/// child and killing it on expiry.
pub struct CommandRecognizer {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandRecognizer {
    pub fn new(program: String, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program,
            args,
            timeout,
        }
    }

    fn argv(&self, audio_path: &Path) -> Vec<String> {
        let audio = audio_path.to_string_lossy();
        let mut argv: Vec<String> = Vec::with_capacity(self.args.len() + 1);
        let mut substituted = false;

        for arg in &self.args {
            if arg.contains(AUDIO_PLACEHOLDER) {
                argv.push(arg.replace(AUDIO_PLACEHOLDER, &audio));
                substituted = true;
            } else {
                argv.push(arg.clone());
            }
        }
        if !substituted {
            argv.push(audio.into_owned());
        }

        argv
    }
}

impl Recognizer for CommandRecognizer {
    fn transcribe(&self, utterance: &Utterance) -> std::result::Result<String, RecognitionError> {
        let args = self.argv(&utterance.audio_filepath);

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RecognitionError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let started_at = Instant::now();

        let mut stdout_pipe = child.stdout.take().expect("stdout piped");
        let mut stderr_pipe = child.stderr.take().expect("stderr piped");

        let (stdout_tx, stdout_rx) = std::sync::mpsc::channel();
        let (stderr_tx, stderr_rx) = std::sync::mpsc::channel();

        std::thread::spawn(move || {
            use std::io::Read;
            let mut buf = Vec::new();
            let _ = stdout_pipe.read_to_end(&mut buf);
            let _ = stdout_tx.send(buf);
        });

        std::thread::spawn(move || {
            use std::io::Read;
            let mut buf = Vec::new();
            let _ = stderr_pipe.read_to_end(&mut buf);
            let _ = stderr_tx.send(buf);
        });

        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    let stdout = stdout_rx
                        .recv_timeout(Duration::from_millis(100))
                        .unwrap_or_default();
                    let stderr = stderr_rx
                        .recv_timeout(Duration::from_millis(100))
                        .unwrap_or_default();

                    if !status.success() {
                        return Err(RecognitionError::NonZeroExit {
                            status: status.code().unwrap_or(-1),
                            stderr: excerpt(&stderr),
                        });
                    }
                    return Ok(String::from_utf8_lossy(&stdout).into_owned());
                }
                Ok(None) => {}
                Err(source) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(RecognitionError::Spawn {
                        program: self.program.clone(),
                        source,
                    });
                }
            }

            if started_at.elapsed() >= self.timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Err(RecognitionError::Timeout {
                    secs: self.timeout.as_secs(),
                });
            }

            std::thread::sleep(Duration::from_millis(20));
        }
    }
}

fn excerpt(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let trimmed = text.trim();
    let mut out: String = trimmed.chars().take(STDERR_EXCERPT_LEN).collect();
    if trimmed.chars().count() > STDERR_EXCERPT_LEN {
        out.push('…');
    }
    out
}

/// Replays hypotheses from a previous run's JSONL cache, keyed by
/// utterance id. Enables re-scoring without re-running the recognizer.
pub struct ReplayRecognizer {
    by_id: HashMap<String, Hypothesis>,
}

impl ReplayRecognizer {
    pub fn from_jsonl(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(ManifestError::Io)?;
        let reader = BufReader::new(file);

        let mut by_id = HashMap::new();
        for line in reader.lines() {
            let line = line.map_err(ManifestError::Io)?;
            if line.trim().is_empty() {
                continue;
            }
            let hypothesis: Hypothesis = serde_json::from_str(&line)?;
            by_id.insert(hypothesis.id.clone(), hypothesis);
        }

        Ok(Self { by_id })
    }
}

impl Recognizer for ReplayRecognizer {
    fn transcribe(&self, utterance: &Utterance) -> std::result::Result<String, RecognitionError> {
        match self.by_id.get(&utterance.id) {
            None => Err(RecognitionError::MissingEntry {
                id: utterance.id.clone(),
            }),
            Some(hypothesis) => match &hypothesis.error {
                Some(reason) => Err(RecognitionError::CachedFailure {
                    id: utterance.id.clone(),
                    reason: reason.clone(),
                }),
                None => Ok(hypothesis.text.clone()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Speaker, Split};
    use std::io::Write;

    fn utterance(id: &str, audio: &str) -> Utterance {
        Utterance {
            id: id.to_string(),
            audio_filepath: audio.into(),
            duration: 1.0,
            text: "reference".into(),
            speaker: Speaker {
                speaker_id: "spk".into(),
                ..Speaker::default()
            },
            split: Split::Test,
        }
    }

    #[test]
    fn command_reads_hypothesis_from_stdout() {
        let recognizer = CommandRecognizer::new(
            "echo".into(),
            vec!["hello from".into(), AUDIO_PLACEHOLDER.into()],
            Duration::from_secs(5),
        );

        let text = recognizer.transcribe(&utterance("u1", "a.wav")).unwrap();
        assert_eq!(text.trim(), "hello from a.wav");
    }

    #[test]
    fn command_appends_audio_path_without_placeholder() {
        let recognizer =
            CommandRecognizer::new("echo".into(), vec![], Duration::from_secs(5));

        let text = recognizer.transcribe(&utterance("u1", "b.wav")).unwrap();
        assert_eq!(text.trim(), "b.wav");
    }

    #[test]
    fn command_nonzero_exit_is_an_error() {
        let recognizer =
            CommandRecognizer::new("false".into(), vec![], Duration::from_secs(5));

        let err = recognizer.transcribe(&utterance("u1", "a.wav")).unwrap_err();
        assert!(matches!(err, RecognitionError::NonZeroExit { .. }));
    }

    #[test]
    fn command_timeout_kills_hung_recognizer() {
        let recognizer = CommandRecognizer::new(
            "sleep".into(),
            vec!["30".into()],
            Duration::from_millis(100),
        );

        let started = Instant::now();
        let err = recognizer.transcribe(&utterance("u1", "a.wav")).unwrap_err();
        assert!(matches!(err, RecognitionError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn command_missing_program_is_spawn_error() {
        let recognizer = CommandRecognizer::new(
            "hearsay_definitely_not_a_binary".into(),
            vec![],
            Duration::from_secs(1),
        );

        let err = recognizer.transcribe(&utterance("u1", "a.wav")).unwrap_err();
        assert!(matches!(err, RecognitionError::Spawn { .. }));
    }

    #[test]
    fn failure_becomes_sentinel_hypothesis() {
        let recognizer =
            CommandRecognizer::new("false".into(), vec![], Duration::from_secs(5));

        let hyp = recognize(&recognizer, &utterance("u1", "a.wav"));
        assert!(hyp.is_failed());
        assert!(hyp.text.is_empty());
        assert_eq!(hyp.id, "u1");
    }

    #[test]
    fn replay_returns_cached_text_and_flags_missing_ids() {
        let path = std::env::temp_dir().join("hearsay_replay_cache.jsonl");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, r#"{{"id":"u1","text":"cached words"}}"#).unwrap();
        writeln!(file, r#"{{"id":"u2","text":"","error":"timed out"}}"#).unwrap();
        drop(file);

        let recognizer = ReplayRecognizer::from_jsonl(&path).unwrap();

        assert_eq!(
            recognizer.transcribe(&utterance("u1", "a.wav")).unwrap(),
            "cached words"
        );
        assert!(matches!(
            recognizer.transcribe(&utterance("u2", "a.wav")).unwrap_err(),
            RecognitionError::CachedFailure { .. }
        ));
        assert!(matches!(
            recognizer.transcribe(&utterance("u3", "a.wav")).unwrap_err(),
            RecognitionError::MissingEntry { .. }
        ));

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn config_selects_backend() {
        let config: RecognizerConfig = serde_json::from_str(
            r#"{"backend":"command","program":"echo","args":["{audio}"]}"#,
        )
        .unwrap();
        assert!(matches!(
            config,
            RecognizerConfig::Command { timeout_secs: 120, .. }
        ));
    }
}
