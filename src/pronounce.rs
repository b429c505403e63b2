//! Phonetic transcriptions from an external speech synthesizer.

use crate::error::SynthError;
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use std::io;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error, warn};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_CACHE_CAPACITY: usize = 512;

/// Produces raw phonetic text for a term.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn transcribe(&self, text: &str, accent: &str) -> Result<String, SynthError>;
}

/// Runs an espeak-compatible executable:
/// `<program> -s <speed> -v <language>-<accent> --ipa -q <text>`.
#[derive(Debug, Clone)]
pub struct EspeakSynthesizer {
    pub program: PathBuf,
    pub speed: u32,
    pub language: String,
}

impl Default for EspeakSynthesizer {
    fn default() -> Self {
        Self {
            program: PathBuf::from("espeak-ng"),
            speed: 120,
            language: "en".to_string(),
        }
    }
}

impl EspeakSynthesizer {
    fn command(&self, text: &str, accent: &str) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("-s")
            .arg(self.speed.to_string())
            .arg("-v")
            .arg(format!("{}-{accent}", self.language))
            .arg("--ipa")
            .arg("-q")
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl Synthesizer for EspeakSynthesizer {
    async fn transcribe(&self, text: &str, accent: &str) -> Result<String, SynthError> {
        let output = self
            .command(text, accent)
            .output()
            .await
            .map_err(|err| match err.kind() {
                io::ErrorKind::NotFound => SynthError::MissingExecutable(self.program.clone()),
                _ => SynthError::Io(err),
            })?;
        if !output.status.success() {
            return Err(SynthError::ExitStatus {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Memoizing, time-bounded front for a [`Synthesizer`].
pub struct PronunciationProvider {
    synthesizer: Arc<dyn Synthesizer>,
    timeout: Duration,
    cache: Mutex<LruCache<(String, String), String>>,
}

impl PronunciationProvider {
    pub fn new(synthesizer: Arc<dyn Synthesizer>) -> Self {
        Self::with_limits(synthesizer, DEFAULT_TIMEOUT, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_limits(synthesizer: Arc<dyn Synthesizer>, timeout: Duration, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            synthesizer,
            timeout,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// IPA transcription of `term` wrapped in slashes, or `None` when unavailable.
    ///
    /// Never fails: synthesizer errors and timeouts are logged and degrade to
    /// `None`. A timed-out synthesizer process is killed.
    pub async fn pronounce(&self, term: &str, accent: &str) -> Option<String> {
        let key = (term.to_string(), accent.to_string());
        let cached = self.cache.lock().get(&key).cloned();
        if cached.is_some() {
            return cached;
        }

        let raw = match tokio::time::timeout(self.timeout, self.synthesizer.transcribe(term, accent)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(err @ SynthError::MissingExecutable(_))) => {
                error!(error = %err, "pronunciation unavailable");
                return None;
            }
            Ok(Err(err)) => {
                warn!(term, accent, error = %err, "pronunciation failed");
                return None;
            }
            Err(_) => {
                let err = SynthError::Timeout(self.timeout);
                warn!(term, accent, error = %err, "pronunciation failed");
                return None;
            }
        };

        let formatted = format_ipa(&raw)?;
        debug!(term, accent, ipa = %formatted, "pronunciation cached");
        self.cache.lock().put(key, formatted.clone());
        Some(formatted)
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }
}

/// Trims, collapses line breaks into spaces and wraps the text in slashes.
fn format_ipa(raw: &str) -> Option<String> {
    let joined = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if joined.is_empty() {
        return None;
    }
    Some(format!("/{joined}/"))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Synthesizer double that answers from a closure and counts invocations.
    pub(crate) struct FakeSynthesizer<F> {
        pub(crate) calls: AtomicUsize,
        respond: F,
    }

    impl<F> FakeSynthesizer<F>
    where
        F: Fn(&str, &str) -> Result<String, SynthError> + Send + Sync,
    {
        pub(crate) fn new(respond: F) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                respond,
            }
        }
    }

    #[async_trait]
    impl<F> Synthesizer for FakeSynthesizer<F>
    where
        F: Fn(&str, &str) -> Result<String, SynthError> + Send + Sync,
    {
        async fn transcribe(&self, text: &str, accent: &str) -> Result<String, SynthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.respond)(text, accent)
        }
    }

    struct StalledSynthesizer;

    #[async_trait]
    impl Synthesizer for StalledSynthesizer {
        async fn transcribe(&self, _text: &str, _accent: &str) -> Result<String, SynthError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("never".to_string())
        }
    }

    #[test]
    fn format_ipa_collapses_lines() {
        assert_eq!(format_ipa("  kˈæt\n").as_deref(), Some("/kˈæt/"));
        assert_eq!(format_ipa("ˈaɪs\n kɹˈiːm \n").as_deref(), Some("/ˈaɪs kɹˈiːm/"));
        assert_eq!(format_ipa(" \n "), None);
    }

    #[tokio::test]
    async fn results_are_memoized_per_term_and_accent() {
        let synth = Arc::new(FakeSynthesizer::new(|text, accent| Ok(format!("{text}-{accent}\n"))));
        let provider = PronunciationProvider::new(synth.clone());

        assert_eq!(provider.pronounce("cat", "us").await.as_deref(), Some("/cat-us/"));
        assert_eq!(provider.pronounce("cat", "us").await.as_deref(), Some("/cat-us/"));
        assert_eq!(synth.calls.load(Ordering::SeqCst), 1);

        assert_eq!(provider.pronounce("cat", "gb").await.as_deref(), Some("/cat-gb/"));
        assert_eq!(synth.calls.load(Ordering::SeqCst), 2);
        assert_eq!(provider.cached_len(), 2);
    }

    #[tokio::test]
    async fn cache_is_bounded() {
        let synth = Arc::new(FakeSynthesizer::new(|text, _| Ok(text.to_string())));
        let provider = PronunciationProvider::with_limits(synth.clone(), DEFAULT_TIMEOUT, 2);
        for word in ["a", "b", "c"] {
            provider.pronounce(word, "us").await;
        }
        assert_eq!(provider.cached_len(), 2);
        provider.pronounce("a", "us").await;
        assert_eq!(synth.calls.load(Ordering::SeqCst), 4, "evicted entry is recomputed");
    }

    #[tokio::test]
    async fn failures_degrade_to_none_and_are_not_cached() {
        let synth = Arc::new(FakeSynthesizer::new(|_, _| {
            Err(SynthError::ExitStatus {
                code: Some(1),
                stderr: "unknown voice".to_string(),
            })
        }));
        let provider = PronunciationProvider::new(synth.clone());
        assert_eq!(provider.pronounce("cat", "zz").await, None);
        assert_eq!(provider.pronounce("cat", "zz").await, None);
        assert_eq!(synth.calls.load(Ordering::SeqCst), 2);
        assert_eq!(provider.cached_len(), 0);
    }

    #[tokio::test]
    async fn timeout_yields_none() {
        let provider = PronunciationProvider::with_limits(
            Arc::new(StalledSynthesizer),
            Duration::from_millis(50),
            DEFAULT_CACHE_CAPACITY,
        );
        let started = std::time::Instant::now();
        assert_eq!(provider.pronounce("cat", "us").await, None);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn missing_executable_yields_none() {
        let synth = EspeakSynthesizer {
            program: PathBuf::from("/nonexistent/bin/espeak-ng-for-tests"),
            ..EspeakSynthesizer::default()
        };
        let err = synth.transcribe("cat", "us").await.unwrap_err();
        assert!(matches!(err, SynthError::MissingExecutable(_)));

        let provider = PronunciationProvider::new(Arc::new(synth));
        assert_eq!(provider.pronounce("cat", "us").await, None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn espeak_arguments_are_passed_through() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-espeak");
        std::fs::write(&script, "#!/bin/sh\nprintf '%s ' \"$@\"\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let synth = EspeakSynthesizer {
            program: script,
            speed: 150,
            language: "en".to_string(),
        };
        let raw = synth.transcribe("cat", "gb").await.unwrap();
        assert_eq!(raw.trim(), "-s 150 -v en-gb --ipa -q cat");
    }
}
