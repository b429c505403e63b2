//! The caller-facing dictionary service.

use crate::config::EngineConfig;
use crate::error::{LexiconError, Result};
use crate::lexicon::LexiconStore;
use crate::normalize::{normalize, search_key};
use crate::orchestrator::{LookupOrchestrator, LookupResult, LookupTicket, SlotState};
use crate::pronounce::PronunciationProvider;
use crate::provision::{DatabaseProvisioner, ProvisionState};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rapidfuzz::fuzz;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Minimum similarity for a "did you mean" suggestion.
pub const SUGGEST_THRESHOLD: f64 = 0.6;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub lemma: String,
    pub score: f64,
}

struct Inner {
    store: Arc<LexiconStore>,
    provisioner: Mutex<DatabaseProvisioner>,
    words: OnceCell<Vec<String>>,
}

impl Inner {
    fn provision(&self) -> Result<Vec<ProvisionState>> {
        let mut provisioner = self.provisioner.lock();
        let artifact = provisioner.provision()?;
        let mut transitions = provisioner.transitions().to_vec();

        match self.store.load(&artifact.extracted_path) {
            Ok(()) => {}
            Err(LexiconError::Corrupt { path, reason }) => {
                warn!(path = %path.display(), %reason, "extracted database is corrupt, extracting again");
                let artifact = provisioner.reprovision()?;
                transitions.extend_from_slice(provisioner.transitions());
                self.store.load(&artifact.extracted_path)?;
            }
            Err(err) => return Err(err.into()),
        }
        drop(provisioner);

        let words = self.words.get_or_try_init(|| self.store.all_lemmas())?;
        info!(
            version = self.store.version().as_deref().unwrap_or_default(),
            lemmas = words.len(),
            "dictionary ready"
        );
        Ok(transitions)
    }
}

/// Provisioning, lookups and word-list queries behind one handle.
///
/// Lookups submitted before the database is ready resolve to a `NotReady`
/// failure.
#[derive(Clone)]
pub struct Dictionary {
    inner: Arc<Inner>,
    orchestrator: LookupOrchestrator,
    runtime: Handle,
}

impl Dictionary {
    pub fn new(config: EngineConfig, runtime: Handle) -> (Self, UnboundedReceiver<LookupResult>) {
        let pronunciation = &config.pronunciation;
        let pronouncer = Arc::new(PronunciationProvider::with_limits(
            Arc::new(pronunciation.synthesizer()),
            pronunciation.timeout(),
            pronunciation.cache_capacity,
        ));
        let store = Arc::new(LexiconStore::new());
        let (orchestrator, results) = LookupOrchestrator::new(
            store.clone(),
            pronouncer,
            pronunciation.accent.clone(),
            runtime.clone(),
        );
        let inner = Arc::new(Inner {
            store,
            provisioner: Mutex::new(DatabaseProvisioner::new(config.provision_config())),
            words: OnceCell::new(),
        });
        (
            Self {
                inner,
                orchestrator,
                runtime,
            },
            results,
        )
    }

    /// Provisions and opens the database, blocking the calling thread.
    ///
    /// A database that fails validation is discarded and extracted again
    /// once. Returns every provisioning state entered.
    pub fn provision_database(&self) -> Result<Vec<ProvisionState>> {
        self.inner.provision()
    }

    /// Runs [`provision_database`](Self::provision_database) on the blocking pool.
    pub fn spawn_startup(&self) -> JoinHandle<Result<Vec<ProvisionState>>> {
        let inner = self.inner.clone();
        self.runtime.spawn_blocking(move || inner.provision())
    }

    pub fn is_ready(&self) -> bool {
        self.inner.store.is_ready()
    }

    pub fn store(&self) -> &Arc<LexiconStore> {
        &self.inner.store
    }

    pub fn submit(&self, term: impl Into<String>) -> LookupTicket {
        self.orchestrator.submit(term)
    }

    pub fn cancel_active(&self) {
        self.orchestrator.cancel_active();
    }

    pub fn lookup_state(&self) -> SlotState {
        self.orchestrator.state()
    }

    pub fn set_accent(&self, accent: impl Into<String>) {
        self.orchestrator.set_accent(accent);
    }

    pub fn lemma_count(&self) -> usize {
        self.inner.words.get().map_or(0, Vec::len)
    }

    pub fn random_lemma(&self) -> Option<String> {
        let words = self.inner.words.get()?;
        words.choose(&mut rand::thread_rng()).cloned()
    }

    /// Lemmas resembling `term`, best first, at most `limit` of them.
    pub fn suggest(&self, term: &str, limit: usize) -> Vec<Suggestion> {
        let Some(words) = self.inner.words.get() else {
            return Vec::new();
        };
        let key = search_key(&normalize(term));
        if key.is_empty() || limit == 0 {
            return Vec::new();
        }

        let mut scored: Vec<Suggestion> = words
            .par_iter()
            .filter_map(|word| {
                let score = fuzz::ratio(key.chars(), search_key(word).chars());
                (score >= SUGGEST_THRESHOLD).then(|| Suggestion {
                    lemma: word.clone(),
                    score,
                })
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.lemma.cmp(&b.lemma))
        });

        let mut seen = HashSet::new();
        scored.retain(|suggestion| seen.insert(search_key(&suggestion.lemma)));
        scored.truncate(limit);
        scored
    }
}
