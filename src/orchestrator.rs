//! Runs lookups in the background with at most one active request.
//!
//! Submitting a term cancels whatever request is still running. Workers
//! observe cancellation at fixed checkpoints (before the database read, after
//! it, and after the pronunciation fetch), and the final delivery re-checks,
//! under the slot lock, that the request is still the active one. A cancelled
//! request therefore never delivers a result.

use crate::error::LexiconError;
use crate::lexicon::{DefinitionTable, LexiconStore};
use crate::normalize::normalize;
use crate::pronounce::PronunciationProvider;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Identifies one submitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RequestId(u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupFailure {
    /// The term was empty after normalization.
    InvalidInput,
    /// The term is valid but no lemma matches it.
    NoDefinitionFound,
    /// The lexicon has not been provisioned yet.
    NotReady,
    /// The worker stopped abnormally.
    Internal,
}

impl LookupFailure {
    pub fn message(&self) -> &'static str {
        match self {
            LookupFailure::InvalidInput => "Invalid input: nothing left to search for",
            LookupFailure::NoDefinitionFound => "No definition found",
            LookupFailure::NotReady => "The dictionary is not ready yet",
            LookupFailure::Internal => "The lookup failed unexpectedly",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum LookupStatus {
    Success,
    Failure(LookupFailure),
    /// Reported only through [`LookupTicket`]; never delivered as a result.
    Cancelled,
}

/// Terminal outcome of a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LookupResult {
    pub id: RequestId,
    /// The raw term as submitted.
    pub query: String,
    /// The normalized term that was looked up.
    pub term: String,
    pub pronunciation: Option<String>,
    pub definitions: Option<DefinitionTable>,
    pub status: LookupStatus,
}

impl LookupResult {
    fn failure(id: RequestId, query: &str, term: String, reason: LookupFailure) -> Self {
        Self {
            id,
            query: query.to_string(),
            term,
            pronunciation: None,
            definitions: None,
            status: LookupStatus::Failure(reason),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == LookupStatus::Success
    }
}

/// State of the single request slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    Idle,
    Running,
    Cancelled,
}

/// Handle to a submitted request. Dropping it does not cancel the request.
pub struct LookupTicket {
    pub id: RequestId,
    handle: JoinHandle<LookupStatus>,
}

impl LookupTicket {
    /// Waits for the worker and returns its terminal status.
    ///
    /// A worker that panics still delivers a `Failure(Internal)` result. The
    /// ticket reports `Cancelled` only when the task was aborted, e.g. by
    /// runtime shutdown, in which case nothing is delivered.
    pub async fn wait(self) -> LookupStatus {
        match self.handle.await {
            Ok(status) => status,
            Err(err) => {
                warn!(id = %self.id, error = %err, "lookup task aborted");
                LookupStatus::Cancelled
            }
        }
    }
}

struct Slot {
    active: Option<RequestId>,
    token: CancellationToken,
    state: SlotState,
    next_id: u64,
}

struct Shared {
    store: Arc<LexiconStore>,
    pronouncer: Arc<PronunciationProvider>,
    accent: Mutex<String>,
    slot: Mutex<Slot>,
    results: UnboundedSender<LookupResult>,
}

#[derive(Clone)]
pub struct LookupOrchestrator {
    shared: Arc<Shared>,
    runtime: Handle,
}

/// Returned by a worker step when the request is no longer wanted.
struct Cancelled;

impl LookupOrchestrator {
    /// Creates an orchestrator and the receiver on which results are delivered.
    pub fn new(
        store: Arc<LexiconStore>,
        pronouncer: Arc<PronunciationProvider>,
        accent: impl Into<String>,
        runtime: Handle,
    ) -> (Self, UnboundedReceiver<LookupResult>) {
        let (results, receiver) = unbounded_channel();
        let orchestrator = Self {
            shared: Arc::new(Shared {
                store,
                pronouncer,
                accent: Mutex::new(accent.into()),
                slot: Mutex::new(Slot {
                    active: None,
                    token: CancellationToken::new(),
                    state: SlotState::Idle,
                    next_id: 0,
                }),
                results,
            }),
            runtime,
        };
        (orchestrator, receiver)
    }

    pub fn set_accent(&self, accent: impl Into<String>) {
        *self.shared.accent.lock() = accent.into();
    }

    pub fn state(&self) -> SlotState {
        self.shared.slot.lock().state
    }

    /// Cancels the running request, if any, and starts a lookup for `raw`.
    pub fn submit(&self, raw: impl Into<String>) -> LookupTicket {
        let raw = raw.into();
        let (id, token) = {
            let mut slot = self.shared.slot.lock();
            if slot.state == SlotState::Running {
                if let Some(previous) = slot.active {
                    debug!(id = %previous, "superseded by new request");
                }
                slot.token.cancel();
            }
            slot.next_id += 1;
            let id = RequestId(slot.next_id);
            slot.active = Some(id);
            slot.token = CancellationToken::new();
            slot.state = SlotState::Running;
            (id, slot.token.clone())
        };

        let shared = self.shared.clone();
        let handle = self.runtime.spawn(supervise(shared, id, raw, token));
        LookupTicket { id, handle }
    }

    /// Cancels the running request without starting another.
    pub fn cancel_active(&self) {
        let mut slot = self.shared.slot.lock();
        if slot.state == SlotState::Running {
            slot.token.cancel();
            slot.state = SlotState::Cancelled;
            debug!(id = ?slot.active, "cancelled active request");
        }
    }
}

/// Runs the worker in its own task so a panic still finalizes the request.
async fn supervise(
    shared: Arc<Shared>,
    id: RequestId,
    raw: String,
    token: CancellationToken,
) -> LookupStatus {
    let worker = tokio::spawn(run_worker(shared.clone(), id, raw.clone(), token.clone()));
    match worker.await {
        Ok(status) => status,
        Err(err) => {
            error!(%id, error = %err, "lookup worker failed");
            let failure = LookupResult::failure(id, &raw, normalize(&raw), LookupFailure::Internal);
            finalize(&shared, &token, failure)
        }
    }
}

async fn run_worker(
    shared: Arc<Shared>,
    id: RequestId,
    raw: String,
    token: CancellationToken,
) -> LookupStatus {
    match resolve(&shared, id, &raw, &token).await {
        Ok(result) => finalize(&shared, &token, result),
        Err(Cancelled) => {
            debug!(%id, "lookup cancelled");
            LookupStatus::Cancelled
        }
    }
}

async fn resolve(
    shared: &Shared,
    id: RequestId,
    raw: &str,
    token: &CancellationToken,
) -> Result<LookupResult, Cancelled> {
    let term = normalize(raw);
    if term.is_empty() {
        debug!(%id, raw, "invalid input");
        return Ok(LookupResult::failure(id, raw, term, LookupFailure::InvalidInput));
    }

    checkpoint(token)?;
    let store = shared.store.clone();
    let key = term.clone();
    let lookup = tokio::task::spawn_blocking(move || store.lookup(&key)).await;
    checkpoint(token)?;

    let definitions = match lookup {
        Ok(Ok(Some(table))) => table,
        Ok(Ok(None)) => {
            return Ok(LookupResult::failure(id, raw, term, LookupFailure::NoDefinitionFound));
        }
        Ok(Err(LexiconError::NotReady)) => {
            return Ok(LookupResult::failure(id, raw, term, LookupFailure::NotReady));
        }
        Ok(Err(err)) => {
            error!(%id, error = %err, "lexicon query failed");
            return Ok(LookupResult::failure(id, raw, term, LookupFailure::NotReady));
        }
        Err(err) => {
            error!(%id, error = %err, "lexicon query panicked");
            return Ok(LookupResult::failure(id, raw, term, LookupFailure::NotReady));
        }
    };

    let accent = shared.accent.lock().clone();
    let pronunciation = tokio::select! {
        biased;
        _ = token.cancelled() => return Err(Cancelled),
        ipa = shared.pronouncer.pronounce(&term, &accent) => ipa,
    };
    checkpoint(token)?;

    Ok(LookupResult {
        id,
        query: raw.to_string(),
        term,
        pronunciation,
        definitions: Some(definitions),
        status: LookupStatus::Success,
    })
}

fn checkpoint(token: &CancellationToken) -> Result<(), Cancelled> {
    if token.is_cancelled() {
        return Err(Cancelled);
    }
    Ok(())
}

/// Delivers `result` only if its request still owns the slot.
fn finalize(shared: &Shared, token: &CancellationToken, result: LookupResult) -> LookupStatus {
    let mut slot = shared.slot.lock();
    if token.is_cancelled() || slot.active != Some(result.id) {
        debug!(id = %result.id, "dropping result of superseded request");
        return LookupStatus::Cancelled;
    }
    slot.state = SlotState::Idle;
    let status = result.status;
    if shared.results.send(result).is_err() {
        warn!("result receiver dropped");
    }
    status
}
