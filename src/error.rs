//! Error types for each layer of the lookup engine.
//!
//! Only [`LexiconError::NotReady`] and [`ProvisionError`] are meant to gate
//! availability; everything else resolves into a terminal lookup status or a
//! degraded result.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures raised by [`crate::LexiconStore`].
#[derive(Error, Debug)]
pub enum LexiconError {
    /// No database has been opened yet.
    #[error("lexicon is not ready")]
    NotReady,

    #[error("failed to read lexicon database {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file exists but does not hold a valid archive.
    #[error("lexicon database {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

/// Terminal failure reasons of a provisioning attempt.
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("no artifact named {file_name} found in {} searched directories", searched.len())]
    ArtifactMissing {
        file_name: String,
        searched: Vec<PathBuf>,
    },

    #[error("failed to extract {artifact}: {source}")]
    Extraction {
        artifact: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures of the external pronunciation synthesizer.
#[derive(Error, Debug)]
pub enum SynthError {
    #[error("synthesizer executable {0} not found")]
    MissingExecutable(PathBuf),

    #[error("synthesizer timed out after {0:?}")]
    Timeout(Duration),

    #[error("synthesizer exited with {code:?}: {stderr}")]
    ExitStatus { code: Option<i32>, stderr: String },

    #[error("synthesizer I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures while packing a lexicon archive.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("duplicate synset id {0:?}")]
    DuplicateSynset(String),

    #[error("malformed synset on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to build lemma index: {0}")]
    Index(#[from] fst::Error),

    #[error("failed to serialize lexicon: {0}")]
    Serialize(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Crate-level error used by the service facade and the CLI.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Lexicon(#[from] LexiconError),

    #[error("provisioning failed: {0}")]
    Provision(#[from] ProvisionError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, Error>;
