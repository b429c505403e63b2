//! Offline dictionary engine over a WordNet-style lexicon.
//!
//! The lexicon ships as a zstd-compressed rkyv archive (`wn-<version>.db.zst`)
//! that [`DatabaseProvisioner`] extracts into the user's data directory.
//! [`LexiconStore`] serves definitions from it, and [`LookupOrchestrator`]
//! runs lookups in the background with at most one request active at a time.
//! [`Dictionary`] wires these together for applications.

pub mod builder;
pub mod config;
mod data;
pub mod engine;
pub mod error;
pub mod lexicon;
pub mod matcher;
pub mod normalize;
pub mod orchestrator;
pub mod pronounce;
pub mod provision;
pub mod relations;

#[cfg(test)]
mod fixtures;

pub use builder::{LexiconBuilder, SynsetSource};
pub use config::{EngineConfig, PronunciationConfig};
pub use data::LexiconData;
pub use engine::{Dictionary, Suggestion};
pub use error::{
    BuildError, ConfigError, Error, LexiconError, ProvisionError, Result, SynthError,
};
pub use lexicon::{DefinitionEntry, DefinitionTable, LexiconStore, PartOfSpeech};
pub use normalize::normalize;
pub use orchestrator::{
    LookupFailure, LookupOrchestrator, LookupResult, LookupStatus, LookupTicket, RequestId,
    SlotState,
};
pub use pronounce::{EspeakSynthesizer, PronunciationProvider, Synthesizer};
pub use provision::{DatabaseArtifact, DatabaseProvisioner, ProvisionConfig, ProvisionState};
pub use relations::RelationSet;
