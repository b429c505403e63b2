//! Locates, extracts and version-checks the compressed lexicon artifact.
//!
//! The provisioner walks a small state machine:
//!
//! ```text
//! Uninitialized ──(extracted copy present)──────────────────► Ready
//!       │
//!       └──► Searching ──(artifact found)──► Extracting ──────► Ready
//!                 │                              │
//!                 └──(nothing found)──► Failed   └──(error)──► Failed
//! ```
//!
//! `Failed` ends the attempt; the caller decides whether to retry.

use crate::builder::artifact_file_name;
use crate::error::ProvisionError;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const EXTRACTED_DIR_PREFIX: &str = "wn-";
const DATABASE_FILE_NAME: &str = "lexicon.db";
const PARTIAL_SUFFIX: &str = "partial";

/// Paths of one provisioned database version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseArtifact {
    pub version: String,
    pub compressed_path: Option<PathBuf>,
    pub extracted_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    ArtifactMissing,
    ExtractionError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProvisionState {
    Uninitialized,
    Searching,
    Extracting { artifact: PathBuf },
    Ready { database: PathBuf },
    Failed { reason: FailureReason },
}

#[derive(Debug, Clone)]
pub struct ProvisionConfig {
    pub version: String,
    /// Directories scanned, in order, for `wn-<version>.db.zst`.
    pub artifact_dirs: Vec<PathBuf>,
    /// Per-user directory holding the extracted database.
    pub data_dir: PathBuf,
}

pub struct DatabaseProvisioner {
    config: ProvisionConfig,
    state: ProvisionState,
    transitions: Vec<ProvisionState>,
}

impl DatabaseProvisioner {
    pub fn new(config: ProvisionConfig) -> Self {
        Self {
            config,
            state: ProvisionState::Uninitialized,
            transitions: Vec::new(),
        }
    }

    pub fn state(&self) -> &ProvisionState {
        &self.state
    }

    /// Every state entered by the most recent attempt, in order.
    pub fn transitions(&self) -> &[ProvisionState] {
        &self.transitions
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    /// Directory holding the extracted database for the configured version.
    pub fn extracted_dir(&self) -> PathBuf {
        self.config
            .data_dir
            .join(format!("{EXTRACTED_DIR_PREFIX}{}", self.config.version))
    }

    pub fn extracted_path(&self) -> PathBuf {
        self.extracted_dir().join(DATABASE_FILE_NAME)
    }

    /// Makes the configured database version available on disk.
    pub fn provision(&mut self) -> Result<DatabaseArtifact, ProvisionError> {
        self.provision_with(|_| {})
    }

    /// Same as [`provision`](Self::provision), reporting each state change to `observer`.
    pub fn provision_with<F>(&mut self, mut observer: F) -> Result<DatabaseArtifact, ProvisionError>
    where
        F: FnMut(&ProvisionState),
    {
        self.transitions.clear();
        self.enter(ProvisionState::Uninitialized, &mut observer);

        let extracted = self.extracted_path();
        if extracted.is_file() {
            debug!(path = %extracted.display(), "using existing extracted database");
            self.purge_stale_versions();
            self.enter(
                ProvisionState::Ready {
                    database: extracted.clone(),
                },
                &mut observer,
            );
            return Ok(DatabaseArtifact {
                version: self.config.version.clone(),
                compressed_path: None,
                extracted_path: extracted,
            });
        }
        self.search_and_extract(&mut observer)
    }

    /// Discards the current extracted copy and provisions again from the artifact.
    pub fn reprovision(&mut self) -> Result<DatabaseArtifact, ProvisionError> {
        self.reprovision_with(|_| {})
    }

    pub fn reprovision_with<F>(&mut self, mut observer: F) -> Result<DatabaseArtifact, ProvisionError>
    where
        F: FnMut(&ProvisionState),
    {
        self.transitions.clear();
        let dir = self.extracted_dir();
        match fs::remove_dir_all(&dir) {
            Ok(()) => info!(path = %dir.display(), "removed untrusted database"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(path = %dir.display(), error = %err, "failed to remove untrusted database"),
        }
        self.search_and_extract(&mut observer)
    }

    fn search_and_extract<F>(&mut self, observer: &mut F) -> Result<DatabaseArtifact, ProvisionError>
    where
        F: FnMut(&ProvisionState),
    {
        self.enter(ProvisionState::Searching, observer);
        let file_name = artifact_file_name(&self.config.version);
        let Some(artifact) = self.find_artifact(&file_name) else {
            self.enter(
                ProvisionState::Failed {
                    reason: FailureReason::ArtifactMissing,
                },
                observer,
            );
            return Err(ProvisionError::ArtifactMissing {
                file_name,
                searched: self.config.artifact_dirs.clone(),
            });
        };

        self.enter(
            ProvisionState::Extracting {
                artifact: artifact.clone(),
            },
            observer,
        );
        let extracted = self.extracted_path();
        if let Err(source) = extract(&artifact, &extracted) {
            self.enter(
                ProvisionState::Failed {
                    reason: FailureReason::ExtractionError,
                },
                observer,
            );
            return Err(ProvisionError::Extraction { artifact, source });
        }

        self.purge_stale_versions();
        self.enter(
            ProvisionState::Ready {
                database: extracted.clone(),
            },
            observer,
        );
        Ok(DatabaseArtifact {
            version: self.config.version.clone(),
            compressed_path: Some(artifact),
            extracted_path: extracted,
        })
    }

    fn find_artifact(&self, file_name: &str) -> Option<PathBuf> {
        self.config
            .artifact_dirs
            .iter()
            .map(|dir| dir.join(file_name))
            .find(|candidate| {
                let found = candidate.is_file();
                debug!(path = %candidate.display(), found, "checked for artifact");
                found
            })
    }

    /// Removes extracted directories of other versions. Failures are logged only.
    fn purge_stale_versions(&self) {
        let current = self.extracted_dir();
        let entries = match fs::read_dir(&self.config.data_dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(path = %self.config.data_dir.display(), error = %err, "cannot scan data directory");
                return;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let is_versioned = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(EXTRACTED_DIR_PREFIX));
            if !is_versioned || path == current || !path.is_dir() {
                continue;
            }
            match fs::remove_dir_all(&path) {
                Ok(()) => info!(path = %path.display(), "purged stale database version"),
                Err(err) => warn!(path = %path.display(), error = %err, "failed to purge stale database"),
            }
        }
    }

    fn enter<F>(&mut self, state: ProvisionState, observer: &mut F)
    where
        F: FnMut(&ProvisionState),
    {
        info!(version = %self.config.version, state = ?state, "provisioning");
        observer(&state);
        self.transitions.push(state.clone());
        self.state = state;
    }
}

/// Streams the zstd artifact into `target`, publishing it only once complete.
fn extract(artifact: &Path, target: &Path) -> io::Result<()> {
    let dir = target
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "target has no parent"))?;
    fs::create_dir_all(dir)?;
    let partial = target.with_extension(PARTIAL_SUFFIX);

    let result = (|| {
        let source = BufReader::new(File::open(artifact)?);
        let mut sink = BufWriter::new(File::create(&partial)?);
        zstd::stream::copy_decode(source, &mut sink)?;
        sink.flush()?;
        sink.get_ref().sync_all()?;
        fs::rename(&partial, target)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&partial);
        // Only removes the directory when it is empty.
        let _ = fs::remove_dir(dir);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::lexicon::LexiconStore;
    use tempfile::TempDir;

    struct Layout {
        _root: TempDir,
        system: Vec<PathBuf>,
        data: PathBuf,
    }

    fn layout() -> Layout {
        let root = tempfile::tempdir().unwrap();
        let system = vec![root.path().join("usr-local-share"), root.path().join("usr-share")];
        let data = root.path().join("user-data");
        Layout {
            _root: root,
            system,
            data,
        }
    }

    fn provisioner(layout: &Layout, version: &str) -> DatabaseProvisioner {
        DatabaseProvisioner::new(ProvisionConfig {
            version: version.to_string(),
            artifact_dirs: layout.system.clone(),
            data_dir: layout.data.clone(),
        })
    }

    #[test]
    fn missing_artifact_fails_without_partial_files() {
        let layout = layout();
        let mut provisioner = provisioner(&layout, "1.0");
        let err = provisioner.provision().unwrap_err();
        assert!(matches!(err, ProvisionError::ArtifactMissing { ref searched, .. } if searched.len() == 2));
        assert_eq!(
            provisioner.transitions(),
            &[
                ProvisionState::Uninitialized,
                ProvisionState::Searching,
                ProvisionState::Failed {
                    reason: FailureReason::ArtifactMissing
                },
            ]
        );
        assert!(!provisioner.extracted_path().exists());
        assert!(!provisioner.extracted_dir().exists());
    }

    #[test]
    fn extracts_artifact_from_later_directory() {
        let layout = layout();
        let artifact = fixtures::artifact(&layout.system[1], "1.0");
        let mut provisioner = provisioner(&layout, "1.0");
        let seen = std::cell::RefCell::new(Vec::new());
        let provisioned = provisioner
            .provision_with(|state| seen.borrow_mut().push(state.clone()))
            .unwrap();

        assert_eq!(provisioned.compressed_path.as_deref(), Some(artifact.as_path()));
        assert_eq!(provisioned.extracted_path, provisioner.extracted_path());
        assert_eq!(seen.into_inner(), provisioner.transitions().to_vec());
        assert!(matches!(
            provisioner.transitions(),
            [
                ProvisionState::Uninitialized,
                ProvisionState::Searching,
                ProvisionState::Extracting { .. },
                ProvisionState::Ready { .. },
            ]
        ));
        let store = LexiconStore::open(&provisioned.extracted_path).unwrap();
        assert_eq!(store.version().as_deref(), Some("1.0"));
    }

    #[test]
    fn existing_extraction_goes_straight_to_ready() {
        let layout = layout();
        fixtures::artifact(&layout.system[0], "1.0");
        provisioner(&layout, "1.0").provision().unwrap();

        let mut again = provisioner(&layout, "1.0");
        let provisioned = again.provision().unwrap();
        assert_eq!(provisioned.compressed_path, None);
        assert_eq!(
            again.transitions(),
            &[
                ProvisionState::Uninitialized,
                ProvisionState::Ready {
                    database: again.extracted_path()
                },
            ]
        );
    }

    #[test]
    fn new_version_purges_older_extractions() {
        let layout = layout();
        fixtures::artifact(&layout.system[0], "1.0");
        fixtures::artifact(&layout.system[0], "2.0");
        let old = provisioner(&layout, "1.0");
        let old_dir = old.extracted_dir();
        provisioner(&layout, "1.0").provision().unwrap();
        assert!(old_dir.is_dir());

        let mut new = provisioner(&layout, "2.0");
        new.provision().unwrap();
        assert!(!old_dir.exists());
        assert!(new.extracted_path().is_file());
        let remaining: Vec<_> = fs::read_dir(&layout.data).unwrap().flatten().collect();
        assert_eq!(remaining.len(), 1);
    }

    #[test]
    fn corrupt_artifact_fails_extraction_cleanly() {
        let layout = layout();
        fs::create_dir_all(&layout.system[0]).unwrap();
        fs::write(layout.system[0].join(artifact_file_name("1.0")), b"not zstd at all").unwrap();
        let mut provisioner = provisioner(&layout, "1.0");
        let err = provisioner.provision().unwrap_err();
        assert!(matches!(err, ProvisionError::Extraction { .. }));
        assert_eq!(
            provisioner.state(),
            &ProvisionState::Failed {
                reason: FailureReason::ExtractionError
            }
        );
        assert!(!provisioner.extracted_path().exists());
        assert!(!provisioner.extracted_path().with_extension(PARTIAL_SUFFIX).exists());
    }

    #[test]
    fn reprovision_replaces_untrusted_database() {
        let layout = layout();
        fixtures::artifact(&layout.system[0], "1.0");
        let mut provisioner = provisioner(&layout, "1.0");
        let provisioned = provisioner.provision().unwrap();
        fs::write(&provisioned.extracted_path, b"garbage").unwrap();
        assert!(LexiconStore::open(&provisioned.extracted_path).is_err());

        let again = provisioner.reprovision().unwrap();
        assert_eq!(provisioner.transitions()[0], ProvisionState::Searching);
        assert!(LexiconStore::open(&again.extracted_path).is_ok());
    }
}
