//! Engine configuration, loadable from JSON with defaults for every field.

use crate::error::ConfigError;
use crate::pronounce::{DEFAULT_CACHE_CAPACITY, EspeakSynthesizer};
use crate::provision::ProvisionConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory name used under every data root.
pub const APP_DIR: &str = "wordlens";
pub const DEFAULT_DB_VERSION: &str = "2024";

const SYSTEM_DATA_DIRS: [&str; 3] = ["/usr/local/share", "/usr/share", "/app/share"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub db_version: String,
    pub artifact_dirs: Vec<PathBuf>,
    pub data_dir: PathBuf,
    pub pronunciation: PronunciationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PronunciationConfig {
    pub program: PathBuf,
    pub speed: u32,
    pub language: String,
    pub accent: String,
    pub timeout_ms: u64,
    pub cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_version: DEFAULT_DB_VERSION.to_string(),
            artifact_dirs: default_artifact_dirs(),
            data_dir: default_data_dir(),
            pronunciation: PronunciationConfig::default(),
        }
    }
}

impl Default for PronunciationConfig {
    fn default() -> Self {
        let espeak = EspeakSynthesizer::default();
        Self {
            program: espeak.program,
            speed: espeak.speed,
            language: espeak.language,
            accent: "us".to_string(),
            timeout_ms: 5_000,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Reads a JSON config; fields absent from the file keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn provision_config(&self) -> ProvisionConfig {
        ProvisionConfig {
            version: self.db_version.clone(),
            artifact_dirs: self.artifact_dirs.clone(),
            data_dir: self.data_dir.clone(),
        }
    }
}

impl PronunciationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn synthesizer(&self) -> EspeakSynthesizer {
        EspeakSynthesizer {
            program: self.program.clone(),
            speed: self.speed,
            language: self.language.clone(),
        }
    }
}

/// `$XDG_DATA_DIRS` entries followed by the usual system roots, each joined
/// with [`APP_DIR`]. Duplicates keep their first position.
pub fn default_artifact_dirs() -> Vec<PathBuf> {
    artifact_dirs_from(std::env::var("XDG_DATA_DIRS").ok().as_deref())
}

fn artifact_dirs_from(xdg_data_dirs: Option<&str>) -> Vec<PathBuf> {
    let xdg = xdg_data_dirs
        .unwrap_or_default()
        .split(':')
        .filter(|entry| !entry.trim().is_empty())
        .map(PathBuf::from);
    let mut dirs: Vec<PathBuf> = Vec::new();
    for root in xdg.chain(SYSTEM_DATA_DIRS.iter().map(PathBuf::from)) {
        let dir = root.join(APP_DIR);
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }
    dirs
}

pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
}
