use std::path::{Path, PathBuf};

use cask_crypto::HashAlgorithm;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Configuration for a blob store: which medium, which digest.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Hash algorithm keys are derived with.
    pub algorithm: HashAlgorithm,
    /// Storage medium the engine is attached to.
    pub backend: BackendConfig,
    /// Filesystem medium tuning. Ignored by the memory backend.
    pub file: FileOptions,
}

impl StoreConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(text: &str) -> StoreResult<Self> {
        toml::from_str(text).map_err(|e| StoreError::Config(e.to_string()))
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

/// Which storage medium backs the store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    /// Volatile in-process storage.
    #[default]
    Memory,
    /// Durable storage under a root directory.
    File { root: PathBuf },
}

/// Permissions and durability for the filesystem medium.
///
/// Mode bits only apply on Unix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileOptions {
    /// Mode for shard directories.
    pub dir_mode: u32,
    /// Mode for blob and temporary files.
    pub file_mode: u32,
    /// `fsync` a blob's file before it is renamed into place.
    pub sync_on_flush: bool,
}

impl Default for FileOptions {
    fn default() -> Self {
        Self {
            dir_mode: 0o750,
            file_mode: 0o640,
            sync_on_flush: false,
        }
    }
}
