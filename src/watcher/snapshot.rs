//! Tree snapshot (modified.json)
//!
//! Maps every watched file, by `/`-separated relative path, to the SHA-256
//! of its contents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use super::WatcherError;

/// Schema version for modified.json
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TreeSnapshot {
    pub schema_version: u32,

    /// When the tree was captured
    pub created_at: DateTime<Utc>,

    /// Relative path to content fingerprint
    pub files: BTreeMap<String, String>,
}

impl Default for TreeSnapshot {
    fn default() -> Self {
        Self::new(BTreeMap::new())
    }
}

impl TreeSnapshot {
    pub fn new(files: BTreeMap<String, String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            created_at: Utc::now(),
            files,
        }
    }

    /// Load a snapshot, treating a missing or unreadable file as empty.
    pub fn load(path: &Path) -> Self {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "snapshot unreadable, rescanning everything");
                return Self::default();
            }
        };

        match Self::from_json(&contents) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "snapshot corrupt, rescanning everything");
                Self::default()
            }
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write atomically, creating parent directories.
    pub fn write_to_file(&self, path: &Path) -> Result<(), WatcherError> {
        let persist_err = |source: io::Error| WatcherError::Persist {
            path: path.to_path_buf(),
            source,
        };

        let json = self.to_json()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(persist_err)?;
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "modified.json".to_string());
        let temp_path = path.with_file_name(format!(".{}.tmp", file_name));

        fs::write(&temp_path, json).map_err(persist_err)?;
        fs::rename(&temp_path, path).map_err(persist_err)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// SHA-256 of `data` as lowercase hex
pub fn fingerprint(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
