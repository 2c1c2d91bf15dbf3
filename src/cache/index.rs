//! Per-source-file index records
//!
//! `code/index/<prefix>/<relative source path>` holds the names of every
//! class and function generated from that source file. It is the only
//! record used to decide what to delete.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use lens_php::GeneratedBundle;

use super::store::prune_empty_dirs;
use crate::watcher::SourceKey;

/// Names generated from one source file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub classes: BTreeSet<String>,
    pub functions: BTreeSet<String>,
}

impl IndexRecord {
    /// Names present in a generated bundle
    pub fn from_bundle(bundle: &GeneratedBundle) -> Self {
        Self {
            classes: bundle.live.classes.keys().cloned().collect(),
            functions: bundle.live.functions.keys().cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.functions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.classes.len() + self.functions.len()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("index record {} is malformed: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("index I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Index records below one root
#[derive(Debug, Clone)]
pub struct IndexStore {
    root: PathBuf,
}

impl IndexStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &SourceKey) -> PathBuf {
        self.root.join(key.to_path())
    }

    /// Read a record; `Ok(None)` when there is none.
    pub fn read(&self, key: &SourceKey) -> Result<Option<IndexRecord>, IndexError> {
        let path = self.path_for(key);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(IndexError::Io { path, source }),
        };
        IndexRecord::from_json(&contents)
            .map(Some)
            .map_err(|source| IndexError::Malformed { path, source })
    }

    /// Write a record via a temp file and rename.
    pub fn write(&self, key: &SourceKey, record: &IndexRecord) -> Result<(), IndexError> {
        let path = self.path_for(key);
        let io_err = |source: io::Error| IndexError::Io {
            path: path.clone(),
            source,
        };

        let json = record
            .to_json()
            .map_err(|e| io_err(io::Error::new(io::ErrorKind::InvalidData, e)))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let temp_path = path.with_file_name(format!(".{}.tmp", file_name));

        fs::write(&temp_path, json).map_err(io_err)?;
        fs::rename(&temp_path, &path).map_err(io_err)?;
        Ok(())
    }

    /// Delete a record, pruning empty directories. Missing is fine.
    pub fn delete(&self, key: &SourceKey) -> Result<(), IndexError> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => {
                prune_empty_dirs(path.parent(), &self.root);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(IndexError::Io { path, source }),
        }
    }
}
