//! Change detection
//!
//! `scan` fingerprints every file below the source root, `TreeScan::diff`
//! compares the result with the previous snapshot, and `TreeScan::persist`
//! stores the new snapshot once the caller has processed the changes.

mod exclude;
mod snapshot;
mod tree;

pub use exclude::ExcludeRules;
pub use snapshot::{fingerprint, TreeSnapshot};
pub use tree::{ChangeKind, ChangeNode, ChangeTree, SourceKey};

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Errors from change detection
#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    #[error("source root {} is not a readable directory", .0.display())]
    RootUnreadable(PathBuf),

    #[error("cannot read {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("cannot write snapshot {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("snapshot serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid exclude pattern: {0}")]
    Pattern(#[from] globset::Error),
}

/// Scans a source root
#[derive(Debug, Clone)]
pub struct Watcher {
    excludes: ExcludeRules,
}

impl Watcher {
    pub fn new(excludes: ExcludeRules) -> Self {
        Self { excludes }
    }

    /// Fingerprint every regular file below `source_root`.
    ///
    /// Symlinks are not followed. A file that cannot be read is left out
    /// with a warning; an unreadable directory fails the scan.
    pub fn scan(&self, source_root: &Path) -> Result<TreeScan, WatcherError> {
        if !source_root.is_dir() {
            return Err(WatcherError::RootUnreadable(source_root.to_path_buf()));
        }

        let mut files = BTreeMap::new();
        let walker = WalkDir::new(source_root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                relative_key(source_root, entry.path())
                    .map(|rel| !self.excludes.is_excluded(&rel))
                    .unwrap_or(true)
            });

        for entry in walker {
            let entry = entry.map_err(|source| WatcherError::Walk {
                path: source
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| source_root.to_path_buf()),
                source,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(relative) = relative_key(source_root, entry.path()) else {
                continue;
            };

            match fs::read(entry.path()) {
                Ok(bytes) => {
                    files.insert(relative, fingerprint(&bytes));
                }
                Err(e) => {
                    tracing::warn!(path = %entry.path().display(), error = %e, "skipping unreadable file");
                }
            }
        }

        Ok(TreeScan {
            files,
            deferred: BTreeSet::new(),
        })
    }
}

/// `/`-separated path of `path` relative to `root`
fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let segments: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

/// Current state of the source tree
#[derive(Debug, Clone)]
pub struct TreeScan {
    files: BTreeMap<String, String>,
    deferred: BTreeSet<String>,
}

impl TreeScan {
    /// Changes relative to `previous`.
    ///
    /// Removals and modifications are placed first. An addition that
    /// conflicts with them (a file replaced by a directory of the same name,
    /// or the reverse) is deferred: it is left out of the tree and of the
    /// persisted snapshot, so the next scan reports it as added.
    pub fn diff(&mut self, previous: &TreeSnapshot) -> ChangeTree {
        let mut tree = ChangeTree::new();
        self.deferred.clear();

        for (path, old) in &previous.files {
            let kind = match self.files.get(path) {
                None => ChangeKind::Removed,
                Some(current) if current != old => ChangeKind::Modified,
                Some(_) => continue,
            };
            tree.insert(&SourceKey::parse(path), kind);
        }

        for path in self.files.keys() {
            if previous.files.contains_key(path) {
                continue;
            }
            if !tree.insert(&SourceKey::parse(path), ChangeKind::Added) {
                tracing::debug!(path = %path, "deferring addition across a type change");
                self.deferred.insert(path.clone());
            }
        }

        tree
    }

    /// Additions held back until the next scan
    pub fn deferred(&self) -> usize {
        self.deferred.len()
    }

    /// Number of files seen
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Snapshot of the scanned tree without deferred additions
    pub fn snapshot(&self) -> TreeSnapshot {
        let files = self
            .files
            .iter()
            .filter(|(path, _)| !self.deferred.contains(*path))
            .map(|(path, hash)| (path.clone(), hash.clone()))
            .collect();
        TreeSnapshot::new(files)
    }

    /// Store the snapshot as the new baseline.
    pub fn persist(&self, path: &Path) -> Result<(), WatcherError> {
        self.snapshot().write_to_file(path)
    }
}
