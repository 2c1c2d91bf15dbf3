//! Derived artifact cache
//!
//! Layout relative to the cache root:
//!
//! ```text
//! .lens_cache.lock
//! code/index/modified.json           snapshot of the watched tree
//! code/index/<prefix>/<source path>  IndexRecord per source file
//! code/live/<Ns>/<Name>.php          live classes
//! code/live/<Ns>/<name>.function.php live functions
//! code/mock/...                      mock equivalents
//! ```

mod cacher;
mod index;
mod lock;
mod store;

pub use cacher::{CacheError, Cacher, UpdateSummary};
pub use index::{IndexError, IndexRecord, IndexStore};
pub use lock::{CacheLock, LockError, LOCK_FILENAME};
pub use store::{name_segments, ArtifactKind, ArtifactStore, ArtifactVariant, StoreError};

use std::path::{Path, PathBuf};

/// Paths inside a cache root
#[derive(Debug, Clone)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn code_root(&self) -> PathBuf {
        self.root.join("code")
    }

    pub fn index_root(&self) -> PathBuf {
        self.code_root().join("index")
    }

    pub fn live_root(&self) -> PathBuf {
        self.code_root().join("live")
    }

    pub fn mock_root(&self) -> PathBuf {
        self.code_root().join("mock")
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.index_root().join("modified.json")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILENAME)
    }
}
