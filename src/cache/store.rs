//! Artifact store
//!
//! Generated files live at deterministic paths derived from their
//! namespace-qualified names: `Acme\Util\Foo` becomes `Acme/Util/Foo.php`
//! for a class and `Acme/Util/foo.function.php` for a function, under the
//! live or mock root.

use serde::Serialize;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactVariant {
    Live,
    Mock,
}

impl ArtifactVariant {
    pub const ALL: [ArtifactVariant; 2] = [ArtifactVariant::Live, ArtifactVariant::Mock];
}

impl fmt::Display for ArtifactVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Mock => write!(f, "mock"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Class,
    Function,
}

impl ArtifactKind {
    fn suffix(self) -> &'static str {
        match self {
            Self::Class => ".php",
            Self::Function => ".function.php",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid artifact name {0:?}")]
    InvalidName(String),

    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot delete {}: {source}", path.display())]
    Delete {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Validated path segments of a qualified name.
///
/// A single leading `\` is ignored. Empty, `.` and `..` segments and
/// segments containing a path separator are rejected.
pub fn name_segments(name: &str) -> Result<Vec<&str>, StoreError> {
    let trimmed = name.strip_prefix('\\').unwrap_or(name);
    let segments: Vec<&str> = trimmed.split('\\').collect();

    let invalid = segments.iter().any(|s| {
        s.is_empty() || *s == "." || *s == ".." || s.contains('/') || s.contains('\0')
    });
    if invalid {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(segments)
}

/// Live and mock roots
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    live_root: PathBuf,
    mock_root: PathBuf,
}

impl ArtifactStore {
    pub fn new(live_root: PathBuf, mock_root: PathBuf) -> Self {
        Self {
            live_root,
            mock_root,
        }
    }

    pub fn root(&self, variant: ArtifactVariant) -> &Path {
        match variant {
            ArtifactVariant::Live => &self.live_root,
            ArtifactVariant::Mock => &self.mock_root,
        }
    }

    /// Deterministic path of an artifact
    pub fn artifact_path(
        &self,
        variant: ArtifactVariant,
        kind: ArtifactKind,
        name: &str,
    ) -> Result<PathBuf, StoreError> {
        let segments = name_segments(name)?;
        let mut path = self.root(variant).to_path_buf();
        if let Some((last, parents)) = segments.split_last() {
            for segment in parents {
                path.push(segment);
            }
            path.push(format!("{}{}", last, kind.suffix()));
        }
        Ok(path)
    }

    /// Write an artifact via a temp file and rename.
    pub fn write(
        &self,
        variant: ArtifactVariant,
        kind: ArtifactKind,
        name: &str,
        content: &str,
    ) -> Result<PathBuf, StoreError> {
        let path = self.artifact_path(variant, kind, name)?;
        let write_err = |source: io::Error| StoreError::Write {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let temp_path = path.with_file_name(format!(".{}.tmp", file_name));

        fs::write(&temp_path, content).map_err(write_err)?;
        if let Err(e) = fs::rename(&temp_path, &path) {
            let _ = fs::remove_file(&temp_path);
            return Err(write_err(e));
        }
        Ok(path)
    }

    /// Delete an artifact and prune directories it leaves empty.
    ///
    /// Returns whether a file was removed.
    pub fn delete(
        &self,
        variant: ArtifactVariant,
        kind: ArtifactKind,
        name: &str,
    ) -> Result<bool, StoreError> {
        let path = self.artifact_path(variant, kind, name)?;
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(source) => return Err(StoreError::Delete { path, source }),
        }

        prune_empty_dirs(path.parent(), self.root(variant));
        Ok(true)
    }
}

/// Remove empty directories from `dir` upwards, stopping below `root`.
pub(crate) fn prune_empty_dirs(mut dir: Option<&Path>, root: &Path) {
    while let Some(current) = dir {
        if current == root || !current.starts_with(root) {
            break;
        }
        // Fails when the directory still has entries.
        if fs::remove_dir(current).is_err() {
            break;
        }
        dir = current.parent();
    }
}
