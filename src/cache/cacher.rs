//! Cache orchestrator
//!
//! Walks the change tree and keeps generated artifacts and index records in
//! step with the source tree:
//!
//! - removed: delete every artifact the old index record names, then the
//!   record itself
//! - modified: removed, then added; a renamed class leaves nothing behind
//! - added: generate, write every artifact, then write the record
//!
//! One file's failure is logged and skipped. Only change detection, the
//! cache lock and persisting the snapshot can fail a run.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lens_php::GeneratedBundle;

use super::index::{IndexRecord, IndexStore};
use super::lock::{CacheLock, LockError};
use super::store::{ArtifactKind, ArtifactStore, ArtifactVariant};
use super::CacheLayout;
use crate::config::EffectiveConfig;
use crate::watcher::{
    ChangeKind, ChangeNode, ExcludeRules, SourceKey, TreeSnapshot, Watcher, WatcherError,
};

/// Detection passes per update; a second pass picks up deferred additions.
const MAX_PASSES: usize = 2;

const GLOB_META: &[char] = &['*', '?', '[', ']', '{', '}', '\\', '!'];

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Watcher(#[from] WatcherError),

    #[error("invalid exclude pattern: {0}")]
    Pattern(#[from] globset::Error),
}

/// What an update did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateSummary {
    pub added: usize,
    pub modified: usize,
    pub removed: usize,
    /// Files that produced no record (unreadable, unparsable, write failure)
    pub skipped: usize,
    pub artifacts_written: usize,
    pub artifacts_deleted: usize,
    pub passes: usize,
    /// Additions still deferred after the last pass
    pub deferred: usize,
}

impl UpdateSummary {
    pub fn is_noop(&self) -> bool {
        self.added == 0 && self.modified == 0 && self.removed == 0
    }
}

impl fmt::Display for UpdateSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} added, {} modified, {} removed, {} skipped ({} artifacts written, {} deleted)",
            self.added,
            self.modified,
            self.removed,
            self.skipped,
            self.artifacts_written,
            self.artifacts_deleted
        )
    }
}

/// Incremental cache updater
#[derive(Debug, Clone)]
pub struct Cacher {
    exclude: Vec<String>,
    lock_timeout: Duration,
}

impl Default for Cacher {
    fn default() -> Self {
        Self::new(Vec::new(), Duration::from_secs(30))
    }
}

impl Cacher {
    pub fn new(exclude: Vec<String>, lock_timeout: Duration) -> Self {
        Self {
            exclude,
            lock_timeout,
        }
    }

    pub fn from_config(config: &EffectiveConfig) -> Self {
        Self::new(config.settings.cache.exclude.clone(), config.lock_timeout())
    }

    /// Bring the cache under `cache_root` up to date with `source_root`.
    pub fn update(
        &self,
        project_root: &Path,
        source_root: &Path,
        cache_root: &Path,
    ) -> Result<UpdateSummary, CacheError> {
        let _lock = CacheLock::acquire(cache_root, self.lock_timeout)?;

        let layout = CacheLayout::new(cache_root);
        let prefix = index_prefix(project_root, source_root);
        let mut run = Run {
            source_root,
            index: IndexStore::new(layout.index_root().join(prefix)),
            store: ArtifactStore::new(layout.live_root(), layout.mock_root()),
            summary: UpdateSummary::default(),
        };
        let watcher = Watcher::new(self.exclude_rules(source_root, cache_root)?);
        let snapshot_path = layout.snapshot_path();

        for pass in 1..=MAX_PASSES {
            let previous = TreeSnapshot::load(&snapshot_path);
            let mut scan = watcher.scan(source_root)?;
            let tree = scan.diff(&previous);
            tracing::debug!(pass, files = scan.len(), changes = tree.len(), "scanned source tree");

            run.update_directory(&mut Vec::new(), tree.entries());
            scan.persist(&snapshot_path)?;

            run.summary.passes = pass;
            run.summary.deferred = scan.deferred();
            if scan.deferred() == 0 {
                break;
            }
        }

        if run.summary.deferred > 0 {
            tracing::warn!(deferred = run.summary.deferred, "some additions are still deferred");
        }
        Ok(run.summary)
    }

    /// Configured patterns, plus the cache root when it sits inside the
    /// source root.
    fn exclude_rules(&self, source_root: &Path, cache_root: &Path) -> Result<ExcludeRules, CacheError> {
        let mut patterns = self.exclude.clone();

        let source = canonical(source_root);
        let cache = canonical(cache_root);
        if let Ok(inside) = cache.strip_prefix(&source) {
            let relative: Vec<String> = inside
                .components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect();
            let relative = relative.join("/");
            if relative.contains(|c: char| GLOB_META.contains(&c)) {
                tracing::warn!(cache = %relative, "cache root name has glob characters, not excluding it from the watched tree");
            } else if !relative.is_empty() {
                patterns.push(format!("{}/**", relative));
                patterns.push(relative);
            }
        }

        Ok(ExcludeRules::with_patterns(patterns)?)
    }
}

fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Source root relative to the project root; empty when it is the project
/// root or lies outside it.
fn index_prefix(project_root: &Path, source_root: &Path) -> PathBuf {
    let project = canonical(project_root);
    let source = canonical(source_root);
    match source.strip_prefix(&project) {
        Ok(relative) => relative.to_path_buf(),
        Err(_) => {
            tracing::debug!(
                project = %project.display(),
                source = %source.display(),
                "source root outside project root, using an empty index prefix"
            );
            PathBuf::new()
        }
    }
}

struct Run<'a> {
    source_root: &'a Path,
    index: IndexStore,
    store: ArtifactStore,
    summary: UpdateSummary,
}

impl Run<'_> {
    fn update_directory(&mut self, trail: &mut Vec<String>, entries: &BTreeMap<String, ChangeNode>) {
        for (name, node) in entries {
            trail.push(name.clone());
            match node {
                ChangeNode::Directory(children) => self.update_directory(trail, children),
                ChangeNode::File(kind) => self.update_file(&SourceKey::new(trail.clone()), *kind),
            }
            trail.pop();
        }
    }

    fn update_file(&mut self, key: &SourceKey, kind: ChangeKind) {
        tracing::debug!(path = %key, change = ?kind, "updating cache entry");
        match kind {
            ChangeKind::Removed => {
                self.remove(key);
                self.summary.removed += 1;
            }
            ChangeKind::Modified => {
                let leftover = self.remove(key);
                self.add(key, leftover);
                self.summary.modified += 1;
            }
            ChangeKind::Added => {
                let leftover = self.remove(key);
                self.add(key, leftover);
                self.summary.added += 1;
            }
        }
    }

    /// Delete everything the record of `key` names.
    ///
    /// When some artifacts cannot be deleted the record is rewritten to name
    /// just those, so a later update retries them. Returns that record.
    fn remove(&mut self, key: &SourceKey) -> Option<IndexRecord> {
        let record = match self.index.read(key) {
            Ok(Some(record)) => Some(record),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(path = %key, error = %e, "dropping unusable index record");
                None
            }
        };

        let mut leftover = IndexRecord::default();
        if let Some(record) = &record {
            for (kind, name) in record_entries(record) {
                for variant in ArtifactVariant::ALL {
                    match self.store.delete(variant, kind, name) {
                        Ok(true) => self.summary.artifacts_deleted += 1,
                        Ok(false) => {}
                        Err(e) => {
                            tracing::warn!(path = %key, name, %variant, error = %e, "cannot delete artifact");
                            let names = match kind {
                                ArtifactKind::Class => &mut leftover.classes,
                                ArtifactKind::Function => &mut leftover.functions,
                            };
                            names.insert(name.to_string());
                        }
                    }
                }
            }
        }

        if !leftover.is_empty() {
            if let Err(e) = self.index.write(key, &leftover) {
                tracing::warn!(path = %key, error = %e, "cannot rewrite index record");
            }
            return Some(leftover);
        }

        if let Err(e) = self.index.delete(key) {
            tracing::warn!(path = %key, error = %e, "cannot delete index record");
        }
        None
    }

    /// Generate and record the artifacts of `key`, keeping any names in
    /// `leftover` in the new record.
    fn add(&mut self, key: &SourceKey, leftover: Option<IndexRecord>) {
        let path = self.source_root.join(key.to_path());
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable source file");
                self.summary.skipped += 1;
                return;
            }
        };

        let source = String::from_utf8_lossy(&bytes);
        let bundle = match lens_php::transform(&source) {
            Ok(transformed) => transformed.generate(),
            Err(e) => {
                tracing::debug!(path = %key, error = %e, "skipping unparsable source file");
                self.summary.skipped += 1;
                return;
            }
        };

        let mut written: Vec<(ArtifactVariant, ArtifactKind, &str)> = Vec::new();
        for (variant, kind, name, content) in bundle_entries(&bundle) {
            if let Err(e) = self.store.write(variant, kind, name, content) {
                tracing::warn!(path = %key, name, error = %e, "artifact write failed, rolling back file");
                self.rollback(&written);
                self.summary.skipped += 1;
                return;
            }
            written.push((variant, kind, name));
        }

        let mut record = IndexRecord::from_bundle(&bundle);
        if let Some(leftover) = leftover {
            record.classes.extend(leftover.classes);
            record.functions.extend(leftover.functions);
        }
        if let Err(e) = self.index.write(key, &record) {
            tracing::warn!(path = %key, error = %e, "index write failed, rolling back file");
            self.rollback(&written);
            self.summary.skipped += 1;
            return;
        }

        tracing::debug!(path = %key, classes = record.classes.len(), functions = record.functions.len(), "cached");
        self.summary.artifacts_written += written.len();
    }

    fn rollback(&self, written: &[(ArtifactVariant, ArtifactKind, &str)]) {
        for (variant, kind, name) in written {
            if let Err(e) = self.store.delete(*variant, *kind, name) {
                tracing::warn!(name, %variant, error = %e, "cannot roll back artifact");
            }
        }
    }
}

fn record_entries(record: &IndexRecord) -> impl Iterator<Item = (ArtifactKind, &str)> {
    let classes = record.classes.iter().map(|n| (ArtifactKind::Class, n.as_str()));
    let functions = record
        .functions
        .iter()
        .map(|n| (ArtifactKind::Function, n.as_str()));
    classes.chain(functions)
}

fn bundle_entries(
    bundle: &GeneratedBundle,
) -> impl Iterator<Item = (ArtifactVariant, ArtifactKind, &str, &str)> {
    [
        (ArtifactVariant::Live, &bundle.live),
        (ArtifactVariant::Mock, &bundle.mock),
    ]
    .into_iter()
    .flat_map(|(variant, generated)| {
        let classes = generated
            .classes
            .iter()
            .map(move |(n, c)| (variant, ArtifactKind::Class, n.as_str(), c.as_str()));
        let functions = generated
            .functions
            .iter()
            .map(move |(n, c)| (variant, ArtifactKind::Function, n.as_str(), c.as_str()));
        classes.chain(functions)
    })
}
