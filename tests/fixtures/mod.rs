//! Temporary PHP projects for integration tests

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lens::cache::{ArtifactKind, ArtifactVariant, IndexRecord};
use lens::{CacheLayout, Cacher, UpdateSummary};
use tempfile::TempDir;
use walkdir::WalkDir;

/// Project with its sources in `src/` and its cache in `.lens/cache/`
pub struct Project {
    dir: TempDir,
    pub excludes: Vec<String>,
}

impl Project {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        Self {
            dir,
            excludes: Vec::new(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn src(&self) -> PathBuf {
        self.root().join("src")
    }

    pub fn cache(&self) -> PathBuf {
        self.root().join(".lens/cache")
    }

    pub fn layout(&self) -> CacheLayout {
        CacheLayout::new(&self.cache())
    }

    pub fn write(&self, relative: &str, contents: &str) {
        let path = self.src().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    pub fn remove(&self, relative: &str) {
        let path = self.src().join(relative);
        if path.is_dir() {
            fs::remove_dir_all(path).unwrap();
        } else {
            fs::remove_file(path).unwrap();
        }
    }

    pub fn cacher(&self) -> Cacher {
        Cacher::new(self.excludes.clone(), Duration::from_secs(5))
    }

    pub fn update(&self) -> UpdateSummary {
        self.cacher()
            .update(self.root(), &self.src(), &self.cache())
            .unwrap()
    }

    /// Index file of a source path relative to `src/`
    pub fn index_path(&self, relative: &str) -> PathBuf {
        self.layout().index_root().join("src").join(relative)
    }

    pub fn record(&self, relative: &str) -> Option<IndexRecord> {
        let path = self.index_path(relative);
        path.is_file()
            .then(|| IndexRecord::from_json(&fs::read_to_string(path).unwrap()).unwrap())
    }

    pub fn artifact(&self, variant: ArtifactVariant, kind: ArtifactKind, name: &str) -> PathBuf {
        let root = match variant {
            ArtifactVariant::Live => self.layout().live_root(),
            ArtifactVariant::Mock => self.layout().mock_root(),
        };
        let file = name.trim_start_matches('\\').replace('\\', "/");
        let suffix = match kind {
            ArtifactKind::Class => ".php",
            ArtifactKind::Function => ".function.php",
        };
        root.join(format!("{}{}", file, suffix))
    }

    pub fn class_artifacts(&self, name: &str) -> [PathBuf; 2] {
        [
            self.artifact(ArtifactVariant::Live, ArtifactKind::Class, name),
            self.artifact(ArtifactVariant::Mock, ArtifactKind::Class, name),
        ]
    }

    /// Every generated file under the live and mock roots
    pub fn generated_files(&self) -> BTreeSet<PathBuf> {
        let layout = self.layout();
        [layout.live_root(), layout.mock_root()]
            .iter()
            .filter(|root| root.is_dir())
            .flat_map(|root| WalkDir::new(root).into_iter().map(|e| e.unwrap()))
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect()
    }

    /// Every index record with the source path it belongs to
    pub fn records(&self) -> Vec<(PathBuf, IndexRecord)> {
        let root = self.layout().index_root().join("src");
        if !root.is_dir() {
            return Vec::new();
        }
        WalkDir::new(&root)
            .sort_by_file_name()
            .into_iter()
            .map(|e| e.unwrap())
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                let record = IndexRecord::from_json(&fs::read_to_string(e.path()).unwrap()).unwrap();
                (e.path().strip_prefix(&root).unwrap().to_path_buf(), record)
            })
            .collect()
    }

    /// The generated files are exactly the live and mock files named by the
    /// index records.
    pub fn assert_consistent(&self) {
        let mut expected = BTreeSet::new();
        for (_, record) in self.records() {
            for variant in ArtifactVariant::ALL {
                for name in &record.classes {
                    expected.insert(self.artifact(variant, ArtifactKind::Class, name));
                }
                for name in &record.functions {
                    expected.insert(self.artifact(variant, ArtifactKind::Function, name));
                }
            }
        }
        assert_eq!(self.generated_files(), expected);
    }
}
