//! Change tree
//!
//! Directories map child names to nodes; files carry how they changed.
//! Ordered maps keep iteration deterministic.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeNode {
    File(ChangeKind),
    Directory(BTreeMap<String, ChangeNode>),
}

/// Path trail identifying one file below the source root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceKey(Vec<String>);

impl SourceKey {
    pub fn new(segments: Vec<String>) -> Self {
        Self(segments)
    }

    /// Split a `/`-separated relative path.
    pub fn parse(relative: &str) -> Self {
        Self(
            relative
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn to_path(&self) -> PathBuf {
        self.0.iter().collect()
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeTree {
    root: BTreeMap<String, ChangeNode>,
}

impl ChangeTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Top-level entries
    pub fn entries(&self) -> &BTreeMap<String, ChangeNode> {
        &self.root
    }

    /// Record a file change.
    ///
    /// Returns `false` without modifying the tree when the path crosses an
    /// existing node of the other type (a file where a directory is needed,
    /// or a directory where the file would go).
    pub fn insert(&mut self, key: &SourceKey, kind: ChangeKind) -> bool {
        let Some((leaf, parents)) = key.segments().split_last() else {
            return false;
        };

        if !self.can_insert(parents, leaf) {
            return false;
        }

        let mut level = &mut self.root;
        for segment in parents {
            let node = level
                .entry(segment.clone())
                .or_insert_with(|| ChangeNode::Directory(BTreeMap::new()));
            level = match node {
                ChangeNode::Directory(children) => children,
                ChangeNode::File(_) => return false,
            };
        }
        level.insert(leaf.clone(), ChangeNode::File(kind));
        true
    }

    fn can_insert(&self, parents: &[String], leaf: &str) -> bool {
        let mut level = &self.root;
        for segment in parents {
            match level.get(segment) {
                None => return true,
                Some(ChangeNode::File(_)) => return false,
                Some(ChangeNode::Directory(children)) => level = children,
            }
        }
        !matches!(level.get(leaf), Some(ChangeNode::Directory(_)))
    }

    /// Every file change in depth-first name order.
    pub fn leaves(&self) -> Vec<(SourceKey, ChangeKind)> {
        fn walk(
            level: &BTreeMap<String, ChangeNode>,
            trail: &mut Vec<String>,
            out: &mut Vec<(SourceKey, ChangeKind)>,
        ) {
            for (name, node) in level {
                trail.push(name.clone());
                match node {
                    ChangeNode::File(kind) => out.push((SourceKey::new(trail.clone()), *kind)),
                    ChangeNode::Directory(children) => walk(children, trail, out),
                }
                trail.pop();
            }
        }

        let mut out = Vec::new();
        walk(&self.root, &mut Vec::new(), &mut out);
        out
    }

    pub fn len(&self) -> usize {
        self.leaves().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(path: &str) -> SourceKey {
        SourceKey::parse(path)
    }

    #[test]
    fn test_nested_insert() {
        let mut tree = ChangeTree::new();
        assert!(tree.insert(&key("Model/User.php"), ChangeKind::Added));
        assert!(tree.insert(&key("Model/Post.php"), ChangeKind::Modified));
        assert!(tree.insert(&key("boot.php"), ChangeKind::Removed));

        let leaves: Vec<(String, ChangeKind)> = tree
            .leaves()
            .into_iter()
            .map(|(k, c)| (k.to_string(), c))
            .collect();
        assert_eq!(
            leaves,
            vec![
                ("Model/Post.php".to_string(), ChangeKind::Modified),
                ("Model/User.php".to_string(), ChangeKind::Added),
                ("boot.php".to_string(), ChangeKind::Removed),
            ]
        );
        assert!(matches!(tree.entries()["Model"], ChangeNode::Directory(_)));
    }

    #[test]
    fn test_file_blocks_directory() {
        let mut tree = ChangeTree::new();
        assert!(tree.insert(&key("Model"), ChangeKind::Removed));
        assert!(!tree.insert(&key("Model/User.php"), ChangeKind::Added));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_directory_blocks_file() {
        let mut tree = ChangeTree::new();
        assert!(tree.insert(&key("Model/User.php"), ChangeKind::Removed));
        assert!(!tree.insert(&key("Model"), ChangeKind::Added));
        assert_eq!(tree.entries().len(), 1);
    }

    #[test]
    fn test_empty_key_rejected() {
        let mut tree = ChangeTree::new();
        assert!(!tree.insert(&SourceKey::new(Vec::new()), ChangeKind::Added));
        assert!(tree.is_empty());
    }

    #[test]
    fn test_source_key_path() {
        let key = key("a/b/c.php");
        assert_eq!(key.to_path(), PathBuf::from("a").join("b").join("c.php"));
        assert_eq!(key.segments().len(), 3);
    }
}
