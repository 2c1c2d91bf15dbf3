//! Exclusion rules for the watched tree

use globset::{Glob, GlobSet, GlobSetBuilder};

/// Patterns that are never part of the tree
const DEFAULT_EXCLUDES: &[&str] = &[
    ".git",
    ".git/**",
    ".svn",
    ".svn/**",
    ".DS_Store",
    "**/.DS_Store",
];

/// Glob rules matched against `/`-separated paths relative to the source root
#[derive(Debug, Clone)]
pub struct ExcludeRules {
    glob_set: GlobSet,
    patterns: Vec<String>,
}

impl ExcludeRules {
    /// Defaults only
    pub fn new() -> Result<Self, globset::Error> {
        Self::with_patterns(std::iter::empty::<&str>())
    }

    /// Defaults plus `patterns`; empty patterns are ignored
    pub fn with_patterns<I, S>(patterns: I) -> Result<Self, globset::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = GlobSetBuilder::new();
        let mut kept = Vec::new();

        for pattern in DEFAULT_EXCLUDES {
            builder.add(Glob::new(pattern)?);
        }
        for pattern in patterns {
            let pattern = pattern.as_ref().trim();
            if pattern.is_empty() {
                continue;
            }
            builder.add(Glob::new(pattern)?);
            kept.push(pattern.to_string());
        }

        Ok(Self {
            glob_set: builder.build()?,
            patterns: kept,
        })
    }

    /// Configured (non-default) patterns
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_excluded(&self, relative: &str) -> bool {
        self.glob_set.is_match(relative)
    }
}
