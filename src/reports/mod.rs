//! Report dispatch
//!
//! Maps each report kind to a destination and hands the run results to a
//! caller-supplied formatter. Formats themselves live outside this crate.

mod builder;
mod results;

pub use builder::{
    CoverageFormatter, ExecutableStatements, Formatters, ReportFormatter, ReportOutcome,
    ReportsBuilder,
};
pub use results::{Case, Issue, RunResults, Suite, Test};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Exit code of a run with at least one failing case
pub const CODE_FAILURES: i32 = 1;

const STDOUT: &str = "stdout";

/// Where a report goes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Destination {
    Stdout,
    /// Relative paths resolve against the project root
    Path(PathBuf),
}

impl From<String> for Destination {
    fn from(value: String) -> Self {
        if value == STDOUT {
            Self::Stdout
        } else {
            Self::Path(PathBuf::from(value))
        }
    }
}

impl From<Destination> for String {
    fn from(value: Destination) -> Self {
        match value {
            Destination::Stdout => STDOUT.to_string(),
            Destination::Path(path) => path.to_string_lossy().into_owned(),
        }
    }
}

/// Report kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportKind {
    Coverage,
    Issues,
    Tap,
    Xunit,
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Coverage => write!(f, "coverage"),
            Self::Issues => write!(f, "issues"),
            Self::Tap => write!(f, "tap"),
            Self::Xunit => write!(f, "xunit"),
        }
    }
}

/// `[reports]` table: absent kinds are not produced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportDestinations {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<Destination>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issues: Option<Destination>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tap: Option<Destination>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xunit: Option<Destination>,
}

impl ReportDestinations {
    pub fn get(&self, kind: ReportKind) -> Option<&Destination> {
        match kind {
            ReportKind::Coverage => self.coverage.as_ref(),
            ReportKind::Issues => self.issues.as_ref(),
            ReportKind::Tap => self.tap.as_ref(),
            ReportKind::Xunit => self.xunit.as_ref(),
        }
    }

    /// At most one text report may target stdout. Coverage is a directory
    /// tree and never goes to stdout.
    pub fn validate(&self) -> Result<(), ReportError> {
        if self.coverage == Some(Destination::Stdout) {
            return Err(ReportError::CoverageToStdout);
        }

        let mut on_stdout = None;
        for kind in [ReportKind::Issues, ReportKind::Tap, ReportKind::Xunit] {
            if self.get(kind) != Some(&Destination::Stdout) {
                continue;
            }
            if let Some(first) = on_stdout {
                return Err(ReportError::MultipleStdout {
                    first,
                    second: kind,
                });
            }
            on_stdout = Some(kind);
        }
        Ok(())
    }
}

/// Errors during report dispatch
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("both the {first} and {second} reports target stdout")]
    MultipleStdout { first: ReportKind, second: ReportKind },

    #[error("the coverage report cannot be written to stdout")]
    CoverageToStdout,

    #[error("no formatter supplied for the {0} report")]
    MissingFormatter(ReportKind),

    #[error("{kind} report failed: {message}")]
    Format { kind: ReportKind, message: String },

    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
