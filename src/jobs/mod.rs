//! Jobs and their execution
//!
//! A job is one unit of analysis work. It may run in this process (fork:
//! `start` returns the output directly) or in a fresh subprocess (shell:
//! `command` describes a self-contained command line whose stdout carries a
//! result envelope). The [`Dispatcher`] picks the mode, runs the job and
//! publishes its output exactly once.

mod coverage;
mod dispatcher;
mod state;

pub use coverage::{coverage_lines, run_internal_coverage, CoverageJob};
pub use dispatcher::{Dispatcher, ResultSlots};
pub use state::{JobRecord, JobState};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::io;
use std::path::PathBuf;

use lens_php::ParseError;
use lens_protocol::{ProtocolError, ResponseError};

/// Job identifier: a lowercase ULID
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Execution capability group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// Runs as a subprocess from a command line
    Shell,
    /// Runs inside the dispatching process
    Fork,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shell => write!(f, "shell"),
            Self::Fork => write!(f, "fork"),
        }
    }
}

/// Capability set declared by a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub shell: bool,
    pub fork: bool,
}

impl Capabilities {
    pub const NONE: Self = Self {
        shell: false,
        fork: false,
    };
    pub const SHELL: Self = Self {
        shell: true,
        fork: false,
    };
    pub const FORK: Self = Self {
        shell: false,
        fork: true,
    };
    pub const ALL: Self = Self {
        shell: true,
        fork: true,
    };

    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Shell => self.shell,
            Capability::Fork => self.fork,
        }
    }
}

/// Where a job runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    InProcess,
    Subprocess,
}

impl ExecutionMode {
    /// Capability a job needs for this mode
    pub fn capability(self) -> Capability {
        match self {
            Self::InProcess => Capability::Fork,
            Self::Subprocess => Capability::Shell,
        }
    }

    pub fn other(self) -> Self {
        match self {
            Self::InProcess => Self::Subprocess,
            Self::Subprocess => Self::InProcess,
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProcess => write!(f, "in_process"),
            Self::Subprocess => write!(f, "subprocess"),
        }
    }
}

/// Self-contained command line for the shell capability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Working directory of the subprocess
    pub working_dir: Option<PathBuf>,
}

/// Renders as a POSIX shell command line.
impl fmt::Display for JobCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", shell_word(&self.program.to_string_lossy()))?;
        for arg in &self.args {
            write!(f, " {}", shell_word(arg))?;
        }
        Ok(())
    }
}

/// `word` as-is when it has no shell metacharacters, otherwise single-quoted.
fn shell_word(word: &str) -> Cow<'_, str> {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=+:,@%".contains(c));
    if plain {
        Cow::Borrowed(word)
    } else {
        Cow::Owned(format!("'{}'", word.replace('\'', r"'\''")))
    }
}

/// A schedulable unit of work
pub trait Job: Send + Sync + 'static {
    type Output: Serialize + DeserializeOwned + Send + 'static;

    fn capabilities(&self) -> Capabilities;

    /// Run in-process (fork capability).
    fn start(&self) -> Result<Self::Output, JobError> {
        Err(JobError::Unsupported {
            capability: Capability::Fork,
        })
    }

    /// Command line for a subprocess (shell capability).
    fn command(&self) -> Result<JobCommand, JobError> {
        Err(JobError::Unsupported {
            capability: Capability::Shell,
        })
    }
}

/// Errors from jobs and the dispatcher
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("job does not support the {capability} capability")]
    Unsupported { capability: Capability },

    #[error("job supports neither in-process nor subprocess execution")]
    NoExecutionMode,

    #[error("invalid job state transition from {from:?} to {to:?}")]
    InvalidTransition { from: JobState, to: JobState },

    #[error("job {0} already completed")]
    AlreadyCompleted(JobId),

    #[error("unknown job {0}")]
    UnknownJob(JobId),

    #[error("cannot read {}: {source}", path.display())]
    Source {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },

    #[error("cannot start {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("subprocess exited with {}: {stderr}", code.map_or("a signal".to_string(), |c| format!("status {}", c)))]
    ExitStatus { code: Option<i32>, stderr: String },

    #[error("subprocess reported {0}")]
    Remote(ResponseError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("job panicked: {0}")]
    Panicked(String),
}
