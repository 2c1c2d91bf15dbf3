//! Top-level error type
//!
//! Every module error folds into [`LensError`] at the binary boundary, where
//! `main` prints `Error <code>: <message>` and exits with the code.

use std::io;

use lens_php::ParseError;
use lens_protocol::ProtocolError;

use crate::cache::CacheError;
use crate::config::ConfigError;
use crate::jobs::JobError;
use crate::reports::{ReportError, CODE_FAILURES};

#[derive(Debug, thiserror::Error)]
pub enum LensError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A panic caught at the binary boundary.
    #[error("internal error: {0}")]
    Panicked(String),
}

impl LensError {
    /// Process exit code. `CODE_FAILURES` stays reserved for failing tests.
    pub fn code(&self) -> i32 {
        let code = match self {
            Self::Config(_) => 2,
            Self::Cache(CacheError::Watcher(_)) => 3,
            Self::Cache(CacheError::Lock(_)) => 4,
            Self::Cache(_) => 5,
            Self::Job(_) => 6,
            Self::Report(_) => 7,
            Self::Protocol(_) => 8,
            Self::Parse(_) => 9,
            Self::Io(_) => 10,
            Self::Panicked(_) => 11,
        };
        debug_assert_ne!(code, CODE_FAILURES);
        code
    }
}

pub type Result<T> = std::result::Result<T, LensError>;
