//! Lens analysis core
//!
//! Incremental analysis cache and job execution for the Lens PHP test
//! runner: change detection over a source tree, generated live/mock
//! artifacts kept consistent through a per-file index, jobs that run
//! in-process or in a subprocess, and report dispatch.

pub mod cache;
pub mod config;
pub mod error;
pub mod jobs;
pub mod reports;
pub mod watcher;

pub use cache::{CacheLayout, Cacher, UpdateSummary};
pub use config::EffectiveConfig;
pub use error::{LensError, Result};
pub use jobs::{CoverageJob, Dispatcher, ExecutionMode, Job, JobId};
pub use reports::{ReportsBuilder, CODE_FAILURES};
pub use watcher::{ChangeTree, Watcher};
