//! Lens Protocol Types
//!
//! Defines the process-boundary protocol between a job dispatcher and the
//! subprocess that runs a job: how job parameters travel on the command line
//! and how the result comes back on stdout.

pub mod command;
pub mod error;
pub mod response;

pub use command::{decode_payload, encode_payload, split_flag, CoverageArguments};
pub use error::{ErrorCode, ProtocolError, ResponseError};
pub use response::JobResponse;

/// Name of the flag carrying a coverage job payload.
pub const INTERNAL_COVERAGE_FLAG: &str = "--internal-coverage";
