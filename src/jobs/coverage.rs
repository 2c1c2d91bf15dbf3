//! Coverage job
//!
//! Loads one source file, runs the structural stage and returns the sorted
//! line numbers that start an executable statement.

use std::fs;
use std::path::{Path, PathBuf};

use lens_protocol::{
    decode_payload, encode_payload, CoverageArguments, ErrorCode, JobResponse, ResponseError,
    INTERNAL_COVERAGE_FLAG,
};

use super::{Capabilities, Job, JobCommand, JobError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageJob {
    /// Binary that understands `--internal-coverage`
    executable: PathBuf,
    arguments: CoverageArguments,
}

impl CoverageJob {
    pub fn new(executable: PathBuf, core: PathBuf, cache: PathBuf, file: PathBuf) -> Self {
        Self {
            executable,
            arguments: CoverageArguments {
                core_directory: core,
                cache_directory: cache,
                file_path: file,
            },
        }
    }

    pub fn arguments(&self) -> &CoverageArguments {
        &self.arguments
    }

    pub fn file_path(&self) -> &Path {
        &self.arguments.file_path
    }
}

impl Job for CoverageJob {
    type Output = Vec<u32>;

    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    fn start(&self) -> Result<Vec<u32>, JobError> {
        coverage_lines(&self.arguments.file_path)
    }

    fn command(&self) -> Result<JobCommand, JobError> {
        let payload = encode_payload(&self.arguments)?;
        Ok(JobCommand {
            program: self.executable.clone(),
            args: vec![format!("{}={}", INTERNAL_COVERAGE_FLAG, payload)],
            working_dir: Some(self.arguments.core_directory.clone()),
        })
    }
}

/// Sorted executable lines of the file at `path`.
pub fn coverage_lines(path: &Path) -> Result<Vec<u32>, JobError> {
    let bytes = fs::read(path).map_err(|source| JobError::Source {
        path: path.to_path_buf(),
        source,
    })?;
    let source = String::from_utf8_lossy(&bytes);
    let transformed = lens_php::transform(&source).map_err(|source| JobError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(transformed.executable_lines().into_iter().collect())
}

/// Subprocess side of the coverage job: decode the payload, run the job and
/// build the envelope to print.
pub fn run_internal_coverage(payload: &str) -> JobResponse {
    let arguments: CoverageArguments = match decode_payload(payload) {
        Ok(arguments) => arguments,
        Err(e) => return JobResponse::error(ResponseError::new(ErrorCode::InvalidPayload, e.to_string())),
    };
    tracing::debug!(path = %arguments.file_path.display(), "internal coverage job");

    let lines = match coverage_lines(&arguments.file_path) {
        Ok(lines) => lines,
        Err(e) => {
            let code = match &e {
                JobError::Source { .. } => ErrorCode::SourceUnreadable,
                JobError::Parse { .. } => ErrorCode::Unparsable,
                _ => ErrorCode::Internal,
            };
            return JobResponse::error(ResponseError::new(code, e.to_string()));
        }
    };

    JobResponse::success(&lines).unwrap_or_else(|e| {
        JobResponse::error(ResponseError::new(ErrorCode::Internal, e.to_string()))
    })
}
