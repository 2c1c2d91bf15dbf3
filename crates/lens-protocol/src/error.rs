//! Error types for the job protocol.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;

/// Errors raised while encoding or decoding protocol data.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("compression error: {0}")]
    Compression(#[from] io::Error),

    #[error("payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("payload is empty")]
    EmptyPayload,

    #[error("no response envelope in job output")]
    MissingEnvelope,

    #[error("response envelope has ok={ok} but no {missing}")]
    MalformedEnvelope { ok: bool, missing: &'static str },
}

/// Error codes carried in failed job responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The command payload could not be decoded.
    InvalidPayload,
    /// The job's target file could not be read.
    SourceUnreadable,
    /// The job's target file could not be structured.
    Unparsable,
    /// Any other failure inside the job.
    Internal,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPayload => write!(f, "INVALID_PAYLOAD"),
            Self::SourceUnreadable => write!(f, "SOURCE_UNREADABLE"),
            Self::Unparsable => write!(f, "UNPARSABLE"),
            Self::Internal => write!(f, "INTERNAL"),
        }
    }
}

/// Error payload of a failed job response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: ErrorCode,
    /// Single-line, human-readable message.
    pub message: String,
}

impl ResponseError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}
