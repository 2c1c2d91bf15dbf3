//! Job response envelope.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, ResponseError};

/// Result envelope a job subprocess writes on stdout as a single JSON line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResponse {
    /// Whether the job succeeded.
    pub ok: bool,
    /// Success payload (present when ok=true).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Error details (present when ok=false).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl JobResponse {
    /// Create a success response.
    pub fn success<T: Serialize>(payload: &T) -> Result<Self, ProtocolError> {
        Ok(Self {
            ok: true,
            payload: Some(serde_json::to_value(payload)?),
            error: None,
        })
    }

    /// Create an error response.
    pub fn error(error: ResponseError) -> Self {
        Self {
            ok: false,
            payload: None,
            error: Some(error),
        }
    }

    /// Serialize to the single line written on stdout.
    pub fn to_line(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Find the envelope in captured stdout.
    ///
    /// The envelope is the last non-empty line; anything printed before it
    /// is ignored.
    pub fn from_output(stdout: &str) -> Result<Self, ProtocolError> {
        let line = stdout
            .lines()
            .map(str::trim)
            .rfind(|line| !line.is_empty())
            .ok_or(ProtocolError::MissingEnvelope)?;
        Ok(serde_json::from_str(line)?)
    }

    /// Convert into the typed payload or the reported error.
    pub fn into_result<T: DeserializeOwned>(self) -> Result<Result<T, ResponseError>, ProtocolError> {
        if self.ok {
            let payload = self.payload.ok_or(ProtocolError::MalformedEnvelope {
                ok: true,
                missing: "payload",
            })?;
            Ok(Ok(serde_json::from_value(payload)?))
        } else {
            let error = self.error.ok_or(ProtocolError::MalformedEnvelope {
                ok: false,
                missing: "error",
            })?;
            Ok(Err(error))
        }
    }
}
