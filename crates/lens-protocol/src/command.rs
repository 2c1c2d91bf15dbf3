//! Command payload codec.
//!
//! A job's parameter tuple travels to its subprocess as the value of a single
//! flag. Encoding is serialize (JSON) → raw DEFLATE at maximum level →
//! standard padded base64. Decoding reverses the four steps.

use std::io::{Read, Write};
use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::INTERNAL_COVERAGE_FLAG;

/// Parameters of a coverage job, serialized as `[core, cache, file]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(PathBuf, PathBuf, PathBuf)", into = "(PathBuf, PathBuf, PathBuf)")]
pub struct CoverageArguments {
    /// Install root of the tool itself.
    pub core_directory: PathBuf,
    /// Active cache root.
    pub cache_directory: PathBuf,
    /// Source file whose executable lines are wanted.
    pub file_path: PathBuf,
}

impl From<(PathBuf, PathBuf, PathBuf)> for CoverageArguments {
    fn from((core_directory, cache_directory, file_path): (PathBuf, PathBuf, PathBuf)) -> Self {
        Self {
            core_directory,
            cache_directory,
            file_path,
        }
    }
}

impl From<CoverageArguments> for (PathBuf, PathBuf, PathBuf) {
    fn from(args: CoverageArguments) -> Self {
        (args.core_directory, args.cache_directory, args.file_path)
    }
}

/// Encode a parameter tuple into a flag payload.
pub fn encode_payload<T: Serialize>(arguments: &T) -> Result<String, ProtocolError> {
    let serialized = serde_json::to_vec(arguments)?;

    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(&serialized)?;
    let compressed = encoder.finish()?;

    Ok(STANDARD.encode(compressed))
}

/// Decode a flag payload back into its parameter tuple.
pub fn decode_payload<T: DeserializeOwned>(payload: &str) -> Result<T, ProtocolError> {
    let payload = payload.trim();
    if payload.is_empty() {
        return Err(ProtocolError::EmptyPayload);
    }

    let compressed = STANDARD.decode(payload)?;

    let mut serialized = Vec::new();
    DeflateDecoder::new(compressed.as_slice()).read_to_end(&mut serialized)?;

    Ok(serde_json::from_slice(&serialized)?)
}

/// Extract the payload from a `--internal-coverage=<payload>` argument.
pub fn split_flag(argument: &str) -> Option<&str> {
    argument
        .strip_prefix(INTERNAL_COVERAGE_FLAG)
        .and_then(|rest| rest.strip_prefix('='))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CoverageArguments {
        CoverageArguments {
            core_directory: PathBuf::from("/opt/lens"),
            cache_directory: PathBuf::from("/tmp/project/.lens/cache"),
            file_path: PathBuf::from("/tmp/project/src/Foo.php"),
        }
    }

    #[test]
    fn test_arguments_serialize_as_ordered_array() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert_eq!(
            json,
            r#"["/opt/lens","/tmp/project/.lens/cache","/tmp/project/src/Foo.php"]"#
        );
    }

    #[test]
    fn test_payload_round_trip() {
        let encoded = encode_payload(&sample()).unwrap();
        let decoded: CoverageArguments = decode_payload(&encoded).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn test_payload_round_trip_unicode_and_spaces() {
        let args = CoverageArguments {
            core_directory: PathBuf::from("/opt/my lens"),
            cache_directory: PathBuf::from("/tmp/caché"),
            file_path: PathBuf::from("/src/Ünïcode Fïle.php"),
        };
        let encoded = encode_payload(&args).unwrap();
        let decoded: CoverageArguments = decode_payload(&encoded).unwrap();
        assert_eq!(decoded, args);
    }

    #[test]
    fn test_payload_is_plain_base64() {
        let encoded = encode_payload(&sample()).unwrap();
        assert!(encoded
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '='));
    }

    #[test]
    fn test_payload_layers_decode_by_hand() {
        let encoded = encode_payload(&sample()).unwrap();
        let compressed = STANDARD.decode(&encoded).unwrap();
        let mut raw = String::new();
        DeflateDecoder::new(compressed.as_slice())
            .read_to_string(&mut raw)
            .unwrap();
        assert!(raw.starts_with("[\"/opt/lens\""));
    }

    #[test]
    fn test_decode_rejects_empty() {
        let result: Result<CoverageArguments, _> = decode_payload("  ");
        assert!(matches!(result, Err(ProtocolError::EmptyPayload)));
    }

    #[test]
    fn test_decode_rejects_bad_base64() {
        let result: Result<CoverageArguments, _> = decode_payload("not*base64");
        assert!(matches!(result, Err(ProtocolError::Base64(_))));
    }

    #[test]
    fn test_decode_rejects_non_deflate_bytes() {
        let payload = STANDARD.encode(b"\xff\xff\xff\xff");
        let result: Result<CoverageArguments, _> = decode_payload(&payload);
        assert!(result.is_err());
    }

    #[test]
    fn test_split_flag() {
        assert_eq!(split_flag("--internal-coverage=abc="), Some("abc="));
        assert_eq!(split_flag("--internal-coverage"), None);
        assert_eq!(split_flag("--internal-coveragex=abc"), None);
        assert_eq!(split_flag("--other=abc"), None);
    }
}
