//! Structural errors.
//!
//! Any of these means the file cannot be cached; callers treat them as
//! "unparsable" and leave no artifacts behind.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unterminated {what} starting on line {line}")]
    Unterminated { what: &'static str, line: u32 },

    #[error("unbalanced '{found}' on line {line}")]
    Unbalanced { found: String, line: u32 },

    #[error("unclosed '{open}' opened on line {line}")]
    Unclosed { open: String, line: u32 },

    #[error("{keyword} declaration on line {line} has no name")]
    MissingName { keyword: String, line: u32 },

    #[error("declaration of {name} on line {line} has no body")]
    MissingBody { name: String, line: u32 },
}

impl ParseError {
    /// Line the error was detected on.
    pub fn line(&self) -> u32 {
        match self {
            Self::Unterminated { line, .. }
            | Self::Unbalanced { line, .. }
            | Self::Unclosed { line, .. }
            | Self::MissingName { line, .. }
            | Self::MissingBody { line, .. } => *line,
        }
    }
}
