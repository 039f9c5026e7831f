//! Errors raised while reading taxonomy dump files.

use thiserror::Error;

/// A failure to turn a dump line into a typed record.
///
/// Every variant that comes from a specific line carries the file label,
/// the 1-based line number and the raw line so the operator can find it.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("{file}:{line}: {reason}: {content:?}")]
    Malformed {
        file: String,
        line: u64,
        reason: String,
        content: String,
    },

    #[error("{file}:{line}: field '{field}' is not an integer ({value:?}): {content:?}")]
    InvalidInteger {
        file: String,
        line: u64,
        field: &'static str,
        value: String,
        content: String,
    },

    #[error("I/O error while reading {file}: {source}")]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },
}

impl ParseError {
    /// The 1-based line number, if the error belongs to a line.
    pub fn line(&self) -> Option<u64> {
        match self {
            ParseError::Malformed { line, .. } | ParseError::InvalidInteger { line, .. } => {
                Some(*line)
            }
            ParseError::Io { .. } => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ParseError>;
