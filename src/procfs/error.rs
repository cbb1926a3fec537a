//! Error types for reading kernel pseudo-files.
//!
//! [`Error`] classifies failures the way callers act on them:
//!
//! - [`Error::UnavailableSource`]: the file is missing or not readable. The metric is
//!   unsupported on this host; the caller reports an empty value and carries on.
//! - [`Error::Io`]: an unexpected read failure in the middle of a stream.
//! - [`Error::Malformed`]: the content is structurally undecodable.
//!
//! [`StatParseError`] reports field-level failures of the key/value parsers and travels
//! inside [`std::io::Error`] of kind [`std::io::ErrorKind::InvalidData`].

use std::io;
use std::num::{ParseFloatError, ParseIntError};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::fsutil::FileOpenError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("source `{path}` is unavailable: {source}")]
    UnavailableSource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed content in `{path}`: {reason}")]
    Malformed { path: PathBuf, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Classifies an I/O error raised while reading `path`.
    ///
    /// Missing or permission-denied files are unavailable sources; `InvalidData` carries
    /// a parse failure and becomes [`Error::Malformed`]; anything else is an I/O failure.
    pub fn from_io(path: impl AsRef<Path>, source: io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        match source.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                Error::UnavailableSource { path, source }
            }
            io::ErrorKind::InvalidData => Error::Malformed {
                path,
                reason: source.to_string(),
            },
            _ => Error::Io { path, source },
        }
    }

    pub fn malformed(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Error::Malformed {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Returns `true` if the source does not exist on this host.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Error::UnavailableSource { .. })
    }
}

impl From<FileOpenError> for Error {
    fn from(err: FileOpenError) -> Self {
        Error::from_io(err.path, err.source)
    }
}

#[derive(Debug, Error)]
pub enum StatParseError {
    #[error("duplicate field '{field}' at line {line}")]
    DuplicateField { field: String, line: usize },

    #[error("invalid value for '{key}' at line {line}: '{value}': {source}")]
    InvalidKeyValue {
        key: String,
        value: String,
        line: usize,
        #[source]
        source: ParseIntError,
    },

    #[error("invalid value at line {line}: '{value}': {source}")]
    InvalidValue {
        value: String,
        line: usize,
        #[source]
        source: ParseIntError,
    },

    #[error("invalid decimal at line {line}: '{value}': {source}")]
    InvalidDecimal {
        value: String,
        line: usize,
        #[source]
        source: ParseFloatError,
    },

    #[error("missing value at line {line}")]
    MissingValue { line: usize },

    #[error("error during I/O: {0}")]
    Io(#[from] io::Error),
}

impl From<StatParseError> for io::Error {
    fn from(err: StatParseError) -> Self {
        match err {
            StatParseError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

/// Extracts a `StatParseError` from an `std::io::Error` assuming it was wrapped.
///
/// Panics if the inner error is not a `StatParseError`. Intended for use in test assertions only.
#[cfg(test)]
pub(crate) fn extract_stat_parse_error(err: &io::Error) -> &StatParseError {
    err.get_ref()
        .and_then(|e| e.downcast_ref::<StatParseError>())
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let missing = Error::from_io("/proc/net/tcp6", io::Error::from(io::ErrorKind::NotFound));
        assert!(missing.is_unavailable());

        let denied = Error::from_io("/proc/1/fd", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(denied.is_unavailable());

        let broken = Error::from_io("/proc/stat", io::Error::from(io::ErrorKind::Interrupted));
        assert!(matches!(broken, Error::Io { .. }));

        let parse: io::Error = StatParseError::MissingValue { line: 3 }.into();
        let malformed = Error::from_io("/proc/loadavg", parse);
        match malformed {
            Error::Malformed { path, reason } => {
                assert_eq!(path, PathBuf::from("/proc/loadavg"));
                assert_eq!(reason, "missing value at line 3");
            }
            other => panic!("expected Malformed, got {other:?}"),
        }
    }
}
