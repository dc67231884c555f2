//! Errors which can stop a run, and per-file OCR failures which can't.

use std::io;

use crate::prelude::*;

/// An error which prevents a run from starting, or aborts it part way.
///
/// Per-file OCR problems are *not* represented here. See [`OcrFailure`].
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The user asked for something we can't do. Reported before any work
    /// starts.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// We couldn't read the input tree or create part of the output tree.
    #[error("filesystem error at {path:?}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl RunError {
    /// Construct a [`RunError::Filesystem`] for `path`.
    pub fn filesystem(path: impl Into<PathBuf>, source: io::Error) -> Self {
        RunError::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Construct a [`RunError::Filesystem`] which has no underlying I/O
    /// error, only a message.
    pub fn filesystem_msg(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::filesystem(path, io::Error::other(msg.into()))
    }
}

/// A single file which could not be OCRed. These are logged and collected,
/// but they never stop a batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("OCR failed for {path:?}: {cause}")]
pub struct OcrFailure {
    /// The input file.
    pub path: PathBuf,
    /// A human-readable description of what went wrong.
    pub cause: String,
}

impl OcrFailure {
    /// Create a new failure record.
    pub fn new(path: impl Into<PathBuf>, cause: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            cause: cause.into(),
        }
    }
}
