use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Directory not found: {}", .0.display())]
    PathNotFound(PathBuf),

    #[error("Path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    #[error("An indexing pass is already running")]
    Busy,

    #[error("Indexing pass was cancelled")]
    Cancelled,

    #[error("Persisted index is corrupt: {0}")]
    CorruptPersistedIndex(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Why a single file could not be indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexingErrorKind {
    PermissionDenied,
    Decode,
    Io,
}

/// A per-file failure collected during an indexing pass. These never abort
/// the pass; they are reported in the summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexingError {
    pub path: PathBuf,
    pub kind: IndexingErrorKind,
    pub message: String,
}

impl IndexingError {
    pub fn new(path: PathBuf, kind: IndexingErrorKind, message: impl Into<String>) -> Self {
        Self {
            path,
            kind,
            message: message.into(),
        }
    }

    /// Classify an I/O failure for `path`.
    pub fn from_io(path: PathBuf, err: &std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::PermissionDenied => IndexingErrorKind::PermissionDenied,
            std::io::ErrorKind::InvalidData => IndexingErrorKind::Decode,
            _ => IndexingErrorKind::Io,
        };
        Self::new(path, kind, err.to_string())
    }
}
