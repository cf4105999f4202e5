//! Error types for the sync engine library

use std::path::PathBuf;

use csvsync_core::SubmitError;

use crate::target::SyncCondition;

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Failures of one target's pipeline
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Missing file, wrong extension or a file that cannot be opened
    #[error("File access error at '{path}': {message}")]
    FileAccess { path: PathBuf, message: String },

    /// CSV content unreadable in every supported encoding
    #[error("Decode error in '{path}': {message}")]
    Decode { path: PathBuf, message: String },

    /// A required field is missing or empty
    #[error("Integrity error: row {row} has no value for required field '{field}'")]
    Integrity { row: usize, field: String },

    /// Submission to the remote API failed
    #[error("{0}")]
    Submit(#[from] SubmitError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Create a new file access error
    pub fn file_access(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::FileAccess {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new decode error
    pub fn decode(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Decode {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Condition a target ends up in when its pipeline fails with this error.
    ///
    /// A file that exists but cannot be read or decoded is reported like a
    /// missing one.
    pub fn condition(&self) -> SyncCondition {
        match self {
            SyncError::FileAccess { .. } | SyncError::Decode { .. } | SyncError::Io(_) => {
                SyncCondition::FileNotFound
            }
            SyncError::Integrity { .. } => SyncCondition::InvalidIntegrity,
            SyncError::Submit(error) => SyncCondition::RequestError(error.kind),
        }
    }
}
