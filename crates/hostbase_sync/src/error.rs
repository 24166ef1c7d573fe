//! Error types for replication and cache synchronization.

use hostbase_backend::BackendError;
use hostbase_object::ObjectError;
use std::io;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during replication or cache synchronization.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A required collaborator was not supplied at construction.
    #[error("{name} undefined")]
    MissingCollaborator {
        /// Which collaborator is missing.
        name: &'static str,
    },

    /// A backend call failed.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// An object could not be built.
    #[error("object error: {0}")]
    Object(#[from] ObjectError),

    /// A cache file could not be written.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A JSON cache file could not be written.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Creates a missing-collaborator error.
    pub fn missing(name: &'static str) -> Self {
        Self::MissingCollaborator { name }
    }

    /// Returns true for errors raised while building a component.
    pub fn is_configuration(&self) -> bool {
        matches!(self, SyncError::MissingCollaborator { .. })
    }
}

impl From<SyncError> for BackendError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Backend(inner) => inner,
            SyncError::Object(inner) => BackendError::Object(inner),
            SyncError::Io(inner) => BackendError::Io(inner),
            SyncError::Json(inner) => BackendError::Json(inner),
            other => BackendError::Remote(other.to_string()),
        }
    }
}
