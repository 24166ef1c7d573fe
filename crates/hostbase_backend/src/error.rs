//! Error types for backend operations.

use hostbase_object::ObjectError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors that can occur during backend operations.
#[derive(Debug, Error)]
pub enum BackendError {
    /// An update or rename addressed a record that does not exist.
    #[error("{object_class} '{ident}' not found")]
    MissingObject {
        /// Class of the missing record.
        object_class: String,
        /// Rendered ident of the missing record.
        ident: String,
    },

    /// The object itself is malformed.
    #[error("object error: {0}")]
    Object(#[from] ObjectError),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A JSON document could not be read or written.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Another process holds the backend file.
    #[error("backend file is locked: {}", path.display())]
    Locked {
        /// The locked data file.
        path: PathBuf,
    },

    /// The backend does not implement the operation.
    #[error("operation not supported: {operation}")]
    NotSupported {
        /// The rejected operation.
        operation: String,
    },

    /// No software license is free for the requested reservation.
    #[error("no free software license for product '{product_id}' on client '{client_id}'")]
    NoFreeLicense {
        /// The product needing a license.
        product_id: String,
        /// The client asking for it.
        client_id: String,
    },

    /// Credential encryption or decryption failed.
    #[error("credential cipher error: {0}")]
    Crypto(String),

    /// A remote service reported an error.
    #[error("remote error: {0}")]
    Remote(String),

    /// A call could not be routed to a service.
    #[error("routing error: {0}")]
    Routing(String),
}

impl BackendError {
    /// Creates a missing-object error.
    pub fn missing_object(object_class: impl Into<String>, ident: impl Into<String>) -> Self {
        Self::MissingObject {
            object_class: object_class.into(),
            ident: ident.into(),
        }
    }

    /// Creates a not-supported error.
    pub fn not_supported(operation: impl Into<String>) -> Self {
        Self::NotSupported {
            operation: operation.into(),
        }
    }
}
