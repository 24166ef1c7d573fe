//! Error types for the multiplex backend.

use hostbase_backend::BackendError;
use hostbase_object::ObjectError;
use thiserror::Error;

/// Result type for multiplex operations.
pub type MultiplexResult<T> = Result<T, MultiplexError>;

/// Errors that can occur while multiplexing backend services.
#[derive(Error, Debug)]
pub enum MultiplexError {
    /// The multiplexer is misconfigured.
    #[error("configuration error: {0}")]
    Config(String),

    /// The module license does not allow multiplexing.
    #[error("multiplex module not licensed: {0}")]
    License(String),

    /// The named method is unknown to every service.
    #[error("no service implements method {0}")]
    NoServiceImplements(String),

    /// No service holds the license pool.
    #[error("no service holds license pool '{0}'")]
    NoServiceForPool(String),

    /// No service holds both the license pool and the client.
    #[error("license pool '{pool_id}' and client '{client_id}' are not on the same service")]
    PoolClientMismatch {
        /// The requested pool.
        pool_id: String,
        /// The requested client.
        client_id: String,
    },

    /// No service serves the depot.
    #[error("no service serves depot '{0}'")]
    NoServiceForDepot(String),

    /// The client is neither staged nor known to any service.
    #[error("client '{0}' is unknown to every service")]
    UnknownClient(String),

    /// The operation is deliberately unsupported.
    #[error("multiplex backend does not support {0}")]
    NotSupported(String),

    /// A service was used before it connected.
    #[error("service {0} is not connected")]
    NotConnected(String),

    /// A client could not be moved between services.
    #[error("relocation of client '{client_id}' failed: {reason}")]
    RelocationFailed {
        /// The client being moved.
        client_id: String,
        /// What went wrong.
        reason: String,
    },

    /// Named-call parameters do not fit the method.
    #[error("bad parameters for {method}: {reason}")]
    BadCall {
        /// The called method.
        method: String,
        /// What is wrong with the parameters.
        reason: String,
    },

    /// A service backend reported an error.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// An object was malformed.
    #[error("object error: {0}")]
    Object(#[from] ObjectError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MultiplexError {
    /// Creates a bad-call error.
    pub fn bad_call(method: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BadCall {
            method: method.into(),
            reason: reason.into(),
        }
    }

    /// Returns true for errors caused by the caller or the configuration
    /// rather than by a service.
    pub fn is_routing_error(&self) -> bool {
        matches!(
            self,
            MultiplexError::NoServiceImplements(_)
                | MultiplexError::NoServiceForPool(_)
                | MultiplexError::PoolClientMismatch { .. }
                | MultiplexError::NoServiceForDepot(_)
                | MultiplexError::UnknownClient(_)
                | MultiplexError::NotSupported(_)
        )
    }
}

impl From<MultiplexError> for BackendError {
    fn from(error: MultiplexError) -> Self {
        match error {
            MultiplexError::Backend(inner) => inner,
            MultiplexError::Object(inner) => BackendError::Object(inner),
            MultiplexError::Io(inner) => BackendError::Io(inner),
            MultiplexError::NotSupported(operation) => BackendError::not_supported(operation),
            other => BackendError::Routing(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(MultiplexError::NoServiceForPool("p".into()).is_routing_error());
        assert!(!MultiplexError::License("expired".into()).is_routing_error());
        assert!(!MultiplexError::Backend(BackendError::Remote("down".into())).is_routing_error());
    }

    #[test]
    fn error_display() {
        let err = MultiplexError::PoolClientMismatch {
            pool_id: "pool-office".into(),
            client_id: "c1.example.org".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("pool-office"));
        assert!(msg.contains("c1.example.org"));
        assert_eq!(
            MultiplexError::NoServiceImplements("foo_bar".into()).to_string(),
            "no service implements method foo_bar"
        );
    }

    #[test]
    fn converts_into_backend_errors() {
        let routed: BackendError = MultiplexError::UnknownClient("c".into()).into();
        assert!(matches!(routed, BackendError::Routing(_)));

        let unsupported: BackendError = MultiplexError::NotSupported("renaming".into()).into();
        assert!(matches!(unsupported, BackendError::NotSupported { .. }));

        let inner: BackendError = MultiplexError::Backend(BackendError::Remote("x".into())).into();
        assert!(matches!(inner, BackendError::Remote(_)));
    }
}
