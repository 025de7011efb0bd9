//! Error types for the docpipe processing engine.

use thiserror::Error;

use crate::models::{DocumentType, ProcessingState};

/// Result type alias using docpipe's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for docpipe operations.
#[derive(Error, Debug)]
pub enum Error {
    /// No extraction backend registered for a document type. Permanent.
    #[error("Unsupported document type: {0:?}")]
    UnsupportedType(DocumentType),

    /// Backend is currently protected by an open circuit breaker. Retryable;
    /// the breaker already accounted for the underlying failures.
    #[error("Circuit breaker open for backend '{backend}'")]
    CircuitOpen { backend: String },

    /// Extraction call exceeded its per-call timeout. Transient backend failure.
    #[error("Extraction timed out after {timeout_secs}s on backend '{backend}'")]
    ExtractionTimeout { backend: String, timeout_secs: u64 },

    /// Extraction backend reported a failure. Transient.
    #[error("Extraction backend error: {0}")]
    ExtractionBackend(String),

    /// The document itself is unprocessable (corrupt, unsupported encoding).
    /// Permanent regardless of attempt count.
    #[error("Malformed document input: {0}")]
    MalformedInput(String),

    /// Caller violated the processing queue's state machine contract.
    /// Programming error; never converted into an outcome.
    #[error("Invalid state for document {document_id}: cannot {action} while {state:?}")]
    InvalidState {
        document_id: String,
        state: ProcessingState,
        action: &'static str,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Metadata store operation failed
    #[error("Store error: {0}")]
    Store(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this failure is permanent for the document: a retry with the
    /// same content cannot succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Error::UnsupportedType(_) | Error::MalformedInput(_))
    }

    /// Whether this failure is transient and eligible for retry under the
    /// document's attempt budget.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::CircuitOpen { .. }
                | Error::ExtractionTimeout { .. }
                | Error::ExtractionBackend(_)
                | Error::Request(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_unsupported_type() {
        let err = Error::UnsupportedType(DocumentType::Unknown);
        assert_eq!(err.to_string(), "Unsupported document type: Unknown");
    }

    #[test]
    fn test_error_display_circuit_open() {
        let err = Error::CircuitOpen {
            backend: "datalabs".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Circuit breaker open for backend 'datalabs'"
        );
    }

    #[test]
    fn test_error_display_timeout() {
        let err = Error::ExtractionTimeout {
            backend: "datalabs".to_string(),
            timeout_secs: 30,
        };
        assert_eq!(
            err.to_string(),
            "Extraction timed out after 30s on backend 'datalabs'"
        );
    }

    #[test]
    fn test_error_display_invalid_state() {
        let err = Error::InvalidState {
            document_id: "abc123".to_string(),
            state: ProcessingState::InProgress,
            action: "enqueue",
        };
        assert_eq!(
            err.to_string(),
            "Invalid state for document abc123: cannot enqueue while InProgress"
        );
    }

    #[test]
    fn test_permanent_classification() {
        assert!(Error::UnsupportedType(DocumentType::Diagram).is_permanent());
        assert!(Error::MalformedInput("truncated pdf".into()).is_permanent());
        assert!(!Error::ExtractionBackend("http 503".into()).is_permanent());
        assert!(!Error::CircuitOpen {
            backend: "datalabs".into()
        }
        .is_permanent());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::ExtractionBackend("http 503".into()).is_retryable());
        assert!(Error::ExtractionTimeout {
            backend: "datalabs".into(),
            timeout_secs: 30
        }
        .is_retryable());
        assert!(Error::CircuitOpen {
            backend: "datalabs".into()
        }
        .is_retryable());
        assert!(!Error::MalformedInput("bad".into()).is_retryable());
        // Contract violations are neither: they must propagate.
        let invalid = Error::InvalidState {
            document_id: "x".into(),
            state: ProcessingState::Queued,
            action: "record outcome for",
        };
        assert!(!invalid.is_retryable());
        assert!(!invalid.is_permanent());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        assert!(err.to_string().contains("Serialization error:"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
