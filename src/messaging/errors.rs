//! # Messaging Error Types
//!
//! Structured error handling for queue gateway operations using thiserror.
//! Every gateway primitive reports failures through [`MessagingError`]; the
//! lifecycle only needs to know whether a failure is transient
//! (connectivity/authorization class) or not.

use thiserror::Error;

/// Queue gateway error types
#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("Connection error: {message}")]
    Connection { message: String },

    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    #[error("Authorization failed for queue: {queue_name}: {message}")]
    Authorization { queue_name: String, message: String },

    #[error("Network timeout: operation {operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Queue operation failed: {queue_name}: {operation}: {message}")]
    QueueOperation {
        queue_name: String,
        operation: String,
        message: String,
    },

    #[error("Queue not found: {queue_name}")]
    QueueNotFound { queue_name: String },

    #[error("Message not found: {message_id}")]
    MessageNotFound { message_id: String },

    #[error("Message serialization error: {message}")]
    MessageSerialization { message: String },

    #[error("Internal messaging error: {message}")]
    Internal { message: String },
}

impl MessagingError {
    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create an authentication error
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Create an authorization error
    pub fn authorization(queue_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Authorization {
            queue_name: queue_name.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create a queue operation error
    pub fn queue_operation(
        queue_name: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::QueueOperation {
            queue_name: queue_name.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a queue not found error
    pub fn queue_not_found(queue_name: impl Into<String>) -> Self {
        Self::QueueNotFound {
            queue_name: queue_name.into(),
        }
    }

    /// Create a message not found error
    pub fn message_not_found(message_id: impl Into<String>) -> Self {
        Self::MessageNotFound {
            message_id: message_id.into(),
        }
    }

    /// Create a message serialization error
    pub fn message_serialization(message: impl Into<String>) -> Self {
        Self::MessageSerialization {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Connectivity and authorization failures are transient: the broker will
    /// redeliver, and nothing about the message itself is wrong.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::Authentication { .. }
                | Self::Authorization { .. }
                | Self::Timeout { .. }
        )
    }
}

/// Conversion from serde_json::Error to MessagingError
impl From<serde_json::Error> for MessagingError {
    fn from(err: serde_json::Error) -> Self {
        MessagingError::message_serialization(err.to_string())
    }
}

/// Whether an I/O error kind is a connectivity failure worth redelivering for
pub fn is_transient_io_kind(kind: std::io::ErrorKind) -> bool {
    use std::io::ErrorKind;

    matches!(
        kind,
        ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::BrokenPipe
            | ErrorKind::TimedOut
            | ErrorKind::AddrNotAvailable
            | ErrorKind::Interrupted
    )
}

/// Conversion from std::io::Error; only connectivity kinds stay transient
impl From<std::io::Error> for MessagingError {
    fn from(err: std::io::Error) -> Self {
        if is_transient_io_kind(err.kind()) {
            MessagingError::connection(err.to_string())
        } else {
            MessagingError::internal(format!("I/O error ({:?}): {err}", err.kind()))
        }
    }
}

/// Result type alias for messaging operations
pub type MessagingResult<T> = Result<T, MessagingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messaging_error_creation() {
        let conn_err = MessagingError::connection("Connection refused");
        assert!(matches!(conn_err, MessagingError::Connection { .. }));

        let queue_err = MessagingError::queue_operation("orders", "send", "Failed to send");
        assert!(matches!(queue_err, MessagingError::QueueOperation { .. }));

        let timeout_err = MessagingError::timeout("receive", 500);
        assert!(matches!(timeout_err, MessagingError::Timeout { .. }));
    }

    #[test]
    fn test_transient_classification() {
        assert!(MessagingError::connection("reset").is_transient());
        assert!(MessagingError::authentication("bad token").is_transient());
        assert!(MessagingError::authorization("orders", "denied").is_transient());
        assert!(MessagingError::timeout("receive", 100).is_transient());

        assert!(!MessagingError::queue_not_found("orders").is_transient());
        assert!(!MessagingError::message_not_found("42").is_transient());
        assert!(!MessagingError::internal("boom").is_transient());
        assert!(!MessagingError::queue_operation("orders", "dead_letter", "x").is_transient());
    }

    #[test]
    fn test_error_conversions() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let messaging_err: MessagingError = io_err.into();
        assert!(messaging_err.is_transient());

        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let messaging_err: MessagingError = io_err.into();
        assert!(!messaging_err.is_transient());
        assert!(matches!(messaging_err, MessagingError::Internal { .. }));

        let json_err = serde_json::from_str::<serde_json::Value>("{invalid").unwrap_err();
        let messaging_err: MessagingError = json_err.into();
        assert!(matches!(
            messaging_err,
            MessagingError::MessageSerialization { .. }
        ));
    }

    #[test]
    fn test_error_display() {
        let queue_err = MessagingError::queue_operation("my_queue", "abandon", "lock lost");
        let display_str = format!("{queue_err}");
        assert!(display_str.contains("Queue operation failed"));
        assert!(display_str.contains("my_queue"));
        assert!(display_str.contains("abandon"));
        assert!(display_str.contains("lock lost"));
    }
}
