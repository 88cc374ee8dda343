//! Error types for stream operations

use crate::error::AppError;

/// Result type for stream operations
pub type StreamResult<T> = std::result::Result<T, StreamError>;

/// Errors that can occur while talking to the log store
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Connection or liveness check failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Append to a stream failed
    #[error("Publish failed: {0}")]
    PublishFailed(String),

    /// Group read failed
    #[error("Consume failed: {0}")]
    ConsumeFailed(String),

    /// Any other store command failed
    #[error("Store command failed: {0}")]
    Command(String),

    /// Payload could not be encoded
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Entry fields could not be decoded into a message
    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    /// Typed payload requested for a message of another event type
    #[error("Event type mismatch: expected '{expected}', found '{found}'")]
    EventTypeMismatch { expected: String, found: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Client was shut down
    #[error("Stream client is closed")]
    Closed,
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::SerializationError(err.to_string())
    }
}

impl From<redis::RedisError> for StreamError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
            StreamError::ConnectionFailed(err.to_string())
        } else {
            StreamError::Command(err.to_string())
        }
    }
}

impl From<StreamError> for AppError {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::ConfigurationError(msg) => AppError::Configuration(msg),
            StreamError::ConnectionFailed(msg) => AppError::Network(msg),
            StreamError::SerializationError(msg) | StreamError::InvalidMessage(msg) => {
                AppError::Serialization(msg)
            }
            _ => AppError::Internal(err.to_string()),
        }
    }
}
