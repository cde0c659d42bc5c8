//! Error types shared by the Breeze core.
//!
//! Each layer owns one error enum. Transport errors end the current
//! connection, decode errors drop a single frame, and handler errors are
//! contained to the handler that produced them.

use thiserror::Error;

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors that can occur in transport operations.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {url} - {reason}")]
    ConnectionFailed {
        /// The URL that failed to connect.
        url: String,
        /// Reason for failure.
        reason: String,
    },

    /// Connection closed.
    #[error("connection closed: {reason}")]
    ConnectionClosed {
        /// Reason for closure.
        reason: String,
    },

    /// Message send failed.
    #[error("failed to send message: {0}")]
    SendFailed(String),

    /// Invalid configuration.
    #[error("invalid transport configuration: {0}")]
    InvalidConfig(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl TransportError {
    /// Creates a `ConnectionClosed` error with the given reason.
    pub fn closed(reason: impl Into<String>) -> Self {
        Self::ConnectionClosed {
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// =============================================================================
// Decode Errors
// =============================================================================

/// Errors produced while turning a raw frame into an [`Event`](crate::Event).
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// The frame is not valid JSON.
    #[error("invalid JSON payload: {0}")]
    InvalidJson(String),

    /// The frame is JSON but carries neither `post_type` nor `status`.
    #[error("payload has neither post_type nor status")]
    Unclassified,

    /// The frame names a `post_type` this client does not know.
    #[error("unknown post_type '{0}'")]
    UnknownPostType(String),

    /// The frame has a known type but its fields do not fit.
    #[error("malformed {kind} payload: {reason}")]
    InvalidShape {
        /// Which kind of payload was being decoded.
        kind: &'static str,
        /// Reason for failure.
        reason: String,
    },
}

// =============================================================================
// API Errors
// =============================================================================

/// Error type for outbound API calls.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The connection is gone.
    #[error("bot is not connected")]
    NotConnected,
    /// No response arrived in time.
    #[error("API call timed out")]
    Timeout,
    /// The gateway answered with a failed status.
    #[error("API error ({retcode}): {message}")]
    Failed { retcode: i64, message: String },
    /// Failed to serialize/deserialize.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Transport error.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// =============================================================================
// Handler Errors
// =============================================================================

/// Error returned by a [`Handler`](crate::Handler).
///
/// The dispatcher logs it together with the handler name and, for chat
/// messages, posts a short diagnostic back to the originating chat.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// An outbound call made by the handler failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The handler reported a failure of its own.
    #[error("{0}")]
    Failed(String),

    /// Any other error bubbled up from handler code.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    /// Creates a `Failed` error with the given message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Api(err.into())
    }
}

impl From<SwitchError> for HandlerError {
    fn from(err: SwitchError) -> Self {
        Self::Other(Box::new(err))
    }
}

// =============================================================================
// Notification and Switch Errors
// =============================================================================

/// Error from an operator notification channel.
#[derive(Debug, Clone, Error)]
pub enum NotifyError {
    /// The channel rejected or could not deliver the notification.
    #[error("notifier '{channel}' failed: {reason}")]
    Delivery { channel: String, reason: String },

    /// Delivery over the bot connection failed.
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Error from a [`SwitchStore`](crate::SwitchStore) backend.
#[derive(Debug, Clone, Error)]
pub enum SwitchError {
    /// Reading or writing the backing file failed.
    #[error("switch store I/O error: {0}")]
    Io(String),

    /// The backing file holds something that is not a switch table.
    #[error("switch store is corrupt: {0}")]
    Corrupt(String),
}

impl From<std::io::Error> for SwitchError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for frame decoding.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Result type for API calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type returned by handlers.
pub type HandlerResult = Result<(), HandlerError>;

/// Result type for notifier delivery.
pub type NotifyResult = Result<(), NotifyError>;

/// Result type for switch store operations.
pub type SwitchResult<T> = Result<T, SwitchError>;
