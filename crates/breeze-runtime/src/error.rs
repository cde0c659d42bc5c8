//! Runtime error types.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can stop the runtime from starting.
///
/// Once running, connection failures are logged and retried, never
/// returned.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No connector was given and none can be built from configuration.
    #[error("No connector configured (enable the ws-client feature or supply one)")]
    NoConnector,

    /// Installing a signal handler failed.
    #[error("Failed to listen for shutdown signals: {0}")]
    Signal(String),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
