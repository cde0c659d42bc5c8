//! Transport contract.
//!
//! The runtime only needs three things from a transport: a way to open a
//! connection ([`Connector`]), a way to read frames from it
//! ([`FrameSource`]), and a send-only handle that handlers can hold
//! ([`ConnectionHandle`]).
//!
//! ```text
//! Connector::connect()
//!     └── Connection
//!         ├── frames: Box<dyn FrameSource>  ── owned by the session read loop
//!         └── handle: ConnectionHandle      ── cloned into every Bot
//!                  │
//!                  └── mpsc ──▶ transport writer ──▶ socket
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, watch};

use crate::error::{TransportError, TransportResult};

/// Capacity of the outbound frame channel.
pub const OUTBOUND_CAPACITY: usize = 256;

// =============================================================================
// Connector / FrameSource
// =============================================================================

/// Reads inbound text frames from one open connection.
#[async_trait]
pub trait FrameSource: Send {
    /// Waits for the next text frame.
    ///
    /// Returns [`TransportError::ConnectionClosed`] once the peer closes,
    /// the stream ends, or the socket fails. After that the connection is
    /// finished and the caller should reconnect.
    async fn receive(&mut self) -> TransportResult<String>;
}

/// Opens connections to the gateway.
#[async_trait]
pub trait Connector: Send + Sync {
    /// The endpoint this connector dials, for logging. Must not include
    /// credentials.
    fn endpoint(&self) -> &str;

    /// Opens a new connection.
    async fn connect(&self) -> TransportResult<Connection>;
}

/// An open connection split into its read and write halves.
pub struct Connection {
    /// Inbound frames.
    pub frames: Box<dyn FrameSource>,
    /// Outbound handle.
    pub handle: ConnectionHandle,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// ConnectionHandle
// =============================================================================

/// Send-only handle to a connection.
///
/// Cheap to clone. All clones observe the same open/closed state.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    /// Sender for outgoing frames.
    message_tx: mpsc::Sender<Vec<u8>>,
    /// Shutdown signal sender.
    shutdown_tx: Arc<watch::Sender<bool>>,
}

/// The transport side of a [`ConnectionHandle`].
#[derive(Debug)]
pub struct Outbound {
    /// Frames queued by handlers, in send order.
    pub frames: mpsc::Receiver<Vec<u8>>,
    /// Flips to `true` when the handle is closed.
    pub shutdown: watch::Receiver<bool>,
}

impl ConnectionHandle {
    /// Creates a new connection handle.
    pub fn new(message_tx: mpsc::Sender<Vec<u8>>, shutdown_tx: watch::Sender<bool>) -> Self {
        Self {
            message_tx,
            shutdown_tx: Arc::new(shutdown_tx),
        }
    }

    /// Creates a handle together with the receiving ends a transport drains.
    pub fn channel(capacity: usize) -> (Self, Outbound) {
        let (message_tx, frames) = mpsc::channel(capacity);
        let (shutdown_tx, shutdown) = watch::channel(false);
        (
            Self::new(message_tx, shutdown_tx),
            Outbound { frames, shutdown },
        )
    }

    /// Whether frames can still be sent.
    pub fn is_open(&self) -> bool {
        !*self.shutdown_tx.borrow() && !self.message_tx.is_closed()
    }

    /// Sends a frame through this connection.
    pub async fn send(&self, data: Vec<u8>) -> TransportResult<()> {
        if !self.is_open() {
            return Err(TransportError::SendFailed("connection is not open".into()));
        }
        self.message_tx
            .send(data)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    /// Sends a JSON frame.
    pub async fn send_json(&self, value: &Value) -> TransportResult<()> {
        let data = serde_json::to_vec(value)
            .map_err(|e| TransportError::SendFailed(format!("JSON serialization failed: {e}")))?;
        self.send(data).await
    }

    /// Closes this connection. Calling it again has no effect.
    pub fn close(&self) {
        self.shutdown_tx.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_send_json_reaches_outbound() {
        let (handle, mut outbound) = ConnectionHandle::channel(4);
        handle.send_json(&json!({"action": "noop"})).await.unwrap();

        let frame = outbound.frames.recv().await.unwrap();
        let value: Value = serde_json::from_slice(&frame).unwrap();
        assert_eq!(value["action"], "noop");
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_blocks_sends() {
        let (handle, outbound) = ConnectionHandle::channel(4);
        assert!(handle.is_open());

        handle.close();
        handle.close();

        assert!(!handle.is_open());
        assert!(*outbound.shutdown.borrow());
        let err = handle.send(b"x".to_vec()).await.unwrap_err();
        assert!(matches!(err, TransportError::SendFailed(_)));
    }

    #[tokio::test]
    async fn test_dropped_transport_closes_handle() {
        let (handle, outbound) = ConnectionHandle::channel(4);
        drop(outbound);
        assert!(!handle.is_open());
    }
}
