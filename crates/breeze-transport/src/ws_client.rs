//! WebSocket client transport.
//!
//! One [`WsConnector::connect`] call opens one socket and splits it:
//!
//! ```text
//!            ┌──────────────── socket ────────────────┐
//!            │                                        │
//!   WsFrameSource (read half)              writer task (write half)
//!     │  text/binary → frame                ▲   ▲
//!     │  ping ───────── pong ───────────────┘   │
//!     ▼                                         │
//!   session read loop              ConnectionHandle::send / close
//! ```
//!
//! The connector never retries. Reconnecting is the runtime's job.

use std::fmt;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};
use url::Url;

use breeze_core::{
    Connection, ConnectionHandle, Connector, FrameSource, OUTBOUND_CAPACITY, Outbound,
    TransportError, TransportResult,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Capacity of the reader → writer control channel (pongs).
const CONTROL_CAPACITY: usize = 16;

/// Builds the dial target: `url` with the `access_token` query parameter.
///
/// The token is form-encoded and joins an existing query with `&`, or
/// starts one with `?`. An empty or missing token adds nothing. Fails if
/// `url` is not a `ws://` or `wss://` URL.
pub fn build_url(url: &str, access_token: Option<&str>) -> TransportResult<String> {
    let mut target =
        Url::parse(url).map_err(|e| TransportError::InvalidConfig(format!("{url}: {e}")))?;
    if !matches!(target.scheme(), "ws" | "wss") {
        return Err(TransportError::InvalidConfig(format!(
            "not a WebSocket URL: {url}"
        )));
    }

    if let Some(token) = access_token.filter(|t| !t.is_empty()) {
        target.query_pairs_mut().append_pair("access_token", token);
    }
    Ok(target.into())
}

/// Dials a OneBot forward WebSocket endpoint.
#[derive(Clone)]
pub struct WsConnector {
    url: String,
    access_token: Option<String>,
}

impl WsConnector {
    /// Creates a connector for `url` without credentials.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            access_token: None,
        }
    }

    /// Sets the access token sent as a query parameter.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.access_token = (!token.is_empty()).then_some(token);
        self
    }

    /// The endpoint, without credentials.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Debug for WsConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsConnector")
            .field("url", &self.url)
            .field("access_token", &self.access_token.as_ref().map(|_| "***"))
            .finish()
    }
}

#[async_trait]
impl Connector for WsConnector {
    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn connect(&self) -> TransportResult<Connection> {
        let target = build_url(&self.url, self.access_token.as_deref())?;
        info!(url = %self.url, "Connecting to WebSocket server");

        let (ws_stream, _response) =
            connect_async(target.as_str())
                .await
                .map_err(|e| TransportError::ConnectionFailed {
                    url: self.url.clone(),
                    reason: format!("WebSocket connection failed: {e}"),
                })?;

        info!(url = %self.url, "WebSocket client connected");

        let (ws_tx, ws_rx) = ws_stream.split();
        let (handle, outbound) = ConnectionHandle::channel(OUTBOUND_CAPACITY);
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CAPACITY);

        tokio::spawn(write_loop(ws_tx, outbound, control_rx, self.url.clone()));

        Ok(Connection {
            frames: Box::new(WsFrameSource {
                ws_rx,
                control_tx,
                url: self.url.clone(),
            }),
            handle,
        })
    }
}

/// Owns the write half until the handle closes or the socket fails.
async fn write_loop(
    mut ws_tx: WsSink,
    mut outbound: Outbound,
    mut control_rx: mpsc::Receiver<Message>,
    url: String,
) {
    loop {
        tokio::select! {
            // Check for shutdown
            changed = outbound.shutdown.changed() => {
                if changed.is_err() || *outbound.shutdown.borrow() {
                    debug!(url = %url, "WebSocket writer shutting down");
                    break;
                }
            }

            // Frames queued by handlers
            frame = outbound.frames.recv() => {
                let Some(data) = frame else {
                    break;
                };
                let msg = Message::Text(String::from_utf8_lossy(&data).into_owned().into());
                if let Err(e) = ws_tx.send(msg).await {
                    warn!(url = %url, error = %e, "Failed to send message");
                    break;
                }
            }

            // Control frames from the reader
            Some(msg) = control_rx.recv() => {
                if let Err(e) = ws_tx.send(msg).await {
                    warn!(url = %url, error = %e, "Failed to send control frame");
                    break;
                }
            }
        }
    }

    let _ = ws_tx.close().await;
}

/// The read half of one WebSocket connection.
struct WsFrameSource {
    ws_rx: WsSource,
    control_tx: mpsc::Sender<Message>,
    url: String,
}

#[async_trait]
impl FrameSource for WsFrameSource {
    async fn receive(&mut self) -> TransportResult<String> {
        loop {
            match self.ws_rx.next().await {
                Some(Ok(Message::Text(text))) => {
                    trace!(url = %self.url, len = text.len(), "Received text frame");
                    return Ok(text.as_str().to_owned());
                }
                Some(Ok(Message::Binary(data))) => {
                    trace!(url = %self.url, len = data.len(), "Received binary frame");
                    return Ok(String::from_utf8_lossy(&data).into_owned());
                }
                Some(Ok(Message::Ping(data))) => {
                    trace!(url = %self.url, "Received ping, sending pong");
                    let _ = self.control_tx.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| format!("{} {}", f.code, f.reason.as_str()))
                        .unwrap_or_else(|| "no close frame".to_string());
                    info!(url = %self.url, reason = %reason, "Server closed connection");
                    return Err(TransportError::closed(reason));
                }
                Some(Err(e)) => {
                    warn!(url = %self.url, error = %e, "WebSocket error");
                    return Err(TransportError::closed(e.to_string()));
                }
                None => {
                    info!(url = %self.url, "WebSocket stream ended");
                    return Err(TransportError::closed("stream ended"));
                }
            }
        }
    }
}
