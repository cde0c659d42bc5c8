//! # Breeze Transport
//!
//! Network transport implementations for the Breeze OneBot client.
//!
//! This crate implements the [`Connector`](breeze_core::Connector) contract
//! from `breeze-core`. It supports transport types through feature flags.
//!
//! ## Features
//!
//! - `ws-client` (default): forward WebSocket client ([`WsConnector`])
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  breeze-runtime     │  (reconnect loop, worker)
//! ├─────────────────────┤
//! │  breeze-core        │  (Connector / FrameSource contract)
//! ├─────────────────────┤
//! │  breeze-transport   │  <- This crate (implementations)
//! ├─────────────────────┤
//! │  Network (TCP/TLS)  │
//! └─────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use breeze_core::Connector;
//! use breeze_transport::WsConnector;
//!
//! let connector = WsConnector::new("ws://127.0.0.1:3001").with_access_token("secret");
//! let mut connection = connector.connect().await?;
//! let frame = connection.frames.receive().await?;
//! ```

// Transport implementations (feature-gated)
#[cfg(feature = "ws-client")]
pub mod ws_client;

#[cfg(feature = "ws-client")]
pub use ws_client::{WsConnector, build_url};
