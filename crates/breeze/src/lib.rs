//! # Breeze
//!
//! A OneBot v11 client for NapCat-style gateways.
//!
//! ## Architecture
//!
//! ```text
//! gateway ──frames──▶ session read loop ──put──▶ queue ──get──▶ worker ──▶ dispatcher
//!    ▲                       │                                                │
//!    │                 reconnect forever                                      ├──▶ handlers (in order)
//!    └──── Bot (send / call) ◀────────────────────────────────────────────────┴──▶ liveness
//! ```
//!
//! - **Runtime**: keeps one connection alive, reconnecting after a fixed delay
//! - **Session**: reads frames and queues them without ever waiting on handlers
//! - **Dispatcher**: decodes, routes, and runs handlers in registration order
//! - **Handlers**: user code; failures are contained and reported in chat
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use breeze::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let ping = handler_fn("ping", |bot, event| async move {
//!         if let Some(msg) = event.as_message()
//!             && msg.raw_message == "/ping"
//!         {
//!             bot.reply(msg, "pong").await?;
//!         }
//!         Ok(())
//!     });
//!
//!     Runtime::builder().handler(ping).build()?.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `ws-client` (default): WebSocket connector built from `[connection]`
//! - `toml-config` (default) / `yaml-config`: configuration file formats
//! - `json-log`: JSON log output

pub use breeze_core as core;
pub use breeze_runtime as runtime;
pub use breeze_transport as transport;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use breeze::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use breeze_runtime::{BreezeConfig, Runtime, RuntimeBuilder};

    // Handlers and what they receive
    pub use breeze_core::{
        Bot, ChatTarget, Event, EventKind, Handler, HandlerError, HandlerRegistry, HandlerResult,
        MessageEvent, MessageType, Route, async_trait, handler_fn,
    };

    // Per-group switches
    pub use breeze_core::{JsonFileSwitchStore, MemorySwitchStore, SwitchCommand, Switched};

    // Status notifications
    pub use breeze_core::{LogNotifier, Notifier};
}
