//! # Breeze Core
//!
//! The ingestion and dispatch core of the Breeze OneBot v11 client.
//!
//! This crate knows nothing about sockets: it decodes frames that a
//! transport hands it, routes them to handlers, and sends commands back
//! through a [`ConnectionHandle`].
//!
//! ## Pieces
//!
//! - **Events**: raw frame → typed [`Event`] ([`Event::decode`])
//! - **Bot**: outbound commands and echo-matched calls ([`Bot`])
//! - **Handlers**: feature modules in an ordered [`HandlerRegistry`]
//! - **Dispatcher**: per-handler isolation and routing ([`Dispatcher`])
//! - **Liveness**: heartbeat-driven presence tracking ([`LivenessMonitor`])
//! - **Tasks**: background work swept for failures ([`TaskTracker`])
//! - **Switches**: per-chat module switches ([`SwitchStore`])
//! - **Notifiers**: operator notification channels ([`Notifier`])
//!
//! ## Data flow
//!
//! ```text
//! ┌───────────┐  frame   ┌────────────┐   Event   ┌────────────┐
//! │ transport │────────▶ │ Dispatcher │─────────▶ │  Handler   │
//! └───────────┘          │            │─────────▶ │  Handler   │
//!       ▲                └─────┬──────┘           └─────┬──────┘
//!       │                      │ meta                   │
//!       │                      ▼                        │
//!       │              ┌───────────────┐                │
//!       │              │LivenessMonitor│                │
//!       │              └───────────────┘                │
//!       │         command frames (Bot)                  │
//!       └───────────────────────────────────────────────┘
//! ```

pub mod bot;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod handler;
pub mod liveness;
pub mod notify;
pub mod switch;
pub mod tasks;
pub mod transport;

pub use bot::{Bot, DEFAULT_API_TIMEOUT};
pub use dispatcher::{DispatchReport, Dispatcher};
pub use error::{
    ApiError, ApiResult, DecodeError, DecodeResult, HandlerError, HandlerResult, NotifyError,
    NotifyResult, SwitchError, SwitchResult, TransportError, TransportResult,
};
pub use event::{
    ApiResponse, ChatTarget, Event, EventKind, MessageEvent, MessageType, MetaEvent,
    MetaEventType, NoticeEvent, RequestEvent, Route, Sender,
};
pub use handler::{BoxedHandler, DEFAULT_ROUTES, Handler, HandlerFn, HandlerRegistry, handler_fn};
pub use liveness::{LivenessMonitor, Presence, StatusChange};
pub use notify::{LogNotifier, Notifier, Notifiers};
pub use switch::{
    CopyReport, JsonFileSwitchStore, MemorySwitchStore, Scope, SwitchCommand, SwitchStore,
    Switched,
};
pub use tasks::{SweepReport, TaskTracker, panic_message};
pub use transport::{
    Connection, ConnectionHandle, Connector, FrameSource, OUTBOUND_CAPACITY, Outbound,
};

/// Re-export of `async_trait` for implementing [`Handler`], [`Notifier`]
/// and [`Connector`].
pub use async_trait::async_trait;
