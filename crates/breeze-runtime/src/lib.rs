//! Breeze Runtime - connection supervision for the Breeze OneBot client.
//!
//! This crate provides:
//! - Configuration loading and validation (`config`)
//! - Logging setup (`logging`)
//! - The inbound queue and dispatch worker (`worker`)
//! - Per-connection sessions (`session`)
//! - The reconnect-forever supervisor (`Runtime`)
//!
//! ```ignore
//! use breeze_runtime::Runtime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = Runtime::builder()
//!         .handler(my_handler)
//!         .build()?;
//!
//!     // Run until Ctrl+C
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `ws-client` (default): build a WebSocket connector from `[connection]`
//! - `toml-config` (default) / `yaml-config`: configuration file formats
//! - `json-log`: JSON log output

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod session;
pub mod worker;

// Re-exports
pub use config::{
    ApiConfig, BotConfig, BreezeConfig, ConfigError, ConfigLoader, ConfigResult,
    ConnectionConfig, LivenessConfig, LoggingConfig, Profile,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::LoggingBuilder;
pub use runtime::{Runtime, RuntimeBuilder};
pub use session::{SessionContext, SessionEnd, SessionReport, run_session};
pub use worker::{InboundQueue, InboundReceiver, Worker, inbound_queue};

// Re-export tracing for use by other crates
pub use tracing;

/// Prelude module for convenient imports.
///
/// This provides the commonly used logging macros.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
