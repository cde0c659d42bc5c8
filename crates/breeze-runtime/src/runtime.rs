//! Connection supervision.
//!
//! The runtime owns one [`Connector`] and keeps a session alive on it:
//!
//! ```text
//! loop {
//!     connect ──ok──▶ run_session ──▶ (lost) ─┐
//!        └──err──▶ log ───────────────────────┤
//!                                             ▼
//!                              sleep(reconnect_delay), retry
//! }
//! ```
//!
//! Only a shutdown request ends the loop. Every connect failure or lost
//! connection is logged and retried after the same fixed delay.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use breeze_runtime::Runtime;
//!
//! let runtime = Runtime::builder()
//!     .config_file("breeze.toml")
//!     .handler(my_handler)
//!     .build()?;
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use breeze_core::{
    BoxedHandler, Connector, Dispatcher, Handler, HandlerRegistry, LivenessMonitor, LogNotifier,
    Notifier, Notifiers, TaskTracker,
};

use crate::config::{BreezeConfig, ConfigLoader, ConnectionConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use crate::session::{SessionContext, SessionEnd, run_session};

/// Keeps one gateway connection alive and feeds it to the dispatcher.
pub struct Runtime {
    config: BreezeConfig,
    connector: Arc<dyn Connector>,
    context: SessionContext,
    reconnect_delay: Duration,
}

impl Runtime {
    /// Creates a runtime builder.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &BreezeConfig {
        &self.config
    }

    /// The dispatcher shared by every session.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.context.dispatcher
    }

    /// Background tasks spawned by handlers.
    pub fn tasks(&self) -> &Arc<TaskTracker> {
        &self.context.tasks
    }

    /// Runs until Ctrl+C or SIGTERM.
    pub async fn run(&self) -> RuntimeResult<()> {
        info!("Breeze is now running. Press Ctrl+C to stop.");

        let mut outcome = Ok(());
        self.run_until(async { outcome = wait_for_shutdown().await })
            .await?;
        outcome
    }

    /// Runs until `shutdown` completes.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        let token = CancellationToken::new();
        let trigger = token.clone();
        let stop = async move {
            shutdown.await;
            trigger.cancel();
        };

        tokio::join!(self.run_with_token(token), stop);
        Ok(())
    }

    /// Runs until `shutdown` is cancelled.
    pub async fn run_with_token(&self, shutdown: CancellationToken) {
        let endpoint = self.connector.endpoint();
        let mut attempt: u32 = 0;

        while !shutdown.is_cancelled() {
            attempt += 1;
            let connected = tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.connector.connect() => result,
            };

            match connected {
                Ok(connection) => {
                    info!(endpoint = %endpoint, attempt, "Connected to gateway");
                    attempt = 0;

                    let report = run_session(&self.context, connection, &shutdown).await;
                    match report.end {
                        SessionEnd::Cancelled => break,
                        SessionEnd::Lost(e) => warn!(
                            endpoint = %endpoint,
                            frames = report.frames,
                            cancelled_calls = report.cancelled_calls,
                            error = %e,
                            "Connection lost"
                        ),
                    }
                }
                Err(e) => {
                    error!(endpoint = %endpoint, attempt, error = %e, "Failed to connect");
                }
            }

            info!(
                delay_ms = self.reconnect_delay.as_millis() as u64,
                "Reconnecting after delay"
            );
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }

        info!("Runtime stopped");
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("endpoint", &self.connector.endpoint())
            .field("reconnect_delay", &self.reconnect_delay)
            .field("dispatcher", &self.context.dispatcher)
            .finish()
    }
}

/// Waits for shutdown signals (Ctrl+C or SIGTERM).
async fn wait_for_shutdown() -> RuntimeResult<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .map_err(|e| RuntimeError::Signal(e.to_string()))?;

        tokio::select! {
            result = signal::ctrl_c() => {
                result.map_err(|e| RuntimeError::Signal(e.to_string()))?;
                info!("Received Ctrl+C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c()
            .await
            .map_err(|e| RuntimeError::Signal(e.to_string()))?;
        info!("Received Ctrl+C, shutting down");
    }

    Ok(())
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for creating a [`Runtime`].
///
/// Configuration comes from [`ConfigLoader`] unless a complete
/// [`BreezeConfig`] is supplied with [`RuntimeBuilder::config`].
///
/// # Example
///
/// ```rust,ignore
/// let runtime = Runtime::builder()
///     .config_file("config/production.toml")
///     .profile("production")
///     .handler(echo)
///     .notifier(LogNotifier)
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    config: Option<BreezeConfig>,
    connector: Option<Arc<dyn Connector>>,
    handlers: HandlerRegistry,
    notifiers: Notifiers,
    init_logging: bool,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
            config: None,
            connector: None,
            handlers: HandlerRegistry::new(),
            notifiers: Notifiers::new(),
            init_logging: true,
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Enables loading environment variables (enabled by default).
    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges additional configuration programmatically.
    pub fn merge(mut self, config: BreezeConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Uses `config` as is and skips file and environment loading.
    pub fn config(mut self, config: BreezeConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Replaces the WebSocket connector built from configuration.
    pub fn connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Appends a handler. Dispatch order is registration order.
    pub fn handler(mut self, handler: impl Handler + 'static) -> Self {
        self.handlers.add(handler);
        self
    }

    /// Appends an already shared handler.
    pub fn shared_handler(mut self, handler: BoxedHandler) -> Self {
        self.handlers.add_shared(handler);
        self
    }

    /// Appends every handler in `registry`, keeping its order.
    pub fn handlers(mut self, registry: HandlerRegistry) -> Self {
        for handler in registry.iter() {
            self.handlers.add_shared(Arc::clone(handler));
        }
        self
    }

    /// Adds a status-change notifier. Without any, changes are only logged.
    pub fn notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifiers = self.notifiers.with(notifier);
        self
    }

    /// Leaves the global tracing subscriber alone.
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    /// Loads and validates configuration, then assembles the runtime.
    pub fn build(self) -> RuntimeResult<Runtime> {
        let config = match self.config {
            Some(config) => config,
            None => self.config_loader.load()?,
        };
        validate_config(&config)?;

        if self.init_logging {
            logging::init_from_config(&config.logging);
        }

        let connector = match self.connector {
            Some(connector) => connector,
            None => default_connector(&config.connection)?,
        };

        let notifiers = if self.notifiers.is_empty() {
            Notifiers::new().with(LogNotifier)
        } else {
            self.notifiers
        };
        let liveness = LivenessMonitor::new(config.bot.operators.clone(), notifiers)
            .with_min_report_interval(config.liveness.min_report_interval());

        let dispatcher = Dispatcher::new(self.handlers)
            .with_liveness(Arc::new(liveness))
            .diagnostic_replies(config.bot.diagnostic_replies);

        let crash_contact = if config.bot.notify_operator_on_error {
            config.bot.operators.first().copied()
        } else {
            None
        };

        info!(
            endpoint = %connector.endpoint(),
            handlers = dispatcher.handler_count(),
            operators = config.bot.operators.len(),
            log_level = %config.logging.level,
            "Runtime initialized from configuration"
        );

        Ok(Runtime {
            reconnect_delay: config.connection.reconnect_delay(),
            context: SessionContext {
                dispatcher: Arc::new(dispatcher),
                tasks: Arc::new(TaskTracker::new()),
                api_timeout: config.api.timeout(),
                crash_contact,
            },
            connector,
            config,
        })
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "ws-client")]
fn default_connector(connection: &ConnectionConfig) -> RuntimeResult<Arc<dyn Connector>> {
    use breeze_transport::WsConnector;

    let mut connector = WsConnector::new(connection.url.clone());
    if let Some(token) = &connection.access_token {
        connector = connector.with_access_token(token.clone());
    }
    Ok(Arc::new(connector))
}

#[cfg(not(feature = "ws-client"))]
fn default_connector(_connection: &ConnectionConfig) -> RuntimeResult<Arc<dyn Connector>> {
    Err(RuntimeError::NoConnector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_build_from_config() {
        let mut config = BreezeConfig::default();
        config.bot.operators = vec![42, 7];
        config.connection.reconnect_delay_ms = 250;

        let runtime = assert_ok!(Runtime::builder().config(config).without_logging().build());

        assert_eq!(runtime.reconnect_delay, Duration::from_millis(250));
        assert_eq!(runtime.context.crash_contact, Some(42));
        assert!(runtime.dispatcher().liveness().is_some());
        assert_eq!(runtime.connector.endpoint(), "ws://127.0.0.1:3001");
    }

    #[test]
    fn test_crash_contact_disabled() {
        let mut config = BreezeConfig::default();
        config.bot.operators = vec![42];
        config.bot.notify_operator_on_error = false;

        let runtime = Runtime::builder()
            .config(config)
            .without_logging()
            .build()
            .unwrap();

        assert_eq!(runtime.context.crash_contact, None);
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let mut config = BreezeConfig::default();
        config.connection.url = "http://nope".into();

        let err = assert_err!(Runtime::builder().config(config).without_logging().build());

        assert!(matches!(err, RuntimeError::Config(_)));
    }
}
