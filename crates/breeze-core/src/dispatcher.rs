//! Event dispatcher.
//!
//! The [`Dispatcher`] turns one raw frame into one [`Event`] and offers it
//! to the registered handlers.
//!
//! # Routing
//!
//! 1. Undecodable frames are logged and dropped.
//! 2. Command responses first complete a pending [`Bot::call`]. Unclaimed
//!    successful responses go to handlers accepting [`Route::Response`];
//!    nothing else runs for a response.
//! 3. Meta events go to the [`LivenessMonitor`] first, then to handlers
//!    accepting [`Route::Meta`].
//! 4. Messages, notices and requests go to every handler accepting their
//!    route, in registration order.
//!
//! # Isolation
//!
//! Each handler call is isolated: an error or a panic is logged with the
//! handler name and the next handler still runs. When the failing event is
//! a chat message, a short diagnostic is sent back to that chat.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{Instrument, Level, debug, error, span, warn};

use crate::bot::Bot;
use crate::event::{Event, EventKind, Route};
use crate::handler::{BoxedHandler, HandlerRegistry};
use crate::liveness::LivenessMonitor;
use crate::tasks::panic_message;

/// What happened to one dispatched frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Route taken, or `None` if the frame was dropped before routing.
    pub route: Option<Route>,
    /// Whether the frame completed a pending [`Bot::call`].
    pub resolved_call: bool,
    /// Handlers invoked.
    pub invoked: usize,
    /// Handlers that returned an error or panicked.
    pub failed: usize,
}

/// The central event dispatcher.
///
/// Holds an immutable handler list; build the [`HandlerRegistry`] first
/// and hand it over.
#[derive(Clone)]
pub struct Dispatcher {
    handlers: HandlerRegistry,
    liveness: Option<Arc<LivenessMonitor>>,
    diagnostic_replies: bool,
}

impl Dispatcher {
    /// Creates a dispatcher over `handlers`.
    pub fn new(handlers: HandlerRegistry) -> Self {
        Self {
            handlers,
            liveness: None,
            diagnostic_replies: true,
        }
    }

    /// Runs `monitor` on every meta event before any handler.
    pub fn with_liveness(mut self, monitor: Arc<LivenessMonitor>) -> Self {
        self.liveness = Some(monitor);
        self
    }

    /// Whether failing handlers trigger a diagnostic reply (default: on).
    pub fn diagnostic_replies(mut self, enabled: bool) -> Self {
        self.diagnostic_replies = enabled;
        self
    }

    /// Returns the number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// The liveness monitor, if one is attached.
    pub fn liveness(&self) -> Option<&Arc<LivenessMonitor>> {
        self.liveness.as_ref()
    }

    /// Decodes and dispatches one raw frame.
    pub async fn dispatch(&self, bot: &Bot, raw: &str) -> DispatchReport {
        match Event::decode(raw) {
            Ok(event) => self.dispatch_event(bot, &event).await,
            Err(e) => {
                warn!(error = %e, len = raw.len(), "Dropping undecodable frame");
                DispatchReport::default()
            }
        }
    }

    /// Dispatches an already decoded event.
    pub async fn dispatch_event(&self, bot: &Bot, event: &Event) -> DispatchReport {
        let Some(route) = event.route() else {
            debug!(event = %event.summary(), "No route for event, dropping");
            return DispatchReport::default();
        };

        let span = span!(Level::DEBUG, "dispatch", route = %route);
        self.route_event(bot, event, route).instrument(span).await
    }

    async fn route_event(&self, bot: &Bot, event: &Event, route: Route) -> DispatchReport {
        let mut report = DispatchReport {
            route: Some(route),
            ..Default::default()
        };

        match &event.kind {
            EventKind::Response(response) => {
                if bot.resolve_response(response) {
                    report.resolved_call = true;
                    return report;
                }
                if !response.is_ok() {
                    let echo = response.echo_key();
                    let echo = echo.as_deref().unwrap_or("-");
                    if response.status == "failed" {
                        warn!(
                            retcode = response.retcode,
                            echo,
                            message = %response.message,
                            "Command failed"
                        );
                    } else {
                        debug!(status = %response.status, echo, "Unclaimed response");
                    }
                    return report;
                }
            }
            EventKind::Meta(meta) => {
                if let Some(liveness) = &self.liveness {
                    liveness.on_meta(bot, event.self_id, event.time, meta).await;
                }
            }
            _ => {}
        }

        for handler in self.handlers.iter().filter(|h| h.accepts(route)) {
            report.invoked += 1;
            if let Err(reason) = self.run_handler(handler, bot, event).await {
                report.failed += 1;
                self.send_diagnostic(bot, event, handler.name(), &reason)
                    .await;
            }
        }

        report
    }

    /// Runs one handler, containing errors and panics.
    async fn run_handler(
        &self,
        handler: &BoxedHandler,
        bot: &Bot,
        event: &Event,
    ) -> Result<(), String> {
        let outcome = AssertUnwindSafe(handler.handle(bot, event))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!(
                    handler = %handler.name(),
                    event = %event.summary(),
                    error = %e,
                    "Handler failed"
                );
                Err(e.to_string())
            }
            Err(panic) => {
                let msg = panic_message(&panic);
                error!(
                    handler = %handler.name(),
                    event = %event.summary(),
                    panic = %msg,
                    "Handler panicked"
                );
                Err(format!("internal error: {msg}"))
            }
        }
    }

    /// Best-effort notice to the chat whose message made a handler fail.
    async fn send_diagnostic(&self, bot: &Bot, event: &Event, handler: &str, reason: &str) {
        if !self.diagnostic_replies {
            return;
        }
        let Some(target) = event.as_message().and_then(|msg| msg.chat()) else {
            return;
        };
        let text = format!("[{handler}] failed to handle this message: {reason}");
        if let Err(e) = bot.send_to(target, text).await {
            warn!(handler = %handler, error = %e, "Failed to send diagnostic reply");
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handlers", &self.handlers)
            .field("liveness", &self.liveness.is_some())
            .field("diagnostic_replies", &self.diagnostic_replies)
            .finish()
    }
}
