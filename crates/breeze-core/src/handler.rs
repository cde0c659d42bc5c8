//! Handler trait and the ordered handler registry.
//!
//! A handler is one independent feature module. The dispatcher offers every
//! event to every registered handler, in registration order, whose
//! [`Handler::accepts`] returns `true` for the event's [`Route`].
//!
//! ```rust,ignore
//! use breeze_core::{Bot, Event, HandlerRegistry, Route, handler_fn};
//!
//! let registry = HandlerRegistry::new()
//!     .with(handler_fn("ping", |bot: Bot, event: Event| async move {
//!         if let Some(msg) = event.as_message()
//!             && msg.plain_text().trim() == "/ping"
//!         {
//!             bot.reply(msg, "pong").await?;
//!         }
//!         Ok(())
//!     }))
//!     .with(handler_fn("timer", on_tick).on(&[Route::Meta]));
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::bot::Bot;
use crate::error::HandlerResult;
use crate::event::{Event, Route};

/// Routes a handler accepts unless it says otherwise.
pub const DEFAULT_ROUTES: &[Route] = &[
    Route::GroupMessage,
    Route::PrivateMessage,
    Route::Notice,
    Route::Request,
];

/// One feature module.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Name used in logs and diagnostics.
    fn name(&self) -> &str;

    /// Whether this handler wants events on `route`.
    ///
    /// Defaults to messages, notices and requests. Meta events and command
    /// responses are opt-in.
    fn accepts(&self, route: Route) -> bool {
        DEFAULT_ROUTES.contains(&route)
    }

    /// Handles one event.
    ///
    /// Errors are logged by the dispatcher and never reach other handlers.
    async fn handle(&self, bot: &Bot, event: &Event) -> HandlerResult;
}

/// Shared handler trait object.
pub type BoxedHandler = Arc<dyn Handler>;

// =============================================================================
// Closure adapter
// =============================================================================

/// A [`Handler`] built from an async closure.
///
/// The closure receives owned clones of the bot and event.
pub struct HandlerFn<F> {
    name: String,
    routes: Vec<Route>,
    f: F,
}

/// Wraps an async closure as a handler accepting [`DEFAULT_ROUTES`].
pub fn handler_fn<F, Fut>(name: impl Into<String>, f: F) -> HandlerFn<F>
where
    F: Fn(Bot, Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    HandlerFn {
        name: name.into(),
        routes: DEFAULT_ROUTES.to_vec(),
        f,
    }
}

impl<F> HandlerFn<F> {
    /// Replaces the accepted routes.
    pub fn on(mut self, routes: &[Route]) -> Self {
        self.routes = routes.to_vec();
        self
    }
}

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Bot, Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn accepts(&self, route: Route) -> bool {
        self.routes.contains(&route)
    }

    async fn handle(&self, bot: &Bot, event: &Event) -> HandlerResult {
        (self.f)(bot.clone(), event.clone()).await
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Ordered list of handlers, built once at startup.
///
/// Order of registration is order of invocation.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: Vec<BoxedHandler>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler.
    pub fn add(&mut self, handler: impl Handler + 'static) {
        self.handlers.push(Arc::new(handler));
    }

    /// Appends an already shared handler.
    pub fn add_shared(&mut self, handler: BoxedHandler) {
        self.handlers.push(handler);
    }

    /// Appends a handler (builder pattern).
    pub fn with(mut self, handler: impl Handler + 'static) -> Self {
        self.add(handler);
        self
    }

    /// Returns the number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Handlers in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &BoxedHandler> {
        self.handlers.iter()
    }

    /// Handler names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.names())
            .finish()
    }
}
