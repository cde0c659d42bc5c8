//! The bot handle given to handlers.
//!
//! A [`Bot`] wraps the send side of the current connection and offers the
//! outbound OneBot actions handlers need. It comes in two flavours of call:
//!
//! | Method | Waits for a response | Safe on the worker |
//! |--------|----------------------|--------------------|
//! | [`Bot::send_action`] and the `send_*` helpers | no | yes |
//! | [`Bot::call`] | yes, matched by `echo` | only from a [`Bot::spawn`]ed task |
//!
//! Responses are delivered by the same single worker that runs handlers, so
//! a handler that awaits [`Bot::call`] directly holds the worker until the
//! call times out. Spawn the call instead.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::error::{ApiError, ApiResult, HandlerResult};
use crate::event::{ApiResponse, ChatTarget, MessageEvent};
use crate::tasks::TaskTracker;
use crate::transport::ConnectionHandle;

/// How long [`Bot::call`] waits for a response by default.
pub const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(30);

/// Prefix of the echo tokens generated by [`Bot::call`].
const CALL_ECHO_PREFIX: &str = "breeze:";

/// Handle to the bot behind the current connection.
///
/// Cheap to clone; all clones share the connection and the pending-call
/// table.
#[derive(Clone)]
pub struct Bot {
    inner: Arc<BotInner>,
}

struct BotInner {
    connection: ConnectionHandle,
    tasks: Arc<TaskTracker>,
    /// Pending call map: echo token → sender half of the response channel.
    pending_calls: Mutex<HashMap<String, oneshot::Sender<ApiResponse>>>,
    /// Monotonically increasing echo counter.
    echo_counter: AtomicU64,
    api_timeout: Duration,
}

impl Bot {
    /// Creates a bot over `connection`, spawning background work on `tasks`.
    pub fn new(connection: ConnectionHandle, tasks: Arc<TaskTracker>) -> Self {
        Self::with_api_timeout(connection, tasks, DEFAULT_API_TIMEOUT)
    }

    /// Like [`Bot::new`] with a custom [`Bot::call`] timeout.
    pub fn with_api_timeout(
        connection: ConnectionHandle,
        tasks: Arc<TaskTracker>,
        api_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(BotInner {
                connection,
                tasks,
                pending_calls: Mutex::new(HashMap::new()),
                echo_counter: AtomicU64::new(1),
                api_timeout,
            }),
        }
    }

    /// The underlying connection handle.
    pub fn connection(&self) -> &ConnectionHandle {
        &self.inner.connection
    }

    /// The tracker background tasks are recorded in.
    pub fn tasks(&self) -> &Arc<TaskTracker> {
        &self.inner.tasks
    }

    /// Whether the connection is still open.
    pub fn is_connected(&self) -> bool {
        self.inner.connection.is_open()
    }

    // =========================================================================
    // Fire-and-forget
    // =========================================================================

    /// Sends an action without waiting for its response.
    pub async fn send_action(&self, action: &str, params: Value) -> ApiResult<()> {
        self.send_frame(json!({ "action": action, "params": params }))
            .await
    }

    /// Sends an action tagged with `echo`.
    ///
    /// The response is dispatched to handlers that accept
    /// [`Route::Response`](crate::Route::Response), which can recognise it
    /// by the echo they chose.
    pub async fn send_action_with_echo(
        &self,
        action: &str,
        params: Value,
        echo: &str,
    ) -> ApiResult<()> {
        self.send_frame(json!({ "action": action, "params": params, "echo": echo }))
            .await
    }

    async fn send_frame(&self, frame: Value) -> ApiResult<()> {
        if !self.is_connected() {
            return Err(ApiError::NotConnected);
        }
        trace!(action = %frame["action"], "Sending action");
        self.inner.connection.send_json(&frame).await?;
        Ok(())
    }

    /// Sends a message to a group.
    pub async fn send_group_msg(&self, group_id: i64, message: impl Into<Value>) -> ApiResult<()> {
        let message = message.into();
        self.send_action(
            "send_group_msg",
            json!({ "group_id": group_id, "message": message }),
        )
        .await
    }

    /// Sends a private message to a user.
    pub async fn send_private_msg(&self, user_id: i64, message: impl Into<Value>) -> ApiResult<()> {
        let message = message.into();
        self.send_action(
            "send_private_msg",
            json!({ "user_id": user_id, "message": message }),
        )
        .await
    }

    /// Sends a message to whichever chat `target` names.
    pub async fn send_to(&self, target: ChatTarget, message: impl Into<Value>) -> ApiResult<()> {
        match target {
            ChatTarget::Group(group_id) => self.send_group_msg(group_id, message).await,
            ChatTarget::Private(user_id) => self.send_private_msg(user_id, message).await,
        }
    }

    /// Replies to `msg` in the chat it came from, quoting it.
    pub async fn reply(&self, msg: &MessageEvent, text: &str) -> ApiResult<()> {
        let Some(target) = msg.chat() else {
            return Err(ApiError::Failed {
                retcode: -1,
                message: "message has no reply target".into(),
            });
        };
        let message = json!([
            { "type": "reply", "data": { "id": msg.message_id.to_string() } },
            { "type": "text", "data": { "text": text } },
        ]);
        self.send_to(target, message).await
    }

    // =========================================================================
    // Request/response
    // =========================================================================

    /// Calls an action and waits for its response.
    ///
    /// Each call:
    /// 1. Generates a unique echo token.
    /// 2. Registers a one-shot channel keyed on that token.
    /// 3. Sends the request tagged with the token.
    /// 4. Awaits the channel, which [`Bot::resolve_response`] completes when
    ///    the matching response is dispatched.
    ///
    /// Run this from a [`Bot::spawn`]ed task, never directly in a handler.
    pub async fn call(&self, action: &str, params: Value) -> ApiResult<Value> {
        if !self.is_connected() {
            return Err(ApiError::NotConnected);
        }

        let n = self.inner.echo_counter.fetch_add(1, Ordering::SeqCst);
        let echo = format!("{CALL_ECHO_PREFIX}{n}");

        // Register before sending so an early response is never missed.
        let (tx, rx) = oneshot::channel();
        self.inner.pending_calls.lock().insert(echo.clone(), tx);

        let request = json!({ "action": action, "params": params, "echo": echo });
        debug!(action = %action, echo = %echo, "Calling action");

        if let Err(e) = self.inner.connection.send_json(&request).await {
            self.inner.pending_calls.lock().remove(&echo);
            return Err(e.into());
        }

        match timeout(self.inner.api_timeout, rx).await {
            Ok(Ok(response)) => response.into_result(),
            // Sender dropped: the pending table was cleared on disconnect.
            Ok(Err(_)) => Err(ApiError::NotConnected),
            Err(_) => {
                self.inner.pending_calls.lock().remove(&echo);
                Err(ApiError::Timeout)
            }
        }
    }

    /// Completes the pending [`Bot::call`] waiting on this response's echo.
    ///
    /// Returns `false` if nobody is waiting, in which case the response
    /// should be offered to handlers instead.
    pub fn resolve_response(&self, response: &ApiResponse) -> bool {
        let Some(echo) = response.echo_key() else {
            return false;
        };
        let Some(tx) = self.inner.pending_calls.lock().remove(&echo) else {
            if echo.starts_with(CALL_ECHO_PREFIX) {
                warn!(echo = %echo, "Response for unknown call (timed out?)");
            }
            return false;
        };
        if tx.send(response.clone()).is_err() {
            debug!(echo = %echo, "Caller went away before its response arrived");
        }
        true
    }

    /// Number of calls waiting for a response.
    pub fn pending_calls(&self) -> usize {
        self.inner.pending_calls.lock().len()
    }

    /// Fails every pending call with [`ApiError::NotConnected`].
    ///
    /// Called when the connection is torn down.
    pub fn cancel_pending_calls(&self) -> usize {
        let mut pending = self.inner.pending_calls.lock();
        let count = pending.len();
        if count > 0 {
            debug!(count, "Clearing pending calls due to disconnect");
            pending.clear();
        }
        count
    }

    // =========================================================================
    // Background work
    // =========================================================================

    /// Spawns `future` as a tracked background task.
    ///
    /// Errors and panics are logged by the next tracker sweep. Returns the
    /// task id.
    pub fn spawn<F>(&self, name: impl Into<String>, future: F) -> u64
    where
        F: Future<Output = HandlerResult> + Send + 'static,
    {
        self.inner.tasks.track(name, future)
    }
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot")
            .field("connected", &self.is_connected())
            .field("pending_calls", &self.pending_calls())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Outbound;
    use tokio_test::{assert_err, assert_ok};

    fn test_bot(api_timeout: Duration) -> (Bot, Outbound) {
        let (handle, outbound) = ConnectionHandle::channel(16);
        let bot = Bot::with_api_timeout(handle, Arc::new(TaskTracker::new()), api_timeout);
        (bot, outbound)
    }

    async fn next_frame(outbound: &mut Outbound) -> Value {
        let bytes = outbound.frames.recv().await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_send_group_msg_frame() {
        let (bot, mut outbound) = test_bot(DEFAULT_API_TIMEOUT);
        assert_ok!(bot.send_group_msg(123, "hello").await);

        let frame = next_frame(&mut outbound).await;
        assert_eq!(frame["action"], "send_group_msg");
        assert_eq!(frame["params"]["group_id"], 123);
        assert_eq!(frame["params"]["message"], "hello");
        assert!(frame.get("echo").is_none());
    }

    #[tokio::test]
    async fn test_call_resolved_by_echo() {
        let (bot, mut outbound) = test_bot(DEFAULT_API_TIMEOUT);
        let caller = bot.clone();
        let call = tokio::spawn(async move { caller.call("get_login_info", json!({})).await });

        let frame = next_frame(&mut outbound).await;
        let echo = frame["echo"].as_str().unwrap().to_string();
        assert!(echo.starts_with(CALL_ECHO_PREFIX));

        let response: ApiResponse = serde_json::from_value(json!({
            "status": "ok", "retcode": 0, "data": {"user_id": 42}, "echo": echo,
        }))
        .unwrap();
        assert!(bot.resolve_response(&response));
        assert!(!bot.resolve_response(&response));

        let data = call.await.unwrap().unwrap();
        assert_eq!(data["user_id"], 42);
        assert_eq!(bot.pending_calls(), 0);
    }

    #[tokio::test]
    async fn test_call_times_out() {
        let (bot, _outbound) = test_bot(Duration::from_millis(20));
        let err = bot.call("slow", json!({})).await.unwrap_err();
        assert!(matches!(err, ApiError::Timeout));
        assert_eq!(bot.pending_calls(), 0);
    }

    #[tokio::test]
    async fn test_cancel_pending_calls() {
        let (bot, mut outbound) = test_bot(DEFAULT_API_TIMEOUT);
        let caller = bot.clone();
        let call = tokio::spawn(async move { caller.call("get_status", json!({})).await });

        next_frame(&mut outbound).await;
        assert_eq!(bot.cancel_pending_calls(), 1);
        assert!(matches!(call.await.unwrap(), Err(ApiError::NotConnected)));
    }

    #[tokio::test]
    async fn test_closed_connection_rejects_sends() {
        let (bot, _outbound) = test_bot(DEFAULT_API_TIMEOUT);
        bot.connection().close();
        assert_err!(bot.send_private_msg(1, "hi").await);
        assert!(matches!(
            bot.call("x", json!({})).await,
            Err(ApiError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_reply_quotes_message() {
        let (bot, mut outbound) = test_bot(DEFAULT_API_TIMEOUT);
        let msg: MessageEvent = serde_json::from_value(json!({
            "message_type": "private", "user_id": 9, "message_id": 77,
        }))
        .unwrap();
        assert_ok!(bot.reply(&msg, "pong").await);

        let frame = next_frame(&mut outbound).await;
        assert_eq!(frame["action"], "send_private_msg");
        assert_eq!(frame["params"]["message"][0]["data"]["id"], "77");
        assert_eq!(frame["params"]["message"][1]["data"]["text"], "pong");
    }
}
