//! One connection, from open to teardown.
//!
//! ```text
//! Connection ──▶ read loop ──put──▶ queue ──▶ worker (spawned)
//!                   │
//!                   ├── sweep task tracker after every frame
//!                   └── on error / shutdown:
//!                         close handle, fail pending calls, stop worker
//! ```
//!
//! Frames still queued when the connection ends are dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use breeze_core::{Bot, Connection, Dispatcher, TaskTracker, TransportError};

use crate::worker::{Worker, inbound_queue};

/// State shared by every session of one runtime.
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// The dispatcher every frame goes through.
    pub dispatcher: Arc<Dispatcher>,
    /// Background tasks spawned by handlers.
    pub tasks: Arc<TaskTracker>,
    /// `Bot::call` timeout.
    pub api_timeout: Duration,
    /// Operator told about worker crashes.
    pub crash_contact: Option<i64>,
}

/// Why a session ended.
#[derive(Debug)]
pub enum SessionEnd {
    /// The transport failed or the peer closed.
    Lost(TransportError),
    /// Shutdown was requested.
    Cancelled,
}

/// Summary of a finished session.
#[derive(Debug)]
pub struct SessionReport {
    /// Frames read from the connection.
    pub frames: u64,
    /// Pending calls failed at teardown.
    pub cancelled_calls: usize,
    /// Why it ended.
    pub end: SessionEnd,
}

/// Runs one connection until it fails or `shutdown` fires.
pub async fn run_session(
    ctx: &SessionContext,
    connection: Connection,
    shutdown: &CancellationToken,
) -> SessionReport {
    let Connection { mut frames, handle } = connection;
    let bot = Bot::with_api_timeout(handle.clone(), Arc::clone(&ctx.tasks), ctx.api_timeout);

    let (queue, inbound) = inbound_queue();
    let worker = Worker::new(Arc::clone(&ctx.dispatcher), bot.clone())
        .report_crashes_to(ctx.crash_contact);
    let worker = tokio::spawn(worker.run(inbound));

    let mut received = 0;
    let end = loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => None,
            frame = frames.receive() => Some(frame),
        };
        match next {
            None => break SessionEnd::Cancelled,
            Some(Ok(frame)) => {
                received += 1;
                if !queue.put(frame) {
                    break SessionEnd::Lost(TransportError::closed("worker stopped"));
                }
                ctx.tasks.sweep();
            }
            Some(Err(e)) => break SessionEnd::Lost(e),
        }
    };

    handle.close();
    let cancelled_calls = bot.cancel_pending_calls();
    worker.abort();
    debug!(frames = received, cancelled_calls, "Session torn down");

    SessionReport {
        frames: received,
        cancelled_calls,
        end,
    }
}
