//! Inbound queue and the dispatch worker.
//!
//! ```text
//! read loop ──put──▶ InboundQueue (unbounded FIFO) ──get──▶ Worker ──▶ Dispatcher
//! ```
//!
//! `put` never waits, so a slow handler never stalls the socket. The
//! single worker takes frames one at a time, which keeps dispatch in
//! arrival order. A panic that escapes the dispatcher is caught here; the
//! worker logs it, tells the first operator, and carries on with the next
//! frame.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use breeze_core::{Bot, Dispatcher, panic_message};

/// Creates a connected queue pair.
pub fn inbound_queue() -> (InboundQueue, InboundReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (InboundQueue { tx }, InboundReceiver { rx })
}

/// Producer side of the inbound queue.
#[derive(Debug, Clone)]
pub struct InboundQueue {
    tx: mpsc::UnboundedSender<String>,
}

impl InboundQueue {
    /// Enqueues one frame without waiting.
    ///
    /// Returns `false` if the worker is gone and the frame was dropped.
    pub fn put(&self, frame: String) -> bool {
        self.tx.send(frame).is_ok()
    }
}

/// Consumer side of the inbound queue.
#[derive(Debug)]
pub struct InboundReceiver {
    rx: mpsc::UnboundedReceiver<String>,
}

impl InboundReceiver {
    /// Waits for the next frame. `None` once every producer is dropped and
    /// the queue is drained.
    pub async fn get(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Frames waiting to be dispatched.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether no frames are waiting.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// The single consumer of one connection's inbound queue.
pub struct Worker {
    dispatcher: Arc<Dispatcher>,
    bot: Bot,
    /// Receives a crash report, if set.
    crash_contact: Option<i64>,
}

impl Worker {
    /// Creates a worker dispatching through `bot`.
    pub fn new(dispatcher: Arc<Dispatcher>, bot: Bot) -> Self {
        Self {
            dispatcher,
            bot,
            crash_contact: None,
        }
    }

    /// Sends crash reports to `operator`.
    pub fn report_crashes_to(mut self, operator: Option<i64>) -> Self {
        self.crash_contact = operator;
        self
    }

    /// Drains `inbound` until it closes. Returns the number of frames taken.
    pub async fn run(self, mut inbound: InboundReceiver) -> u64 {
        let mut taken = 0;
        while let Some(frame) = inbound.get().await {
            taken += 1;
            let outcome = AssertUnwindSafe(self.dispatcher.dispatch(&self.bot, &frame))
                .catch_unwind()
                .await;
            if let Err(panic) = outcome {
                let msg = panic_message(&panic);
                error!(panic = %msg, payload = %frame, "Worker caught a panic while dispatching");
                self.report_crash(&msg).await;
            }
        }
        debug!(frames = taken, "Inbound queue closed, worker exiting");
        taken
    }

    async fn report_crash(&self, msg: &str) {
        let Some(operator) = self.crash_contact else {
            return;
        };
        let text = format!("Event processing failed: {msg}");
        if let Err(e) = self.bot.send_private_msg(operator, text).await {
            warn!(operator, error = %e, "Failed to report crash to operator");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use breeze_core::{ConnectionHandle, Event, HandlerRegistry, Outbound, TaskTracker, handler_fn};
    use parking_lot::Mutex;
    use serde_json::Value;

    fn message(id: i64) -> String {
        format!(
            r#"{{"time":1,"self_id":1,"post_type":"message","message_type":"private","message_id":{id},"user_id":5,"message":"m{id}"}}"#
        )
    }

    fn bot() -> (Bot, Outbound) {
        let (handle, outbound) = ConnectionHandle::channel(16);
        (Bot::new(handle, Arc::new(TaskTracker::new())), outbound)
    }

    #[tokio::test]
    async fn test_put_never_waits_and_order_is_kept() {
        let (queue, inbound) = inbound_queue();
        for id in 0..1000 {
            assert!(queue.put(message(id)));
        }
        assert_eq!(inbound.len(), 1000);
        drop(queue);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let registry = HandlerRegistry::new().with(handler_fn(
            "record",
            move |_bot, event: Event| {
                let log = Arc::clone(&log);
                async move {
                    if let Some(msg) = event.as_message() {
                        log.lock().push(msg.message_id);
                    }
                    Ok(())
                }
            },
        ));
        let (bot, _outbound) = bot();

        let taken = Worker::new(Arc::new(Dispatcher::new(registry)), bot)
            .run(inbound)
            .await;

        assert_eq!(taken, 1000);
        assert_eq!(*seen.lock(), (0..1000).collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn test_put_after_worker_gone() {
        let (queue, inbound) = inbound_queue();
        drop(inbound);
        assert!(!queue.put(message(1)));
    }

    #[tokio::test]
    async fn test_handler_panic_does_not_stop_worker() {
        let (queue, inbound) = inbound_queue();
        queue.put(message(1));
        queue.put(message(2));
        drop(queue);

        // Contained by the dispatcher, so no crash report either.
        let registry = HandlerRegistry::new().with(handler_fn(
            "panics",
            |_bot, _event| async move {
                if std::hint::black_box(true) {
                    panic!("boom");
                }
                Ok(())
            },
        ));
        let (bot, mut outbound) = bot();
        let dispatcher = Arc::new(Dispatcher::new(registry).diagnostic_replies(false));

        let taken = Worker::new(dispatcher, bot)
            .report_crashes_to(Some(99))
            .run(inbound)
            .await;

        assert_eq!(taken, 2);
        assert!(outbound.frames.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_report_crash_message() {
        let (bot, mut outbound) = bot();
        let worker = Worker::new(Arc::new(Dispatcher::new(HandlerRegistry::new())), bot)
            .report_crashes_to(Some(99));

        worker.report_crash("boom").await;

        let frame: Value = serde_json::from_slice(&outbound.frames.recv().await.unwrap()).unwrap();
        assert_eq!(frame["action"], "send_private_msg");
        assert_eq!(frame["params"]["user_id"], 99);
        assert!(frame["params"]["message"].as_str().unwrap().contains("boom"));
    }
}
