//! Shared helpers for runtime integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use breeze_core::{
    Connection, ConnectionHandle, Connector, FrameSource, OUTBOUND_CAPACITY, Outbound,
    TransportError, TransportResult, async_trait,
};
use breeze_runtime::{BreezeConfig, Runtime, RuntimeBuilder};

/// A connector that plays back a queue of planned connection attempts.
///
/// An attempt with nothing planned is refused.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    inner: Arc<Plan>,
}

#[derive(Default)]
struct Plan {
    steps: Mutex<VecDeque<Step>>,
    attempts: AtomicUsize,
}

enum Step {
    Refuse,
    Open(ScriptedSource, ConnectionHandle),
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plans one refused attempt.
    pub fn refuse(&self) {
        self.inner.steps.lock().push_back(Step::Refuse);
    }

    /// Plans one successful attempt and returns the far end of it.
    pub fn open(&self) -> Peer {
        let (tx, rx) = mpsc::unbounded_channel();
        let reads = Arc::new(AtomicUsize::new(0));
        let (handle, outbound) = ConnectionHandle::channel(OUTBOUND_CAPACITY);
        let source = ScriptedSource {
            rx,
            reads: Arc::clone(&reads),
        };
        self.inner
            .steps
            .lock()
            .push_back(Step::Open(source, handle.clone()));
        Peer {
            tx,
            reads,
            handle,
            outbound,
        }
    }

    /// Connection attempts made so far.
    pub fn attempts(&self) -> usize {
        self.inner.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    fn endpoint(&self) -> &str {
        "scripted://gateway"
    }

    async fn connect(&self) -> TransportResult<Connection> {
        self.inner.attempts.fetch_add(1, Ordering::SeqCst);
        let step = self.inner.steps.lock().pop_front();
        match step {
            Some(Step::Open(source, handle)) => Ok(Connection {
                frames: Box::new(source),
                handle,
            }),
            Some(Step::Refuse) | None => Err(TransportError::ConnectionFailed {
                url: self.endpoint().to_string(),
                reason: "refused".into(),
            }),
        }
    }
}

struct ScriptedSource {
    rx: mpsc::UnboundedReceiver<TransportResult<String>>,
    reads: Arc<AtomicUsize>,
}

#[async_trait]
impl FrameSource for ScriptedSource {
    async fn receive(&mut self) -> TransportResult<String> {
        match self.rx.recv().await {
            Some(frame) => {
                self.reads.fetch_add(1, Ordering::SeqCst);
                frame
            }
            None => Err(TransportError::closed("peer went away")),
        }
    }
}

/// The gateway side of a scripted connection. Dropping it closes the
/// connection.
pub struct Peer {
    tx: mpsc::UnboundedSender<TransportResult<String>>,
    reads: Arc<AtomicUsize>,
    handle: ConnectionHandle,
    pub outbound: Outbound,
}

impl Peer {
    /// Queues one inbound frame.
    pub fn push(&self, frame: impl Into<String>) {
        let _ = self.tx.send(Ok(frame.into()));
    }

    /// Fails the connection with a transport error.
    pub fn fail(&self, reason: &str) {
        let _ = self.tx.send(Err(TransportError::closed(reason)));
    }

    /// Frames the session has read.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Whether the session has closed its handle.
    pub fn is_closed(&self) -> bool {
        !self.handle.is_open()
    }
}

/// A private message frame from user 5 with `message_id` = `id`.
pub fn private_message(id: i64) -> String {
    format!(
        r#"{{"time":1700000000,"self_id":10,"post_type":"message","message_type":"private","sub_type":"friend","message_id":{id},"user_id":5,"message":"m{id}","raw_message":"m{id}"}}"#
    )
}

/// A builder with a short reconnect delay and logging left alone.
pub fn builder(connector: ScriptedConnector) -> RuntimeBuilder {
    let mut config = BreezeConfig::default();
    config.connection.reconnect_delay_ms = 20;
    config.api.timeout_secs = 5;
    Runtime::builder()
        .config(config)
        .connector(connector)
        .without_logging()
}

/// Polls `cond` until it holds, failing the test after five seconds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
