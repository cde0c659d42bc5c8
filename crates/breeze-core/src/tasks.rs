//! Background task bookkeeping.
//!
//! Handlers that need to do slow work (or await a command response) spawn
//! it through [`Bot::spawn`](crate::Bot::spawn) instead of blocking the
//! worker. Every spawned task is recorded here; [`TaskTracker::sweep`]
//! removes the finished ones and logs any that failed or panicked.
//!
//! The tracker never cancels anything. It is owned by the runtime rather
//! than by a connection, so tasks that outlive a reconnect are still
//! observed.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::HandlerResult;

/// A spawned task and what is known about it.
struct TaskRecord {
    name: String,
    handle: JoinHandle<HandlerResult>,
    spawned_at: Instant,
}

/// Outcome counts of one [`TaskTracker::sweep`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Tasks that finished with `Ok(())`.
    pub completed: usize,
    /// Tasks that returned an error, panicked, or were aborted.
    pub failed: usize,
}

impl SweepReport {
    /// Total number of records removed.
    pub fn removed(&self) -> usize {
        self.completed + self.failed
    }
}

/// Registry of spawned background tasks, keyed by task id.
#[derive(Default)]
pub struct TaskTracker {
    next_id: AtomicU64,
    tasks: Mutex<HashMap<u64, TaskRecord>>,
}

impl TaskTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns `future` on the current runtime and records it.
    ///
    /// Returns the task id.
    pub fn track<F>(&self, name: impl Into<String>, future: F) -> u64
    where
        F: Future<Output = HandlerResult> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let name = name.into();
        debug!(task = %name, id, "Spawning background task");

        let record = TaskRecord {
            name,
            handle: tokio::spawn(future),
            spawned_at: Instant::now(),
        };
        self.tasks.lock().insert(id, record);
        id
    }

    /// Number of tasks not yet swept.
    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Whether no tasks are pending a sweep.
    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    /// Removes every finished task and logs its outcome.
    ///
    /// Running tasks are left alone.
    pub fn sweep(&self) -> SweepReport {
        let finished: Vec<(u64, TaskRecord)> = {
            let mut tasks = self.tasks.lock();
            let ids: Vec<u64> = tasks
                .iter()
                .filter(|(_, record)| record.handle.is_finished())
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| tasks.remove(&id).map(|record| (id, record)))
                .collect()
        };

        let mut report = SweepReport::default();
        for (id, mut record) in finished {
            let age_ms = record.spawned_at.elapsed().as_millis() as u64;
            match (&mut record.handle).now_or_never() {
                Some(Ok(Ok(()))) => {
                    report.completed += 1;
                }
                Some(Ok(Err(e))) => {
                    report.failed += 1;
                    error!(task = %record.name, id, age_ms, error = %e, "Background task failed");
                }
                Some(Err(join_err)) if join_err.is_panic() => {
                    report.failed += 1;
                    let panic = panic_message(&join_err.into_panic());
                    error!(task = %record.name, id, age_ms, panic = %panic, "Background task panicked");
                }
                Some(Err(_)) => {
                    report.failed += 1;
                    warn!(task = %record.name, id, age_ms, "Background task was aborted");
                }
                None => {
                    // Finished but not yet observable from here; try next sweep.
                    self.tasks.lock().insert(id, record);
                }
            }
        }

        if report.removed() > 0 {
            debug!(
                completed = report.completed,
                failed = report.failed,
                "Swept background tasks"
            );
        }
        report
    }
}

impl std::fmt::Debug for TaskTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskTracker")
            .field("pending", &self.len())
            .finish()
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    panic
        .downcast_ref::<String>()
        .map(|s| s.as_str())
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use std::time::Duration;

    fn tracker_should_panic() -> bool {
        true
    }

    async fn settle(tracker: &TaskTracker) {
        for _ in 0..50 {
            let all_done = tracker
                .tasks
                .lock()
                .values()
                .all(|record| record.handle.is_finished());
            if all_done {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_sweep_counts_outcomes() {
        let tracker = TaskTracker::new();
        tracker.track("ok", async { Ok(()) });
        tracker.track("err", async { Err(HandlerError::failed("boom")) });
        tracker.track("panic", async {
            if tracker_should_panic() {
                panic!("kaboom");
            }
            Ok(())
        });
        assert_eq!(tracker.len(), 3);

        settle(&tracker).await;
        let report = tracker.sweep();

        assert_eq!(report.completed, 1);
        assert_eq!(report.failed, 2);
        assert!(tracker.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_leaves_running_tasks() {
        let tracker = TaskTracker::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        tracker.track("waiting", async move {
            let _ = rx.await;
            Ok(())
        });

        assert_eq!(tracker.sweep(), SweepReport::default());
        assert_eq!(tracker.len(), 1);

        tx.send(()).unwrap();
        settle(&tracker).await;
        assert_eq!(tracker.sweep().completed, 1);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(&payload), "static str");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&payload), "owned");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(&payload), "unknown panic");
    }
}
