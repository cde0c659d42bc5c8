//! Operator notification channels.
//!
//! Concrete webhook or chat integrations live outside this crate; they plug
//! in by implementing [`Notifier`]. [`Notifiers`] fans a notification out
//! to all of them. Each channel is tried independently and a failure is
//! only logged.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::NotifyResult;

/// One notification channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Channel name used in logs.
    fn name(&self) -> &str;

    /// Delivers one notification.
    async fn notify(&self, title: &str, content: &str) -> NotifyResult;
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, title: &str, content: &str) -> NotifyResult {
        info!(title = %title, "{content}");
        Ok(())
    }
}

/// The configured set of notification channels.
#[derive(Clone, Default)]
pub struct Notifiers {
    channels: Vec<Arc<dyn Notifier>>,
}

impl Notifiers {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a channel (builder pattern).
    pub fn with(mut self, notifier: impl Notifier + 'static) -> Self {
        self.channels.push(Arc::new(notifier));
        self
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether no channels are configured.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Sends to every channel. Returns how many succeeded.
    pub async fn broadcast(&self, title: &str, content: &str) -> usize {
        let mut delivered = 0;
        for channel in &self.channels {
            match channel.notify(title, content).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!(notifier = %channel.name(), error = %e, "Notification failed"),
            }
        }
        delivered
    }
}

impl std::fmt::Debug for Notifiers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.channels.iter().map(|c| c.name()).collect();
        f.debug_struct("Notifiers").field("channels", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NotifyError;
    use parking_lot::Mutex;

    struct Failing;

    #[async_trait]
    impl Notifier for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn notify(&self, _title: &str, _content: &str) -> NotifyResult {
            Err(NotifyError::Delivery {
                channel: "failing".into(),
                reason: "unreachable".into(),
            })
        }
    }

    #[derive(Clone, Default)]
    struct Recording(Arc<Mutex<Vec<String>>>);

    #[async_trait]
    impl Notifier for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        async fn notify(&self, title: &str, _content: &str) -> NotifyResult {
            self.0.lock().push(title.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_other_channels() {
        let recording = Recording::default();
        let notifiers = Notifiers::new()
            .with(Failing)
            .with(recording.clone())
            .with(LogNotifier);

        let delivered = notifiers.broadcast("title", "content").await;

        assert_eq!(delivered, 2);
        assert_eq!(*recording.0.lock(), vec!["title".to_string()]);
    }
}
