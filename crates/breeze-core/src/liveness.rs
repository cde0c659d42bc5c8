//! Online/offline detection from meta events.
//!
//! # Lifecycle
//!
//! A `lifecycle/connect` meta event means the gateway has just attached to
//! the bot account. Every operator gets a private message with the bot id
//! and connect time. This is not rate limited.
//!
//! # Heartbeat
//!
//! ```text
//!             online            offline
//! Unknown ─────────────▶ Online ◀──────▶ Offline
//!    │      "初始化"         "重新上线" / "掉线"
//!    └──────────────────────────────────▶ Offline
//!                 "掉线"
//! ```
//!
//! Every heartbeat updates the presence. A transition is *reported* through
//! the configured [`Notifiers`] only if at least `min_report_interval` has
//! passed since the previous report; the first report is always allowed.
//! A suppressed transition is not replayed later.

use std::time::Duration;

use parking_lot::Mutex;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};
use tracing::{info, warn};

use crate::bot::Bot;
use crate::event::{MetaEvent, MetaEventType};
use crate::notify::Notifiers;

/// Default minimum time between two status reports.
pub const DEFAULT_MIN_REPORT_INTERVAL: Duration = Duration::from_secs(60);

/// What the monitor believes about the bot account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Presence {
    /// No heartbeat seen yet.
    #[default]
    Unknown,
    Online,
    Offline,
}

impl Presence {
    fn from_online(online: bool) -> Self {
        if online { Self::Online } else { Self::Offline }
    }

    fn matches(self, online: bool) -> bool {
        self == Self::from_online(online)
    }
}

/// A reported presence transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    /// "初始化", "重新上线" or "掉线".
    pub label: &'static str,
    /// The new state.
    pub online: bool,
    /// Unix seconds when the change was recorded.
    pub at: i64,
}

#[derive(Debug, Default)]
struct LivenessState {
    presence: Presence,
    last_state_change: Option<i64>,
    last_report: Option<i64>,
}

/// Tracks bot presence and tells operators about changes.
#[derive(Debug)]
pub struct LivenessMonitor {
    state: Mutex<LivenessState>,
    min_report_interval: i64,
    operators: Vec<i64>,
    notifiers: Notifiers,
}

impl LivenessMonitor {
    /// Creates a monitor that greets `operators` on connect and reports
    /// heartbeat transitions through `notifiers`.
    pub fn new(operators: Vec<i64>, notifiers: Notifiers) -> Self {
        Self {
            state: Mutex::new(LivenessState::default()),
            min_report_interval: DEFAULT_MIN_REPORT_INTERVAL.as_secs() as i64,
            operators,
            notifiers,
        }
    }

    /// Sets the minimum time between two reports.
    pub fn with_min_report_interval(mut self, interval: Duration) -> Self {
        self.min_report_interval = interval.as_secs() as i64;
        self
    }

    /// Current presence.
    pub fn presence(&self) -> Presence {
        self.state.lock().presence
    }

    /// Unix seconds of the last reported change, if any.
    pub fn last_state_change(&self) -> Option<i64> {
        self.state.lock().last_state_change
    }

    /// Applies one heartbeat observed at `now` (unix seconds).
    ///
    /// Returns the change to report, or `None` if the state did not change
    /// or the report was suppressed by the rate limit. Presence is updated
    /// either way.
    pub fn evaluate_heartbeat(&self, online: bool, now: i64) -> Option<StatusChange> {
        let mut state = self.state.lock();
        let previous = state.presence;
        state.presence = Presence::from_online(online);

        if previous != Presence::Unknown && previous.matches(online) {
            return None;
        }

        let allowed = state
            .last_report
            .is_none_or(|last| now - last >= self.min_report_interval);
        if !allowed {
            return None;
        }

        state.last_state_change = Some(now);
        state.last_report = Some(now);
        Some(StatusChange {
            label: transition_label(previous, online),
            online,
            at: now,
        })
    }

    /// Handles one meta event.
    pub async fn on_meta(&self, bot: &Bot, self_id: i64, time: i64, meta: &MetaEvent) {
        if meta.is_connect() {
            self.announce_connect(bot, self_id, time).await;
            return;
        }

        if meta.meta_event_type == MetaEventType::Heartbeat {
            let now = OffsetDateTime::now_utc().unix_timestamp();
            if let Some(change) = self.evaluate_heartbeat(meta.is_online(), now) {
                self.report(&change, self_id, meta.interval.unwrap_or(0))
                    .await;
            }
        }
    }

    async fn announce_connect(&self, bot: &Bot, self_id: i64, time: i64) {
        let at = if time > 0 {
            time
        } else {
            OffsetDateTime::now_utc().unix_timestamp()
        };
        let text = format!(
            "Bot is online\nBot ID: {self_id}\nConnected at: {}",
            format_timestamp(at)
        );
        info!(bot_id = self_id, "Bot connected");

        for &operator in &self.operators {
            if let Err(e) = bot.send_private_msg(operator, text.as_str()).await {
                warn!(operator, error = %e, "Failed to send connect notice");
            }
        }
    }

    async fn report(&self, change: &StatusChange, self_id: i64, interval_ms: i64) {
        let title = format!("Bot status changed: {}", change.label);
        let content = format!(
            "Bot ID: {self_id}\nCurrent state: {}\nChanged at: {}\nHeartbeat interval: {}s",
            if change.online { "在线" } else { "离线" },
            format_timestamp(change.at),
            interval_ms as f64 / 1000.0
        );
        info!(bot_id = self_id, label = change.label, "Bot status changed");
        self.notifiers.broadcast(&title, &content).await;
    }
}

fn transition_label(previous: Presence, online: bool) -> &'static str {
    match (previous, online) {
        (Presence::Unknown, true) => "初始化",
        (_, false) => "掉线",
        (_, true) => "重新上线",
    }
}

/// Formats unix seconds as local `YYYY-MM-DD HH:MM:SS`.
pub fn format_timestamp(unix_secs: i64) -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetDateTime::from_unix_timestamp(unix_secs)
        .ok()
        .and_then(|t| t.to_offset(offset).format(format).ok())
        .unwrap_or_else(|| unix_secs.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NotifyResult;
    use crate::notify::Notifier;
    use crate::tasks::TaskTracker;
    use crate::transport::ConnectionHandle;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::Arc;

    fn monitor() -> LivenessMonitor {
        LivenessMonitor::new(vec![], Notifiers::new())
    }

    #[test]
    fn test_rate_limited_reporting() {
        let monitor = monitor();

        let first = monitor.evaluate_heartbeat(true, 0).unwrap();
        assert_eq!(first.label, "初始化");
        assert_eq!(monitor.presence(), Presence::Online);

        assert_eq!(monitor.evaluate_heartbeat(false, 30), None);
        assert_eq!(monitor.presence(), Presence::Offline);
        assert_eq!(monitor.last_state_change(), Some(0));

        let third = monitor.evaluate_heartbeat(true, 90).unwrap();
        assert_eq!(third.label, "重新上线");
        assert_eq!(third.at, 90);
    }

    #[test]
    fn test_unchanged_state_is_silent() {
        let monitor = monitor();
        assert!(monitor.evaluate_heartbeat(true, 0).is_some());
        assert_eq!(monitor.evaluate_heartbeat(true, 500), None);
    }

    #[test]
    fn test_first_heartbeat_offline() {
        let monitor = monitor();
        let change = monitor.evaluate_heartbeat(false, 10).unwrap();
        assert_eq!(change.label, "掉线");
        assert!(!change.online);

        let back = monitor.evaluate_heartbeat(true, 70).unwrap();
        assert_eq!(back.label, "重新上线");
    }

    #[test]
    fn test_custom_interval() {
        let monitor = monitor().with_min_report_interval(Duration::from_secs(5));
        monitor.evaluate_heartbeat(true, 0);
        assert!(monitor.evaluate_heartbeat(false, 5).is_some());
    }

    #[test]
    fn test_format_timestamp_shape() {
        let text = format_timestamp(1_700_000_000);
        assert_eq!(text.len(), 19);
        assert_eq!(&text[4..5], "-");
        assert_eq!(&text[13..14], ":");
    }

    struct Counting(Arc<Mutex<Vec<String>>>);

    #[async_trait]
    impl Notifier for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn notify(&self, title: &str, _content: &str) -> NotifyResult {
            self.0.lock().push(title.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_connect_notice_goes_to_every_operator() {
        let (handle, mut outbound) = ConnectionHandle::channel(8);
        let bot = Bot::new(handle, Arc::new(TaskTracker::new()));
        let monitor = LivenessMonitor::new(vec![1, 2], Notifiers::new());
        let meta: MetaEvent = serde_json::from_value(json!({
            "meta_event_type": "lifecycle", "sub_type": "connect",
        }))
        .unwrap();

        monitor.on_meta(&bot, 999, 1_700_000_000, &meta).await;

        let mut targets = Vec::new();
        for _ in 0..2 {
            let frame: Value = serde_json::from_slice(&outbound.frames.recv().await.unwrap()).unwrap();
            assert_eq!(frame["action"], "send_private_msg");
            assert!(frame["params"]["message"].as_str().unwrap().contains("999"));
            targets.push(frame["params"]["user_id"].as_i64().unwrap());
        }
        assert_eq!(targets, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_heartbeat_reports_through_notifiers() {
        let (handle, _outbound) = ConnectionHandle::channel(8);
        let bot = Bot::new(handle, Arc::new(TaskTracker::new()));
        let titles = Arc::new(Mutex::new(Vec::new()));
        let monitor =
            LivenessMonitor::new(vec![], Notifiers::new().with(Counting(Arc::clone(&titles))));
        let meta: MetaEvent = serde_json::from_value(json!({
            "meta_event_type": "heartbeat", "status": {"online": true}, "interval": 5000,
        }))
        .unwrap();

        monitor.on_meta(&bot, 1, 0, &meta).await;
        monitor.on_meta(&bot, 1, 0, &meta).await;

        assert_eq!(*titles.lock(), vec!["Bot status changed: 初始化".to_string()]);
    }
}
