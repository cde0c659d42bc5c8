//! Meta events.
//!
//! ```text
//! MetaEvent { meta_event_type, sub_type?, status?, interval? }
//! ├── lifecycle  (sub_type: "connect" | "enable" | "disable")
//! └── heartbeat  (status.online, interval in milliseconds)
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of meta event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetaEventType {
    Lifecycle,
    Heartbeat,
    #[serde(other)]
    Other,
}

impl MetaEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lifecycle => "lifecycle",
            Self::Heartbeat => "heartbeat",
            Self::Other => "other",
        }
    }
}

/// Heartbeat status info.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatStatus {
    /// App initialized.
    #[serde(default)]
    pub app_initialized: Option<bool>,
    /// App enabled.
    #[serde(default)]
    pub app_enabled: Option<bool>,
    /// App good.
    #[serde(default)]
    pub app_good: Option<bool>,
    /// Online status.
    #[serde(default)]
    pub online: Option<bool>,
    /// Good status.
    #[serde(default)]
    pub good: Option<bool>,
    /// Additional status fields.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// A meta event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaEvent {
    pub meta_event_type: MetaEventType,
    #[serde(default)]
    pub sub_type: Option<String>,
    /// Heartbeat status.
    #[serde(default)]
    pub status: Option<HeartbeatStatus>,
    /// Heartbeat interval in milliseconds.
    #[serde(default)]
    pub interval: Option<i64>,
}

impl MetaEvent {
    /// `lifecycle` with `sub_type = "connect"`.
    pub fn is_connect(&self) -> bool {
        self.meta_event_type == MetaEventType::Lifecycle && self.sub_type.as_deref() == Some("connect")
    }

    /// `status.online`; a missing status or field counts as offline.
    pub fn is_online(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|status| status.online)
            .unwrap_or(false)
    }
}
