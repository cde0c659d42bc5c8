//! Notice events.

use serde::{Deserialize, Serialize};

/// A notice (group membership change, recall, poke, …).
///
/// Only the identifying fields are typed; anything else is read from
/// [`Event::raw`](crate::Event::raw).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoticeEvent {
    /// Notice type ("group_increase", "group_recall", "notify", …).
    pub notice_type: String,
    #[serde(default)]
    pub sub_type: Option<String>,
    #[serde(default)]
    pub group_id: Option<i64>,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub operator_id: Option<i64>,
    #[serde(default)]
    pub target_id: Option<i64>,
}
