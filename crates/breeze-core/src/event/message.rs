//! Message events.
//!
//! ```text
//! MessageEvent { message_type, sub_type, message_id, user_id, group_id?, … }
//! ├── message_type = "group"    → group_id is set
//! └── message_type = "private"  → group_id is absent
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Shared Types
// ============================================================================

/// Kind of chat a message arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Group,
    Private,
    /// Any `message_type` this client does not route.
    #[serde(other)]
    Other,
}

/// Message sender information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sender {
    /// User ID.
    #[serde(default)]
    pub user_id: Option<i64>,
    /// Nickname.
    #[serde(default)]
    pub nickname: Option<String>,
    /// Group card (group nickname).
    #[serde(default)]
    pub card: Option<String>,
    /// Group role ("owner", "admin", "member").
    #[serde(default)]
    pub role: Option<String>,
}

impl Sender {
    /// Whether the sender is owner or admin of the group.
    pub fn is_group_admin(&self) -> bool {
        matches!(self.role.as_deref(), Some("owner" | "admin"))
    }

    /// Card if set, otherwise nickname.
    pub fn display_name(&self) -> Option<&str> {
        self.card
            .as_deref()
            .filter(|card| !card.is_empty())
            .or(self.nickname.as_deref())
    }
}

/// Where a reply should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatTarget {
    /// A group chat.
    Group(i64),
    /// A private chat with a user.
    Private(i64),
}

// ============================================================================
// MessageEvent
// ============================================================================

/// A chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    /// Chat kind.
    pub message_type: MessageType,
    /// Sub-type ("normal", "friend", "group", …).
    #[serde(default)]
    pub sub_type: String,
    /// Message ID.
    #[serde(default)]
    pub message_id: i64,
    /// Sender's user ID.
    pub user_id: i64,
    /// Group ID for group messages.
    #[serde(default)]
    pub group_id: Option<i64>,
    /// Raw message string (CQ codes or plain text).
    #[serde(default)]
    pub raw_message: String,
    /// Message content (array of segments, or a string).
    #[serde(default)]
    pub message: Value,
    /// Sender information.
    #[serde(default)]
    pub sender: Sender,
}

impl MessageEvent {
    /// Whether this message came from a group.
    pub fn is_group(&self) -> bool {
        self.message_type == MessageType::Group
    }

    /// The chat a reply to this message should go to.
    pub fn chat(&self) -> Option<ChatTarget> {
        match (self.message_type, self.group_id) {
            (MessageType::Group, Some(group_id)) => Some(ChatTarget::Group(group_id)),
            (MessageType::Private, _) => Some(ChatTarget::Private(self.user_id)),
            _ => None,
        }
    }

    /// Extracts plain text from the message segments.
    ///
    /// Falls back to `raw_message` when the message is not a segment array.
    pub fn plain_text(&self) -> String {
        match &self.message {
            Value::Array(_) => extract_plain_text(&self.message),
            Value::String(text) => text.clone(),
            _ => self.raw_message.clone(),
        }
    }
}

/// Concatenates the `text` segments of a OneBot message array.
pub fn extract_plain_text(message: &Value) -> String {
    let Value::Array(segments) = message else {
        return String::new();
    };
    segments
        .iter()
        .filter_map(|seg| {
            if seg.get("type")?.as_str()? == "text" {
                seg.get("data")?.get("text")?.as_str().map(String::from)
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chat_target() {
        let group: MessageEvent = serde_json::from_value(json!({
            "message_type": "group", "user_id": 1, "group_id": 2
        }))
        .unwrap();
        assert_eq!(group.chat(), Some(ChatTarget::Group(2)));

        let private: MessageEvent = serde_json::from_value(json!({
            "message_type": "private", "user_id": 1
        }))
        .unwrap();
        assert_eq!(private.chat(), Some(ChatTarget::Private(1)));
        assert!(!private.is_group());
    }

    #[test]
    fn test_plain_text_skips_non_text_segments() {
        let message = json!([
            {"type": "at", "data": {"qq": "1"}},
            {"type": "text", "data": {"text": " hello"}},
            {"type": "image", "data": {"file": "x.png"}},
            {"type": "text", "data": {"text": " world"}},
        ]);
        assert_eq!(extract_plain_text(&message), " hello world");
    }

    #[test]
    fn test_sender_display_name() {
        let sender = Sender {
            nickname: Some("nick".into()),
            card: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(sender.display_name(), Some("nick"));
        assert!(!sender.is_group_admin());
    }
}
