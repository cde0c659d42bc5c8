//! OneBot v11 event envelope.
//!
//! Every inbound frame decodes into one [`Event`]: the fields common to all
//! events (`time`, `self_id`), a typed [`EventKind`], and the original JSON
//! value for fields the typed model does not name.
//!
//! # Classification
//!
//! ```text
//! raw frame
//! ├── status == "ok"            → Response   (checked before post_type)
//! ├── status, no post_type      → Response   (failed command response)
//! └── post_type
//!     ├── "message"             → Message    (group | private | other)
//!     ├── "notice"              → Notice
//!     ├── "request"             → Request
//!     └── "meta_event"          → Meta       (lifecycle | heartbeat)
//! ```
//!
//! Heartbeat frames carry a `status` *object*; only a string `status` marks
//! a command response, so heartbeats still classify by `post_type`.
//!
//! Decoding is pure: the same frame always yields an equal, independently
//! owned [`Event`].

pub mod message;
pub mod meta;
pub mod notice;
pub mod request;
pub mod response;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DecodeError, DecodeResult};

pub use message::*;
pub use meta::*;
pub use notice::*;
pub use request::*;
pub use response::*;

// ============================================================================
// Event
// ============================================================================

/// One decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Unix timestamp (seconds) when the event occurred. Zero for responses.
    pub time: i64,
    /// The bot account that received the event. Zero for responses.
    pub self_id: i64,
    /// Typed payload.
    pub kind: EventKind,
    /// The frame as received.
    pub raw: Value,
}

/// Typed payload of an [`Event`].
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// `post_type = "message"`.
    Message(MessageEvent),
    /// `post_type = "notice"`.
    Notice(NoticeEvent),
    /// `post_type = "request"`.
    Request(RequestEvent),
    /// `post_type = "meta_event"`.
    Meta(MetaEvent),
    /// A reply to an outbound command.
    Response(ApiResponse),
}

/// The route an event takes through the dispatcher.
///
/// Handlers declare which routes they accept; see
/// [`Handler::accepts`](crate::Handler::accepts).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    GroupMessage,
    PrivateMessage,
    Notice,
    Request,
    Meta,
    Response,
}

impl Route {
    /// Returns the route name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GroupMessage => "message.group",
            Self::PrivateMessage => "message.private",
            Self::Notice => "notice",
            Self::Request => "request",
            Self::Meta => "meta_event",
            Self::Response => "response",
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields shared by every `post_type` event.
#[derive(Debug, Default, Deserialize, Serialize)]
struct Header {
    #[serde(default)]
    time: i64,
    #[serde(default)]
    self_id: i64,
}

impl Event {
    /// Decodes a raw text frame.
    pub fn decode(raw: &str) -> DecodeResult<Self> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
        Self::from_value(value)
    }

    /// Classifies and decodes an already parsed JSON value.
    pub fn from_value(value: Value) -> DecodeResult<Self> {
        if !value.is_object() {
            return Err(DecodeError::InvalidShape {
                kind: "frame",
                reason: "expected a JSON object".into(),
            });
        }

        let status = value.get("status").and_then(Value::as_str);
        let post_type = value.get("post_type").and_then(Value::as_str);

        let kind = match (status, post_type) {
            (Some("ok"), _) | (Some(_), None) => {
                return Ok(Self {
                    time: 0,
                    self_id: 0,
                    kind: EventKind::Response(parse_as("response", &value)?),
                    raw: value,
                });
            }
            (_, Some("message")) => EventKind::Message(parse_as("message", &value)?),
            (_, Some("notice")) => EventKind::Notice(parse_as("notice", &value)?),
            (_, Some("request")) => EventKind::Request(parse_as("request", &value)?),
            (_, Some("meta_event")) => EventKind::Meta(parse_as("meta_event", &value)?),
            (_, Some(other)) => return Err(DecodeError::UnknownPostType(other.to_string())),
            (None, None) => return Err(DecodeError::Unclassified),
        };

        let header: Header = parse_as("header", &value)?;
        Ok(Self {
            time: header.time,
            self_id: header.self_id,
            kind,
            raw: value,
        })
    }

    /// Returns the dispatch route, or `None` for messages of an unknown
    /// `message_type`.
    pub fn route(&self) -> Option<Route> {
        match &self.kind {
            EventKind::Message(msg) => match msg.message_type {
                MessageType::Group => Some(Route::GroupMessage),
                MessageType::Private => Some(Route::PrivateMessage),
                MessageType::Other => None,
            },
            EventKind::Notice(_) => Some(Route::Notice),
            EventKind::Request(_) => Some(Route::Request),
            EventKind::Meta(_) => Some(Route::Meta),
            EventKind::Response(_) => Some(Route::Response),
        }
    }

    /// Returns the message payload if this is a message event.
    pub fn as_message(&self) -> Option<&MessageEvent> {
        match &self.kind {
            EventKind::Message(msg) => Some(msg),
            _ => None,
        }
    }

    /// Returns the notice payload if this is a notice event.
    pub fn as_notice(&self) -> Option<&NoticeEvent> {
        match &self.kind {
            EventKind::Notice(notice) => Some(notice),
            _ => None,
        }
    }

    /// Returns the request payload if this is a request event.
    pub fn as_request(&self) -> Option<&RequestEvent> {
        match &self.kind {
            EventKind::Request(request) => Some(request),
            _ => None,
        }
    }

    /// Returns the meta payload if this is a meta event.
    pub fn as_meta(&self) -> Option<&MetaEvent> {
        match &self.kind {
            EventKind::Meta(meta) => Some(meta),
            _ => None,
        }
    }

    /// Returns the response payload if this is a command response.
    pub fn as_response(&self) -> Option<&ApiResponse> {
        match &self.kind {
            EventKind::Response(response) => Some(response),
            _ => None,
        }
    }

    /// A short one-line description for logs.
    pub fn summary(&self) -> String {
        match &self.kind {
            EventKind::Message(msg) => match msg.group_id {
                Some(group_id) => format!(
                    "group message {} from {} in {}",
                    msg.message_id, msg.user_id, group_id
                ),
                None => format!("private message {} from {}", msg.message_id, msg.user_id),
            },
            EventKind::Notice(notice) => format!("notice {}", notice.notice_type),
            EventKind::Request(request) => format!("request {}", request.request_type),
            EventKind::Meta(meta) => format!("meta_event {}", meta.meta_event_type.as_str()),
            EventKind::Response(response) => format!(
                "response status={} echo={}",
                response.status,
                response.echo_key().as_deref().unwrap_or("-")
            ),
        }
    }
}

/// Deserializes a typed view of `value` without consuming it.
fn parse_as<T: DeserializeOwned>(kind: &'static str, value: &Value) -> DecodeResult<T> {
    T::deserialize(value).map_err(|e| DecodeError::InvalidShape {
        kind,
        reason: e.to_string(),
    })
}
