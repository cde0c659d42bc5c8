//! Request events.
//!
//! ```text
//! RequestEvent { request_type, sub_type?, user_id, group_id?, comment, flag }
//! ├── request_type = "friend"
//! └── request_type = "group"   (sub_type: "add" | "invite")
//! ```

use serde::{Deserialize, Serialize};

/// A friend or group request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEvent {
    pub request_type: String,
    #[serde(default)]
    pub sub_type: Option<String>,
    pub user_id: i64,
    #[serde(default)]
    pub group_id: Option<i64>,
    #[serde(default)]
    pub comment: String,
    /// Opaque flag to pass back when approving or rejecting.
    #[serde(default)]
    pub flag: String,
}
