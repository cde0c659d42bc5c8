//! Command responses.
//!
//! A response answers an outbound `{"action", "params", "echo"}` frame. The
//! gateway copies `echo` back verbatim, so it may be a string or a number.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::ApiError;

/// Reply to an outbound command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    /// "ok", "async" or "failed".
    pub status: String,
    #[serde(default, deserialize_with = "lenient_code")]
    pub retcode: i64,
    #[serde(default)]
    pub data: Value,
    #[serde(default, deserialize_with = "lenient_text")]
    pub message: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub wording: String,
    #[serde(default)]
    pub echo: Option<Value>,
}

/// Descriptive fields never reject a response; a non-string becomes empty.
fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        _ => String::new(),
    })
}

fn lenient_code<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    Ok(Value::deserialize(deserializer)?.as_i64().unwrap_or_default())
}

impl ApiResponse {
    /// Whether the command succeeded.
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }

    /// The echo as a string key; numbers are rendered in decimal.
    pub fn echo_key(&self) -> Option<String> {
        match self.echo.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Converts into the `data` payload, or an [`ApiError::Failed`].
    pub fn into_result(self) -> Result<Value, ApiError> {
        if self.is_ok() || self.status == "async" {
            Ok(self.data)
        } else {
            let message = if self.wording.is_empty() {
                self.message
            } else {
                self.wording
            };
            Err(ApiError::Failed {
                retcode: self.retcode,
                message,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failed_response_prefers_wording() {
        let response: ApiResponse = serde_json::from_value(json!({
            "status": "failed",
            "retcode": 100,
            "message": "internal",
            "wording": "group not found",
        }))
        .unwrap();
        match response.into_result() {
            Err(ApiError::Failed { retcode, message }) => {
                assert_eq!(retcode, 100);
                assert_eq!(message, "group not found");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_ok_response_with_message_segments() {
        let response: ApiResponse = serde_json::from_value(json!({
            "status": "ok",
            "retcode": "0",
            "echo": "x:1",
            "data": {"message_id": 7},
            "message": [{"type": "text", "data": {"text": "hi"}}],
        }))
        .unwrap();
        assert_eq!(response.message, "");
        assert_eq!(response.retcode, 0);
        assert_eq!(response.echo_key().as_deref(), Some("x:1"));
        assert_eq!(response.into_result().unwrap()["message_id"], 7);
    }
}
