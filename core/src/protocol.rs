//! Protocol Codec: the message envelope plus the typed payload shapes each
//! `type` carries. Decoding happens in two passes — `decode` validates only
//! that `type` is present and a string; the Connection Handler then
//! re-deserializes `payload` into the per-type struct defined here and
//! applies bound/shape validation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("frame is missing a string `type` field")]
    MissingType,
    #[error("frame is not valid JSON: {0}")]
    NotJson(String),
}

/// Untyped envelope. `payload` stays a raw `Value` until the handler knows
/// which typed struct to deserialize it into.
#[derive(Debug, Clone, Deserialize)]
pub struct Frame {
    #[serde(rename = "type")]
    pub ty: String,
    pub id: Option<String>,
    pub payload: Option<serde_json::Value>,
}

/// Decode one inbound text frame. Rejects anything without a string `type`;
/// does not otherwise inspect `payload`.
pub fn decode(text: &str) -> Result<Frame, CodecError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| CodecError::NotJson(e.to_string()))?;
    let ty = value
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or(CodecError::MissingType)?
        .to_string();
    let id = value.get("id").and_then(|v| v.as_str()).map(str::to_string);
    let payload = value.get("payload").cloned();
    Ok(Frame { ty, id, payload })
}

/// Outbound envelope. A reply to a client request carries the same `id` the
/// request had; unsolicited server events carry `id: None` and it is omitted
/// from the wire representation.
#[derive(Debug, Serialize)]
pub struct OutFrame<T: Serialize> {
    #[serde(rename = "type")]
    pub ty: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<T>,
}

impl<T: Serialize> OutFrame<T> {
    pub fn reply(ty: &'static str, id: Option<String>, payload: T) -> Self {
        Self {
            ty,
            id,
            payload: Some(payload),
        }
    }

    pub fn event(ty: &'static str, payload: T) -> Self {
        Self {
            ty,
            id: None,
            payload: Some(payload),
        }
    }

    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"type":"{}"}}"#, self.ty)
        })
    }
}

/// A bare frame with no payload (e.g. `pong`).
pub fn bare_frame(ty: &'static str, id: Option<String>) -> String {
    let frame = OutFrame::<()> { ty, id, payload: None };
    frame.to_text()
}

// ---- typed client→server payloads ----
//
// Numeric dimensions are deserialized as `i64` rather than `u16` so an
// out-of-range or negative value reaches the handler as a normal value to
// reject with `InvalidInput`, instead of failing JSON deserialization itself
// (which would otherwise surface as an opaque codec error).

#[derive(Debug, Deserialize, Default)]
pub struct SessionCreatePayload {
    pub name: Option<String>,
    pub shell: Option<String>,
    pub cwd: Option<String>,
    pub cols: Option<i64>,
    pub rows: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SessionIdPayload {
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SessionRenamePayload {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct SessionMovePayload {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "categoryId")]
    pub category_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TerminalDataPayload {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub data: String,
}

#[derive(Debug, Deserialize)]
pub struct TerminalResizePayload {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub cols: i64,
    pub rows: i64,
}

#[derive(Debug, Deserialize)]
pub struct CategoryCreatePayload {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CategoryIdPayload {
    #[serde(rename = "categoryId")]
    pub category_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CategoryRenamePayload {
    #[serde(rename = "categoryId")]
    pub category_id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CategoryReorderPayload {
    #[serde(rename = "orderedIds")]
    pub ordered_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CategoryTogglePayload {
    #[serde(rename = "categoryId")]
    pub category_id: String,
    pub collapsed: bool,
}

#[derive(Debug, Deserialize, Default)]
pub struct NotificationPreferencesSetPayload {
    #[serde(rename = "browserEnabled")]
    pub browser_enabled: Option<bool>,
    #[serde(rename = "visualEnabled")]
    pub visual_enabled: Option<bool>,
    #[serde(rename = "notifyOnInput")]
    pub notify_on_input: Option<bool>,
    #[serde(rename = "notifyOnCompleted")]
    pub notify_on_completed: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_rejects_missing_type() {
        let err = decode(r#"{"id":"1","payload":{}}"#).unwrap_err();
        assert!(matches!(err, CodecError::MissingType));
    }

    #[test]
    fn decode_rejects_non_string_type() {
        let err = decode(r#"{"type":42}"#).unwrap_err();
        assert!(matches!(err, CodecError::MissingType));
    }

    #[test]
    fn decode_accepts_minimal_frame() {
        let frame = decode(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(frame.ty, "ping");
        assert!(frame.id.is_none());
        assert!(frame.payload.is_none());
    }

    #[test]
    fn decode_preserves_correlation_id() {
        let frame = decode(r#"{"type":"session.create","id":"req-1","payload":{"name":"T"}}"#).unwrap();
        assert_eq!(frame.id.as_deref(), Some("req-1"));
        let payload: SessionCreatePayload =
            serde_json::from_value(frame.payload.unwrap()).unwrap();
        assert_eq!(payload.name.as_deref(), Some("T"));
    }

    #[test]
    fn out_frame_omits_absent_id() {
        let frame = OutFrame::event("session.list", serde_json::json!([]));
        assert_eq!(frame.to_text(), r#"{"type":"session.list","payload":[]}"#);
    }

    #[test]
    fn out_frame_reply_carries_request_id() {
        let frame = OutFrame::reply("session.created", Some("42".to_string()), serde_json::json!({"id":"abc"}));
        assert_eq!(
            frame.to_text(),
            r#"{"type":"session.created","id":"42","payload":{"id":"abc"}}"#
        );
    }
}
