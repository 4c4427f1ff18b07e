// ABOUTME: Decodes raw upstream socket frames into update/state notifications
// ABOUTME: Unwraps the nested JSON content buffer and tolerates malformed payloads
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 dravr.ai

use serde_json::Value;
use tracing::debug;

/// A decoded upstream notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Partial content; `None` when the nested buffer failed to parse
    Update(Option<ContentBuffer>),
    /// Generation state change
    State {
        /// Whether upstream is still producing content
        in_progress: bool,
    },
    /// Any other well-formed frame (acks, heartbeats, ...)
    Other,
}

/// Content carried by one `update` notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentBuffer {
    /// Content channel, e.g. `thinking` or `chat`
    pub kind: String,
    /// Snapshot or delta text, depending on the channel's delivery mode
    pub content: String,
}

impl ContentBuffer {
    /// Create a content buffer
    #[must_use]
    pub fn new(kind: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            content: content.into(),
        }
    }
}

/// Decode one text frame
///
/// Returns `None` when the frame is not JSON at all; such frames are
/// dropped without touching any state.
#[must_use]
pub fn decode(text: &str) -> Option<Notification> {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, frame_len = text.len(), "Dropping non-JSON socket frame");
            return None;
        }
    };

    let notification = match value.get("type").and_then(Value::as_str) {
        Some("update") => Notification::Update(decode_buffer(value.get("buffer"))),
        Some("state") => Notification::State {
            in_progress: in_progress_flag(&value),
        },
        _ => Notification::Other,
    };
    Some(notification)
}

/// Read the `inProgress` flag; absent or non-boolean counts as finished
fn in_progress_flag(value: &Value) -> bool {
    value
        .get("state")
        .and_then(|s| s.get("inProgress"))
        .or_else(|| value.get("inProgress"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Unwrap the nested buffer, which upstream sends as a JSON-encoded string
fn decode_buffer(raw: Option<&Value>) -> Option<ContentBuffer> {
    let nested = match raw {
        None | Some(Value::Null) => Value::Object(serde_json::Map::new()),
        Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(v) => v,
            Err(e) => {
                debug!(error = %e, "Dropping update with unparsable buffer");
                return None;
            }
        },
        Some(other) => other.clone(),
    };

    let Some(kind) = nested
        .get("type")
        .or_else(|| nested.get("kind"))
        .and_then(Value::as_str)
    else {
        debug!("Dropping update buffer without a content kind");
        return None;
    };

    let content = nested
        .get("content")
        .and_then(Value::as_str)
        .or_else(|| nested.get("text").and_then(Value::as_str))
        .or_else(|| {
            nested
                .get(kind)
                .and_then(|inner| inner.get("text"))
                .and_then(Value::as_str)
        })
        .unwrap_or_default();

    Some(ContentBuffer::new(kind, content))
}
