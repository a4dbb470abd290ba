//! Wire events of the streamed message endpoint.

use crate::error::ChatError;
use crate::state::ChatMessage;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One event of an assistant turn, in the shape the backend sends it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart {
        message_id: String,
    },
    TextDelta {
        delta: String,
    },
    TextDone {
        text: String,
    },
    ToolCallStart {
        tool_name: String,
        tool_call_id: String,
    },
    ToolCallDone {
        tool_call_id: String,
        #[serde(default)]
        result: Value,
    },
    MessageDone {
        message: ChatMessage,
    },
    Error {
        #[serde(default)]
        code: Option<String>,
        message: String,
    },
    Ping,
}

impl StreamEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MessageStart { .. } => "message_start",
            Self::TextDelta { .. } => "text_delta",
            Self::TextDone { .. } => "text_done",
            Self::ToolCallStart { .. } => "tool_call_start",
            Self::ToolCallDone { .. } => "tool_call_done",
            Self::MessageDone { .. } => "message_done",
            Self::Error { .. } => "error",
            Self::Ping => "ping",
        }
    }
}

const KNOWN_KINDS: [&str; 8] = [
    "message_start",
    "text_delta",
    "text_done",
    "tool_call_start",
    "tool_call_done",
    "message_done",
    "error",
    "ping",
];

/// Decode one SSE frame.
///
/// The kind comes from the `event:` field when the server sets one, otherwise
/// from a `type` member of the JSON data. Returns `Ok(None)` for frames of a
/// kind this client does not know.
pub fn decode_event(event_name: &str, data: &str) -> Result<Option<StreamEvent>, ChatError> {
    let mut payload: Value = if data.trim().is_empty() {
        Value::Object(Default::default())
    } else {
        serde_json::from_str(data)
            .map_err(|err| ChatError::Decode(format!("{err}, data: {data}")))?
    };
    let Some(object) = payload.as_object_mut() else {
        return Err(ChatError::Decode(format!("expected a JSON object, data: {data}")));
    };

    let kind = if !event_name.is_empty() && event_name != "message" {
        event_name.to_string()
    } else {
        match object.get("type").and_then(Value::as_str) {
            Some(kind) => kind.to_string(),
            None => return Err(ChatError::Decode(format!("event without a type: {data}"))),
        }
    };
    if !KNOWN_KINDS.contains(&kind.as_str()) {
        tracing::debug!(kind = %kind, "skipping unknown stream event");
        return Ok(None);
    }
    object.insert("type".into(), Value::String(kind));

    serde_json::from_value(payload)
        .map(Some)
        .map_err(|err| ChatError::Decode(format!("{err}, data: {data}")))
}

/// Render a tool result for display: strings as-is, anything else as JSON.
pub fn result_text(result: &Value) -> String {
    match result {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
