use crate::api::ApiClient;
use crate::error::ChatError;
use crate::sse::{decode_event, StreamEvent};
use crate::state::{ChatMessage, InputType, SessionTarget};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

/// Ordered events of one assistant turn.
pub type EventStream = BoxStream<'static, Result<StreamEvent, ChatError>>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Http,
    Mock,
}

impl TransportKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "http" | "sse" => Some(Self::Http),
            "mock" => Some(Self::Mock),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MessageRequest {
    pub target: SessionTarget,
    pub text: String,
    pub input_type: InputType,
}

/// Opens the streamed reply for one user message.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn open(&self, request: &MessageRequest) -> Result<EventStream, ChatError>;
}

/// Server-sent events over HTTP.
pub struct HttpTransport {
    api: ApiClient,
}

impl HttpTransport {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl MessageTransport for HttpTransport {
    async fn open(&self, request: &MessageRequest) -> Result<EventStream, ChatError> {
        let response = self
            .api
            .post_message_stream(&request.target, &request.text, request.input_type)
            .await?;
        tracing::debug!(
            reading_id = %request.target.reading_id,
            session_id = %request.target.session_id,
            "message stream opened"
        );
        let events = response
            .bytes_stream()
            .eventsource()
            .filter_map(|frame| async move {
                match frame {
                    Ok(frame) => decode_event(&frame.event, &frame.data).transpose(),
                    Err(err) => Some(Err(ChatError::Connection(format!(
                        "SSE stream error: {err}"
                    )))),
                }
            });
        Ok(events.boxed())
    }
}

/// Offline transport that replays a deterministic assistant turn.
#[derive(Debug, Clone)]
pub struct ScriptedTransport {
    delay: Duration,
    tool: Option<String>,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(20),
            tool: Some("search_book".to_string()),
        }
    }
}

impl ScriptedTransport {
    pub fn new(delay: Duration, tool: Option<String>) -> Self {
        Self { delay, tool }
    }

    /// The events this transport will play back for `request`.
    pub fn script(&self, request: &MessageRequest) -> Vec<StreamEvent> {
        let message_id = Uuid::new_v4().to_string();
        let reply = format!(
            "[Mock] You said ({}): {}",
            request.input_type.as_str(),
            request.text.trim()
        );

        let mut events = vec![StreamEvent::MessageStart {
            message_id: message_id.clone(),
        }];
        if let Some(tool) = &self.tool {
            let tool_call_id = format!("call_{}", Uuid::new_v4().simple());
            events.push(StreamEvent::ToolCallStart {
                tool_name: tool.clone(),
                tool_call_id: tool_call_id.clone(),
            });
            events.push(StreamEvent::ToolCallDone {
                tool_call_id,
                result: json!({ "status": "ok" }),
            });
        }
        events.extend(
            reply
                .split_inclusive(' ')
                .map(|word| StreamEvent::TextDelta {
                    delta: word.to_string(),
                }),
        );
        events.push(StreamEvent::TextDone {
            text: reply.clone(),
        });
        events.push(StreamEvent::MessageDone {
            message: ChatMessage::assistant(message_id, reply),
        });
        events
    }
}

#[async_trait]
impl MessageTransport for ScriptedTransport {
    async fn open(&self, request: &MessageRequest) -> Result<EventStream, ChatError> {
        let delay = self.delay;
        let events = stream::iter(self.script(request)).then(move |event| async move {
            tokio::time::sleep(delay).await;
            Ok(event)
        });
        Ok(events.boxed())
    }
}
