use crate::error::ChatError;
use crate::sse::{result_text, StreamEvent};
use crate::state::ChatMessage;
use serde::{Deserialize, Serialize};

/// One tool call the assistant made during a turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub result: Option<String>,
}

impl ToolInvocation {
    pub fn is_pending(&self) -> bool {
        self.result.is_none()
    }
}

/// The in-progress assistant reply for one user message.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamingTurnState {
    pub active: bool,
    pub assembled_text: String,
    pub turn_id: Option<String>,
    pub tool_invocations: Vec<ToolInvocation>,
}

/// How a turn ended when the reducer saw a terminal event.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Completed(ChatMessage),
    Failed(ChatError),
}

impl StreamingTurnState {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn started() -> Self {
        Self {
            active: true,
            ..Self::default()
        }
    }

    pub fn reset(&mut self) {
        *self = Self::idle();
    }

    pub fn tool(&self, id: &str) -> Option<&ToolInvocation> {
        self.tool_invocations.iter().find(|tool| tool.id == id)
    }

    /// Apply one stream event. Returns the outcome when the event ends the
    /// turn, in which case the state is already back to idle.
    ///
    /// Events that arrive while no turn is active are ignored.
    pub fn apply(&mut self, event: StreamEvent) -> Option<TurnOutcome> {
        if !self.active {
            tracing::trace!(kind = event.kind(), "dropping event for inactive turn");
            return None;
        }
        match event {
            StreamEvent::MessageStart { message_id } => {
                self.turn_id = Some(message_id);
                None
            }
            StreamEvent::TextDelta { delta } => {
                self.assembled_text.push_str(&delta);
                None
            }
            StreamEvent::TextDone { text } => {
                if text != self.assembled_text {
                    tracing::debug!(
                        assembled = self.assembled_text.len(),
                        reported = text.len(),
                        "text_done disagrees with assembled deltas"
                    );
                }
                None
            }
            StreamEvent::ToolCallStart {
                tool_name,
                tool_call_id,
            } => {
                if self.tool(&tool_call_id).is_some() {
                    tracing::debug!(%tool_call_id, "ignoring duplicate tool_call_start");
                } else {
                    self.tool_invocations.push(ToolInvocation {
                        id: tool_call_id,
                        name: tool_name,
                        result: None,
                    });
                }
                None
            }
            StreamEvent::ToolCallDone {
                tool_call_id,
                result,
            } => {
                match self
                    .tool_invocations
                    .iter_mut()
                    .find(|tool| tool.id == tool_call_id)
                {
                    Some(tool) if tool.result.is_none() => {
                        tool.result = Some(result_text(&result));
                    }
                    Some(_) => {
                        tracing::debug!(%tool_call_id, "tool call already has a result");
                    }
                    None => {
                        tracing::debug!(%tool_call_id, "tool_call_done for unknown tool call");
                    }
                }
                None
            }
            StreamEvent::MessageDone { message } => {
                self.reset();
                Some(TurnOutcome::Completed(message))
            }
            StreamEvent::Error { code, message } => {
                self.reset();
                Some(TurnOutcome::Failed(ChatError::Protocol {
                    code: code.unwrap_or_else(|| "error".to_string()),
                    message,
                }))
            }
            StreamEvent::Ping => None,
        }
    }

    /// End the turn because the transport failed.
    pub fn fail(&mut self, error: ChatError) -> TurnOutcome {
        self.reset();
        TurnOutcome::Failed(error)
    }
}
