use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// How the user produced a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    #[default]
    Text,
    Voice,
}

impl InputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Voice => "voice",
        }
    }
}

/// A message as stored by the backend. The final assistant reply of a turn
/// arrives in this shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub id: String,
    pub role: MessageRole,
    pub message: String,
    #[serde(default)]
    pub input_type: InputType,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn assistant(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: MessageRole::Assistant,
            message: message.into(),
            input_type: InputType::Text,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReadingStatus {
    NotStarted,
    Reading,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookEmbed {
    pub title: String,
    #[serde(default)]
    pub author: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reading {
    pub id: String,
    pub book: BookEmbed,
    pub status: ReadingStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    DuringReading,
    AfterCompletion,
    Reflection,
}

impl SessionType {
    /// Session type the backend expects for a conversation started while the
    /// reading is in the given state.
    pub fn for_status(status: ReadingStatus) -> Self {
        match status {
            ReadingStatus::NotStarted | ReadingStatus::Reading => Self::DuringReading,
            ReadingStatus::Completed => Self::AfterCompletion,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub reading_id: String,
    pub session_type: SessionType,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// Identifies the conversation a chat client sends into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTarget {
    pub reading_id: String,
    pub session_id: String,
}

impl SessionTarget {
    pub fn new(reading_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            reading_id: reading_id.into(),
            session_id: session_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_type_follows_reading_status() {
        assert_eq!(
            SessionType::for_status(ReadingStatus::Reading),
            SessionType::DuringReading
        );
        assert_eq!(
            SessionType::for_status(ReadingStatus::NotStarted),
            SessionType::DuringReading
        );
        assert_eq!(
            SessionType::for_status(ReadingStatus::Completed),
            SessionType::AfterCompletion
        );
    }

    #[test]
    fn decodes_backend_message() {
        let raw = r#"{
            "id": "m1",
            "role": "assistant",
            "message": "こんにちは！",
            "input_type": "text",
            "created_at": "2025-01-01T00:00:00Z"
        }"#;
        let message: ChatMessage = serde_json::from_str(raw).expect("message");
        assert_eq!(message.role, MessageRole::Assistant);
        assert_eq!(message.message, "こんにちは！");
    }

    #[test]
    fn reading_ignores_unknown_fields() {
        let raw = r#"{
            "id": "r1",
            "user_id": "u1",
            "book": {"title": "Kokoro", "author": "Soseki"},
            "read_count": 1,
            "status": "completed"
        }"#;
        let reading: Reading = serde_json::from_str(raw).expect("reading");
        assert_eq!(reading.status, ReadingStatus::Completed);
        assert_eq!(reading.book.title, "Kokoro");
    }
}
