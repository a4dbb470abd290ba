//! JSON control messages of the speech recognition socket. Audio itself is
//! sent as binary frames.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Auth { token: String },
    Stop,
}

impl ClientMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    AuthSuccess {
        #[serde(default)]
        user_id: Option<String>,
    },
    Transcript {
        transcript: String,
        is_final: bool,
        #[serde(default)]
        confidence: Option<f32>,
    },
    Error {
        code: String,
        #[serde(default)]
        message: Option<String>,
    },
    Stopped,
}

impl ServerMessage {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_match_wire_format() {
        let auth: serde_json::Value = serde_json::from_str(
            &ClientMessage::Auth {
                token: "abc".into(),
            }
            .to_json()
            .unwrap(),
        )
        .unwrap();
        assert_eq!(auth, serde_json::json!({"type": "auth", "token": "abc"}));
        assert_eq!(ClientMessage::Stop.to_json().unwrap(), r#"{"type":"stop"}"#);
    }

    #[test]
    fn parses_server_messages() {
        assert_eq!(
            ServerMessage::parse(r#"{"type": "auth_success", "user_id": "u1"}"#).unwrap(),
            ServerMessage::AuthSuccess {
                user_id: Some("u1".into())
            }
        );
        assert_eq!(
            ServerMessage::parse(
                r#"{"type": "transcript", "transcript": "こん", "is_final": false, "confidence": null}"#
            )
            .unwrap(),
            ServerMessage::Transcript {
                transcript: "こん".into(),
                is_final: false,
                confidence: None,
            }
        );
        assert_eq!(
            ServerMessage::parse(r#"{"type": "error", "code": "auth_timeout"}"#).unwrap(),
            ServerMessage::Error {
                code: "auth_timeout".into(),
                message: None,
            }
        );
        assert_eq!(
            ServerMessage::parse(r#"{"type": "stopped"}"#).unwrap(),
            ServerMessage::Stopped
        );
    }

    #[test]
    fn rejects_unknown_message() {
        assert!(ServerMessage::parse(r#"{"type": "banner"}"#).is_err());
    }
}
