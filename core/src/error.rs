use crate::auth::AuthError;

/// Failures surfaced by the REST client.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{detail}")]
    Status { status: u16, detail: String },
    #[error("invalid API url: {0}")]
    InvalidUrl(String),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl ApiError {
    pub(crate) fn from_body(status: u16, body: &str) -> Self {
        let detail = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|value| {
                value
                    .get("detail")
                    .and_then(|detail| detail.as_str())
                    .map(str::to_owned)
            })
            .unwrap_or_else(|| format!("API Error: {status}"));
        Self::Status { status, detail }
    }
}

/// Terminal failures of a streamed chat turn.
///
/// `Connection` covers the network layer (the request could not be made or
/// the stream broke); `Protocol` is a well-formed error event sent by the
/// backend.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error("message text is empty")]
    EmptyMessage,
    #[error("connection error: {0}")]
    Connection(String),
    #[error("request rejected ({status}): {detail}")]
    Rejected { status: u16, detail: String },
    #[error("assistant error [{code}]: {message}")]
    Protocol { code: String, message: String },
    #[error("malformed stream event: {0}")]
    Decode(String),
    #[error("authentication failed: {0}")]
    Auth(String),
}

impl ChatError {
    pub fn user_message(&self) -> String {
        match self {
            Self::EmptyMessage => "Type a message before sending.".to_string(),
            Self::Connection(detail) => format!("Connection error: {detail}"),
            Self::Rejected { detail, .. } => detail.clone(),
            Self::Protocol { message, .. } => message.clone(),
            Self::Decode(_) => "Received an unreadable reply from the server.".to_string(),
            Self::Auth(detail) => format!("Sign-in required: {detail}"),
        }
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

impl From<ApiError> for ChatError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Transport(err) => Self::Connection(err.to_string()),
            ApiError::Status { status, detail } => Self::Rejected { status, detail },
            ApiError::InvalidUrl(url) => Self::Connection(format!("invalid API url: {url}")),
            ApiError::Auth(err) => Self::Auth(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_prefers_backend_detail() {
        let err = ApiError::from_body(404, r#"{"detail": "Reading not found"}"#);
        assert_eq!(err.to_string(), "Reading not found");
    }

    #[test]
    fn status_error_falls_back_to_code() {
        let err = ApiError::from_body(502, "<html>bad gateway</html>");
        assert_eq!(err.to_string(), "API Error: 502");
    }

    #[test]
    fn protocol_and_connection_errors_are_distinct() {
        let protocol = ChatError::Protocol {
            code: "agent_error".into(),
            message: "agent failed".into(),
        };
        let connection = ChatError::Connection("reset by peer".into());
        assert!(!protocol.is_connection());
        assert!(connection.is_connection());
        assert_eq!(protocol.user_message(), "agent failed");
        assert_ne!(protocol.user_message(), connection.user_message());
    }
}
