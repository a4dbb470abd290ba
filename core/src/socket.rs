use crate::speech_protocol::{ClientMessage, ServerMessage};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SocketError {
    #[error("websocket connect failed: {0}")]
    Connect(String),
    #[error("websocket error: {0}")]
    Transport(String),
}

/// Bidirectional channel to the transcription backend.
#[async_trait]
pub trait SpeechSocket: Send {
    async fn send_control(&mut self, message: &ClientMessage) -> Result<(), SocketError>;
    async fn send_audio(&mut self, chunk: Vec<u8>) -> Result<(), SocketError>;
    /// Next control message from the server; `Ok(None)` once the server has
    /// closed the socket.
    async fn next_message(&mut self) -> Result<Option<ServerMessage>, SocketError>;
    async fn close(&mut self);
}

#[async_trait]
pub trait SocketConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn SpeechSocket>, SocketError>;
}

#[derive(Debug, Clone)]
pub struct WsConnector {
    url: Url,
}

impl WsConnector {
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl SocketConnector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn SpeechSocket>, SocketError> {
        let (stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|err| SocketError::Connect(err.to_string()))?;
        tracing::debug!(url = %self.url, "speech socket connected");
        Ok(Box::new(WsSpeechSocket {
            stream,
            closed: false,
        }))
    }
}

struct WsSpeechSocket {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

#[async_trait]
impl SpeechSocket for WsSpeechSocket {
    async fn send_control(&mut self, message: &ClientMessage) -> Result<(), SocketError> {
        let text = message
            .to_json()
            .map_err(|err| SocketError::Transport(err.to_string()))?;
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|err| SocketError::Transport(err.to_string()))
    }

    async fn send_audio(&mut self, chunk: Vec<u8>) -> Result<(), SocketError> {
        self.stream
            .send(Message::Binary(chunk))
            .await
            .map_err(|err| SocketError::Transport(err.to_string()))
    }

    async fn next_message(&mut self) -> Result<Option<ServerMessage>, SocketError> {
        loop {
            let Some(frame) = self.stream.next().await else {
                return Ok(None);
            };
            match frame.map_err(|err| SocketError::Transport(err.to_string()))? {
                Message::Text(text) => match ServerMessage::parse(&text) {
                    Ok(message) => return Ok(Some(message)),
                    Err(err) => {
                        tracing::warn!(%err, "ignoring unreadable speech socket message");
                    }
                },
                Message::Close(_) => return Ok(None),
                _ => {}
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(err) = self.stream.close(None).await {
            tracing::debug!(%err, "speech socket close failed");
        }
    }
}
