pub mod api;
pub mod auth;
pub mod capture;
pub mod chat;
pub mod config;
pub mod error;
pub mod socket;
pub mod speech;
pub mod speech_protocol;
pub mod sse;
pub mod state;
pub mod telemetry;
pub mod transcript;
pub mod transport;
pub mod turn;


pub use api::ApiClient;
pub use auth::{AuthContext, AuthError, StaticTokenProvider, TokenProvider};
pub use capture::{AudioCapture, AudioConfig, AudioSource, CaptureError, CommandAudioSource};
pub use chat::{ChatNotification, StreamingChat};
pub use config::{ClientSettings, ConfigError, SpeechSettings};
pub use error::{ApiError, ChatError};
pub use socket::{SocketConnector, SpeechSocket, WsConnector};
pub use speech::{SpeechError, SpeechNotification, SpeechRecognizer, SpeechStatus};
pub use state::{ChatMessage, InputType, MessageRole, Reading, Session, SessionTarget, SessionType};
pub use transcript::TranscriptState;
pub use transport::{HttpTransport, MessageTransport, ScriptedTransport, TransportKind};
pub use turn::{StreamingTurnState, ToolInvocation};
