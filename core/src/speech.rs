//! Real-time speech capture client.
//!
//! One capture session at a time: the microphone is opened, audio chunks are
//! streamed over the speech socket after the server accepts the auth token,
//! and transcript events are folded into a [`TranscriptState`]. The session
//! task owns both the microphone and the socket and releases them through a
//! single teardown path whichever way the session ends.

use crate::auth::{AuthContext, AuthError};
use crate::capture::{AudioCapture, AudioConfig, AudioSource, CaptureError};
use crate::config::SpeechSettings;
use crate::socket::{SocketConnector, SpeechSocket};
use crate::speech_protocol::{ClientMessage, ServerMessage};
use crate::transcript::TranscriptState;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const STOP_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechStatus {
    Idle,
    Connecting,
    Listening,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SpeechError {
    #[error("authentication required")]
    AuthRequired,
    #[error("invalid authentication token")]
    InvalidToken,
    #[error("authentication timed out")]
    AuthTimeout,
    #[error("speech recognition failed: {0}")]
    RecognitionError(String),
    #[error("speech processing failed: {0}")]
    ProcessingError(String),
    #[error("recognition session timed out")]
    Timeout,
    #[error("connection error: {0}")]
    Connection(String),
    #[error("microphone permission denied")]
    PermissionDenied,
    #[error("microphone not found")]
    DeviceNotFound,
    #[error("audio capture failed: {0}")]
    Capture(String),
    #[error("server error [{code}]: {message}")]
    Server { code: String, message: String },
}

impl SpeechError {
    /// Map an `error` message from the speech socket.
    pub fn from_server(code: &str, message: Option<String>) -> Self {
        let detail = message.clone().unwrap_or_default();
        match code {
            "auth_required" => Self::AuthRequired,
            "invalid_token" => Self::InvalidToken,
            "auth_timeout" => Self::AuthTimeout,
            "recognition_error" => Self::RecognitionError(detail),
            "processing_error" => Self::ProcessingError(detail),
            "timeout" => Self::Timeout,
            _ => Self::Server {
                code: code.to_string(),
                message: message.unwrap_or_else(|| format!("error: {code}")),
            },
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::AuthRequired => "Sign in to use voice input.".to_string(),
            Self::InvalidToken => "Your sign-in token was rejected.".to_string(),
            Self::AuthTimeout => "Authentication timed out.".to_string(),
            Self::RecognitionError(_) => "Speech recognition failed.".to_string(),
            Self::ProcessingError(_) => "An error occurred while processing audio.".to_string(),
            Self::Timeout => "The voice session timed out.".to_string(),
            Self::Connection(_) => "Could not reach the speech service.".to_string(),
            Self::PermissionDenied => "Microphone access is not allowed.".to_string(),
            Self::DeviceNotFound => "No microphone was found.".to_string(),
            Self::Capture(_) => "Recording failed.".to_string(),
            Self::Server { message, .. } => message.clone(),
        }
    }
}

impl From<CaptureError> for SpeechError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::PermissionDenied => Self::PermissionDenied,
            CaptureError::DeviceNotFound => Self::DeviceNotFound,
            CaptureError::Failed(detail) => Self::Capture(detail),
        }
    }
}

impl From<AuthError> for SpeechError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::SignedOut => Self::AuthRequired,
            AuthError::Provider(detail) => {
                warn!(%detail, "could not obtain a token for speech");
                Self::AuthRequired
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpeechNotification {
    Status(SpeechStatus),
    Transcript {
        final_text: String,
        interim_text: String,
    },
    Failed(SpeechError),
}

struct Shared {
    generation: u64,
    status: SpeechStatus,
    transcript: TranscriptState,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

struct Inner {
    connector: Arc<dyn SocketConnector>,
    audio: Arc<dyn AudioSource>,
    auth: AuthContext,
    audio_config: AudioConfig,
    auth_timeout: Duration,
    shared: Mutex<Shared>,
    tx: UnboundedSender<SpeechNotification>,
}

impl Inner {
    fn emit_transcript(&self, shared: &Shared) {
        let _ = self.tx.send(SpeechNotification::Transcript {
            final_text: shared.transcript.final_text.clone(),
            interim_text: shared.transcript.interim_text.clone(),
        });
    }

    fn set_listening(&self, generation: u64) {
        let mut shared = self.shared.lock();
        if shared.generation == generation {
            shared.status = SpeechStatus::Listening;
            let _ = self.tx.send(SpeechNotification::Status(SpeechStatus::Listening));
        }
    }

    fn apply_transcript(&self, generation: u64, transcript: &str, is_final: bool) {
        let mut shared = self.shared.lock();
        if shared.generation != generation {
            return;
        }
        shared.transcript.apply(transcript, is_final);
        self.emit_transcript(&shared);
    }

    /// Record the end of a session that was not stopped by the host.
    fn finish(&self, generation: u64, error: Option<SpeechError>) {
        let mut shared = self.shared.lock();
        if shared.generation != generation {
            return;
        }
        shared.status = SpeechStatus::Idle;
        shared.stop = None;
        shared.task = None;
        if !shared.transcript.interim_text.is_empty() {
            shared.transcript.clear_interim();
            self.emit_transcript(&shared);
        }
        let _ = self.tx.send(SpeechNotification::Status(SpeechStatus::Idle));
        if let Some(error) = error {
            warn!(generation, %error, "speech session failed");
            let _ = self.tx.send(SpeechNotification::Failed(error));
        } else {
            info!(generation, "speech session ended");
        }
    }
}

/// Voice input client. Dropping it stops any running capture session.
pub struct SpeechRecognizer {
    inner: Arc<Inner>,
}

impl SpeechRecognizer {
    pub fn new(
        connector: Arc<dyn SocketConnector>,
        audio: Arc<dyn AudioSource>,
        auth: AuthContext,
        settings: &SpeechSettings,
    ) -> (Self, UnboundedReceiver<SpeechNotification>) {
        let (tx, rx) = unbounded_channel();
        let inner = Arc::new(Inner {
            connector,
            audio,
            auth,
            audio_config: AudioConfig::from(settings),
            auth_timeout: settings.auth_timeout,
            shared: Mutex::new(Shared {
                generation: 0,
                status: SpeechStatus::Idle,
                transcript: TranscriptState::default(),
                stop: None,
                task: None,
            }),
            tx,
        });
        (Self { inner }, rx)
    }

    pub fn status(&self) -> SpeechStatus {
        self.inner.shared.lock().status
    }

    pub fn is_listening(&self) -> bool {
        self.status() == SpeechStatus::Listening
    }

    pub fn transcript(&self) -> TranscriptState {
        self.inner.shared.lock().transcript.clone()
    }

    /// Begin a capture session. Returns `false` when one is already
    /// connecting or listening.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_listening(&self) -> bool {
        let mut shared = self.inner.shared.lock();
        if shared.status != SpeechStatus::Idle {
            debug!(status = ?shared.status, "capture already running");
            return false;
        }
        shared.generation += 1;
        let generation = shared.generation;
        shared.status = SpeechStatus::Connecting;
        let _ = self
            .inner
            .tx
            .send(SpeechNotification::Status(SpeechStatus::Connecting));

        let (stop_tx, stop_rx) = oneshot::channel();
        shared.stop = Some(stop_tx);
        let inner = self.inner.clone();
        shared.task = Some(tokio::spawn(run_session(inner, generation, stop_rx)));
        info!(generation, "speech capture starting");
        true
    }

    /// Stop the current session and wait until the microphone and the socket
    /// have been released.
    pub async fn stop_listening(&self) {
        let (stop, task) = {
            let mut shared = self.inner.shared.lock();
            if shared.task.is_none() && shared.status == SpeechStatus::Idle {
                return;
            }
            shared.generation += 1;
            shared.status = SpeechStatus::Idle;
            shared.transcript.clear_interim();
            self.inner.emit_transcript(&shared);
            let _ = self
                .inner
                .tx
                .send(SpeechNotification::Status(SpeechStatus::Idle));
            (shared.stop.take(), shared.task.take())
        };
        if let Some(stop) = stop {
            let _ = stop.send(());
        }
        if let Some(mut task) = task {
            if tokio::time::timeout(STOP_GRACE, &mut task).await.is_err() {
                warn!("speech session did not stop in time; aborting");
                task.abort();
            }
        }
        info!("speech capture stopped");
    }

    pub fn reset_transcript(&self) {
        let mut shared = self.inner.shared.lock();
        shared.transcript.reset();
        self.inner.emit_transcript(&shared);
    }
}

impl Drop for SpeechRecognizer {
    fn drop(&mut self) {
        let mut shared = self.inner.shared.lock();
        shared.generation += 1;
        shared.status = SpeechStatus::Idle;
        if let Some(stop) = shared.stop.take() {
            let _ = stop.send(());
        }
        // Detached: the session releases its resources on its own.
        shared.task.take();
    }
}

/// Microphone and socket held by a running session.
#[derive(Default)]
struct Resources {
    capture: Option<Box<dyn AudioCapture>>,
    socket: Option<Box<dyn SpeechSocket>>,
    // Whether the server still expects a `stop` from us.
    owes_stop: bool,
}

impl Resources {
    async fn release(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            if self.owes_stop {
                if let Err(err) = socket.send_control(&ClientMessage::Stop).await {
                    debug!(%err, "could not send stop");
                }
            }
            socket.close().await;
            self.owes_stop = false;
        }
        if let Some(mut capture) = self.capture.take() {
            capture.stop().await;
        }
    }
}

async fn run_session(inner: Arc<Inner>, generation: u64, mut stop_rx: oneshot::Receiver<()>) {
    let mut resources = Resources::default();
    let result = tokio::select! {
        _ = &mut stop_rx => Ok(()),
        result = drive(&inner, generation, &mut resources) => result,
    };
    resources.release().await;
    inner.finish(generation, result.err());
}

fn connection(err: impl std::fmt::Display) -> SpeechError {
    SpeechError::Connection(err.to_string())
}

async fn drive(
    inner: &Inner,
    generation: u64,
    resources: &mut Resources,
) -> Result<(), SpeechError> {
    let token = inner.auth.require_bearer().await?;

    let capture = resources
        .capture
        .insert(inner.audio.open(&inner.audio_config).await?);

    let socket = resources
        .socket
        .insert(inner.connector.connect().await.map_err(connection)?);
    resources.owes_stop = true;
    socket
        .send_control(&ClientMessage::Auth { token })
        .await
        .map_err(connection)?;

    match tokio::time::timeout(inner.auth_timeout, wait_for_auth(socket.as_mut())).await {
        Err(_) => return Err(SpeechError::AuthTimeout),
        Ok(Err(err)) => {
            if matches!(err, SpeechError::Connection(_)) {
                resources.owes_stop = false;
            }
            return Err(err);
        }
        Ok(Ok(false)) => {
            resources.owes_stop = false;
            return Ok(());
        }
        Ok(Ok(true)) => {}
    }
    inner.set_listening(generation);

    let mut audio_done = false;
    loop {
        tokio::select! {
            chunk = capture.next_chunk(), if !audio_done => match chunk {
                Some(Ok(bytes)) => socket.send_audio(bytes).await.map_err(connection)?,
                Some(Err(err)) => return Err(err.into()),
                None => {
                    debug!(generation, "audio stream ended; asking the server to finish");
                    audio_done = true;
                    resources.owes_stop = false;
                    socket.send_control(&ClientMessage::Stop).await.map_err(connection)?;
                }
            },
            message = socket.next_message() => match message {
                Ok(Some(ServerMessage::Transcript { transcript, is_final, .. })) => {
                    inner.apply_transcript(generation, &transcript, is_final);
                }
                Ok(Some(ServerMessage::Error { code, message })) => {
                    return Err(SpeechError::from_server(&code, message));
                }
                Ok(Some(ServerMessage::Stopped)) => {
                    debug!(generation, "server finished recognition");
                    resources.owes_stop = false;
                    return Ok(());
                }
                Ok(Some(ServerMessage::AuthSuccess { .. })) => {}
                Ok(None) => {
                    debug!(generation, audio_done, "speech socket closed by server");
                    resources.owes_stop = false;
                    return if audio_done {
                        Ok(())
                    } else {
                        Err(SpeechError::Connection("speech socket closed".to_string()))
                    };
                }
                Err(err) => {
                    resources.owes_stop = false;
                    return Err(connection(err));
                }
            },
        }
    }
}

/// Wait for the server to accept the token. `Ok(false)` means the server
/// ended the session before accepting it.
async fn wait_for_auth(socket: &mut dyn SpeechSocket) -> Result<bool, SpeechError> {
    loop {
        match socket.next_message().await.map_err(connection)? {
            Some(ServerMessage::AuthSuccess { user_id }) => {
                debug!(user_id = ?user_id, "speech socket authenticated");
                return Ok(true);
            }
            Some(ServerMessage::Error { code, message }) => {
                return Err(SpeechError::from_server(&code, message));
            }
            Some(ServerMessage::Stopped) => return Ok(false),
            Some(ServerMessage::Transcript { .. }) => {}
            None => {
                return Err(connection("speech socket closed during authentication"));
            }
        }
    }
}
