//! Wiring between the terminal and the core clients.

use crate::render::{speech_failure, ChatPrinter, TranscriptPrinter};
use anyhow::{anyhow, bail, Context, Result};
use shiori_core::{
    ApiClient, AuthContext, ChatMessage, ChatNotification, ClientSettings, CommandAudioSource,
    HttpTransport, InputType, MessageTransport, ScriptedTransport, SessionTarget, SessionType,
    SpeechNotification, SpeechRecognizer, SpeechStatus, StreamingChat, TranscriptState,
    TransportKind, WsConnector,
};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

/// Everything the subcommands need, built once from the loaded settings.
pub struct Host {
    pub settings: ClientSettings,
    pub api: ApiClient,
    mock: bool,
}

impl Host {
    pub fn new(settings: ClientSettings, force_mock: bool) -> Self {
        let auth = match &settings.id_token {
            Some(token) => AuthContext::with_static_token(token.clone()),
            None => AuthContext::anonymous(),
        };
        let api = ApiClient::new(settings.api_url.clone(), auth);
        let mock = force_mock || settings.transport == TransportKind::Mock;
        Self {
            settings,
            api,
            mock,
        }
    }

    pub fn is_mock(&self) -> bool {
        self.mock
    }

    pub fn transport(&self) -> Arc<dyn MessageTransport> {
        if self.mock {
            Arc::new(ScriptedTransport::default())
        } else {
            Arc::new(HttpTransport::new(self.api.clone()))
        }
    }

    /// Use `session_id` when given, otherwise open a session whose type fits
    /// the reading's progress. Returns whether the session was created here.
    pub async fn resolve_session(
        &self,
        reading_id: &str,
        session_id: Option<String>,
    ) -> Result<(SessionTarget, bool)> {
        if let Some(session_id) = session_id {
            return Ok((SessionTarget::new(reading_id, session_id), false));
        }
        if self.mock {
            let session_id = uuid::Uuid::new_v4().to_string();
            return Ok((SessionTarget::new(reading_id, session_id), true));
        }
        let reading = self
            .api
            .get_reading(reading_id)
            .await
            .with_context(|| format!("failed to load reading {reading_id}"))?;
        let session_type = SessionType::for_status(reading.status);
        let session = self
            .api
            .create_session(reading_id, session_type)
            .await
            .context("failed to start a session")?;
        Ok((SessionTarget::new(reading_id, session.id), true))
    }

    pub async fn end_session(&self, target: &SessionTarget) {
        if self.mock {
            return;
        }
        if let Err(err) = self.api.end_session(target).await {
            warn!(session_id = %target.session_id, %err, "could not end session");
        }
    }

    pub fn chat(
        &self,
        target: SessionTarget,
    ) -> (StreamingChat, UnboundedReceiver<ChatNotification>) {
        let (chat, rx) = StreamingChat::new(target, self.transport());
        (chat.with_idle_timeout(self.settings.stream.idle_timeout), rx)
    }

    pub fn recognizer(&self) -> Result<(SpeechRecognizer, UnboundedReceiver<SpeechNotification>)> {
        let url = self
            .api
            .ws_url(&self.settings.speech.path)
            .context("invalid speech endpoint")?;
        info!(%url, "speech endpoint");
        Ok(SpeechRecognizer::new(
            Arc::new(WsConnector::new(url)),
            Arc::new(CommandAudioSource::new(self.settings.speech.recorder.clone())),
            self.api.auth().clone(),
            &self.settings.speech,
        ))
    }
}

/// Send one message and print the reply as it streams. Ctrl-C cancels the
/// turn.
pub async fn run_chat_turn(
    chat: &StreamingChat,
    rx: &mut UnboundedReceiver<ChatNotification>,
    text: &str,
    input_type: InputType,
    out: &mut impl Write,
) -> Result<ChatMessage> {
    let generation = chat
        .send_message(text, input_type)
        .map_err(|err| anyhow!(err.user_message()))?;
    let mut printer = ChatPrinter::new();

    loop {
        let notification = tokio::select! {
            next = rx.recv() => next.ok_or_else(|| anyhow!("chat client went away"))?,
            _ = tokio::signal::ctrl_c() => {
                chat.cancel_stream();
                writeln!(out)?;
                bail!("canceled");
            }
        };
        if notification.generation() != generation {
            continue;
        }
        match notification {
            ChatNotification::Updated { state, .. } => printer.update(&state, out)?,
            ChatNotification::Completed { message, .. } => {
                printer.complete(&message, out)?;
                return Ok(message);
            }
            ChatNotification::Failed { error, .. } => {
                writeln!(out)?;
                warn!(%error, "reply failed");
                bail!(error.user_message());
            }
        }
    }
}

/// Capture speech until `limit` elapses, the user presses Ctrl-C or the
/// server ends the session. Returns the final transcript.
pub async fn run_listen(
    recognizer: &SpeechRecognizer,
    rx: &mut UnboundedReceiver<SpeechNotification>,
    limit: Option<Duration>,
    out: &mut impl Write,
) -> Result<String> {
    if !recognizer.start_listening() {
        bail!("voice input is already running");
    }
    let mut printer = TranscriptPrinter::default();
    let deadline = async {
        match limit {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            next = rx.recv() => match next {
                Some(SpeechNotification::Status(SpeechStatus::Listening)) => {
                    writeln!(out, "listening...")?;
                }
                Some(SpeechNotification::Status(SpeechStatus::Idle)) => break,
                Some(SpeechNotification::Status(SpeechStatus::Connecting)) => {}
                Some(SpeechNotification::Transcript { final_text, interim_text }) => {
                    printer.update(&TranscriptState { final_text, interim_text }, out)?;
                }
                Some(SpeechNotification::Failed(error)) => {
                    bail!(speech_failure(&error));
                }
                None => bail!("voice client went away"),
            },
            _ = &mut deadline => {
                recognizer.stop_listening().await;
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                recognizer.stop_listening().await;
                break;
            }
        }
    }

    // A failure is emitted right after the final Idle status.
    while let Ok(next) = rx.try_recv() {
        if let SpeechNotification::Failed(error) = next {
            bail!(speech_failure(&error));
        }
    }
    Ok(recognizer.transcript().final_text)
}
