//! Streaming chat session client.
//!
//! Drives one request/response cycle at a time against the streamed message
//! endpoint and reports progress to the host through a notification channel.
//! Every send bumps a generation counter; a stream task only touches the turn
//! state or emits notifications while its captured generation is current, so
//! a superseded or canceled stream goes silent even if its last events are
//! already in flight.

use crate::error::ChatError;
use crate::state::{ChatMessage, InputType, SessionTarget};
use crate::transport::{MessageRequest, MessageTransport};
use crate::turn::{StreamingTurnState, TurnOutcome};
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum ChatNotification {
    /// The turn state changed.
    Updated {
        generation: u64,
        state: StreamingTurnState,
    },
    Completed {
        generation: u64,
        message: ChatMessage,
    },
    Failed {
        generation: u64,
        error: ChatError,
    },
}

impl ChatNotification {
    pub fn generation(&self) -> u64 {
        match self {
            Self::Updated { generation, .. }
            | Self::Completed { generation, .. }
            | Self::Failed { generation, .. } => *generation,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Updated { .. })
    }
}

struct Shared {
    generation: u64,
    turn: StreamingTurnState,
    task: Option<JoinHandle<()>>,
}

#[derive(Clone)]
struct Emitter {
    shared: Arc<Mutex<Shared>>,
    tx: UnboundedSender<ChatNotification>,
}

impl Emitter {
    /// Run `f` against the turn state if `generation` is still current.
    /// Returns `false` once the stream has been superseded.
    fn with_current<F>(&self, generation: u64, f: F) -> bool
    where
        F: FnOnce(&mut StreamingTurnState) -> Option<TurnOutcome>,
    {
        let mut shared = self.shared.lock();
        if shared.generation != generation {
            debug!(generation, current = shared.generation, "discarding stale stream event");
            return false;
        }
        let outcome = f(&mut shared.turn);
        let _ = self.tx.send(ChatNotification::Updated {
            generation,
            state: shared.turn.clone(),
        });
        match outcome {
            Some(TurnOutcome::Completed(message)) => {
                info!(generation, message_id = %message.id, "assistant turn completed");
                shared.task = None;
                let _ = self.tx.send(ChatNotification::Completed {
                    generation,
                    message,
                });
                false
            }
            Some(TurnOutcome::Failed(error)) => {
                warn!(generation, %error, "assistant turn failed");
                shared.task = None;
                let _ = self.tx.send(ChatNotification::Failed { generation, error });
                false
            }
            None => true,
        }
    }
}

/// Client for one chat session. At most one assistant turn streams at a time.
pub struct StreamingChat {
    target: SessionTarget,
    transport: Arc<dyn MessageTransport>,
    idle_timeout: Duration,
    emitter: Emitter,
}

impl StreamingChat {
    pub fn new(
        target: SessionTarget,
        transport: Arc<dyn MessageTransport>,
    ) -> (Self, UnboundedReceiver<ChatNotification>) {
        let (tx, rx) = unbounded_channel();
        let shared = Arc::new(Mutex::new(Shared {
            generation: 0,
            turn: StreamingTurnState::idle(),
            task: None,
        }));
        (
            Self {
                target,
                transport,
                idle_timeout: Duration::from_secs(120),
                emitter: Emitter { shared, tx },
            },
            rx,
        )
    }

    /// Treat a stream that stays silent this long as a broken connection.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn target(&self) -> &SessionTarget {
        &self.target
    }

    pub fn state(&self) -> StreamingTurnState {
        self.emitter.shared.lock().turn.clone()
    }

    pub fn is_streaming(&self) -> bool {
        self.emitter.shared.lock().turn.active
    }

    /// Send a message and start streaming the reply, superseding any turn
    /// still in flight. Returns the generation that identifies this turn in
    /// notifications.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn send_message(
        &self,
        text: impl Into<String>,
        input_type: InputType,
    ) -> Result<u64, ChatError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let request = MessageRequest {
            target: self.target.clone(),
            text,
            input_type,
        };

        let mut shared = self.emitter.shared.lock();
        if let Some(task) = shared.task.take() {
            debug!(generation = shared.generation, "superseding in-flight stream");
            task.abort();
        }
        shared.generation += 1;
        let generation = shared.generation;
        shared.turn = StreamingTurnState::started();
        let _ = self.emitter.tx.send(ChatNotification::Updated {
            generation,
            state: shared.turn.clone(),
        });

        let emitter = self.emitter.clone();
        let transport = self.transport.clone();
        let idle_timeout = self.idle_timeout;
        shared.task = Some(tokio::spawn(async move {
            run_stream(emitter, transport, request, generation, idle_timeout).await;
        }));
        info!(
            generation,
            reading_id = %self.target.reading_id,
            session_id = %self.target.session_id,
            input_type = input_type.as_str(),
            "sending message"
        );
        Ok(generation)
    }

    /// Abort the in-flight turn, if any. Emits no completion or error.
    pub fn cancel_stream(&self) {
        let mut shared = self.emitter.shared.lock();
        if let Some(task) = shared.task.take() {
            task.abort();
        }
        shared.generation += 1;
        let was_active = shared.turn.active;
        shared.turn.reset();
        if was_active {
            info!(generation = shared.generation, "stream canceled");
            let _ = self.emitter.tx.send(ChatNotification::Updated {
                generation: shared.generation,
                state: shared.turn.clone(),
            });
        }
    }
}

impl Drop for StreamingChat {
    fn drop(&mut self) {
        let mut shared = self.emitter.shared.lock();
        shared.generation += 1;
        if let Some(task) = shared.task.take() {
            task.abort();
        }
    }
}

async fn run_stream(
    emitter: Emitter,
    transport: Arc<dyn MessageTransport>,
    request: MessageRequest,
    generation: u64,
    idle_timeout: Duration,
) {
    let mut events = match transport.open(&request).await {
        Ok(events) => events,
        Err(error) => {
            emitter.with_current(generation, |turn| Some(turn.fail(error)));
            return;
        }
    };

    loop {
        let next = match tokio::time::timeout(idle_timeout, events.next()).await {
            Ok(next) => next,
            Err(_) => {
                let error = ChatError::Connection(format!(
                    "no data from server for {}s",
                    idle_timeout.as_secs()
                ));
                emitter.with_current(generation, |turn| Some(turn.fail(error)));
                return;
            }
        };
        let keep_going = match next {
            Some(Ok(event)) => emitter.with_current(generation, |turn| turn.apply(event)),
            Some(Err(error)) => emitter.with_current(generation, |turn| Some(turn.fail(error))),
            None => {
                let error =
                    ChatError::Connection("stream closed before the reply completed".to_string());
                emitter.with_current(generation, |turn| Some(turn.fail(error)));
                return;
            }
        };
        if !keep_going {
            return;
        }
    }
}
