use super::test_runtime;
use shiori::{run_chat_turn, Host};
use shiori_core::{
    ChatMessage, ChatNotification, ClientSettings, InputType, MessageRole, ScriptedTransport,
    SessionTarget, StreamingChat,
};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn mock_host_streams_a_reply() {
    let runtime = test_runtime();
    let host = Host::new(ClientSettings::default(), true);
    assert!(host.is_mock());

    let mut out = Vec::new();
    let turn: anyhow::Result<ChatMessage> = runtime.block_on(async {
        let (target, created) = host.resolve_session("reading-1", None).await?;
        assert!(created);
        assert_eq!(target.reading_id, "reading-1");
        let (chat, mut rx) = host.chat(target);
        run_chat_turn(&chat, &mut rx, "栞を挟んだ", InputType::Text, &mut out).await
    });
    let message = turn.expect("chat turn");

    assert_eq!(message.role, MessageRole::Assistant);
    assert_eq!(message.message, "[Mock] You said (text): 栞を挟んだ");
    let printed = String::from_utf8(out).expect("utf8");
    assert!(printed.starts_with("[tool] search_book ...\n[tool] search_book -> "));
    assert!(printed.ends_with("[Mock] You said (text): 栞を挟んだ\n"));
}

#[test]
fn given_session_is_reused() {
    let runtime = test_runtime();
    let host = Host::new(ClientSettings::default(), true);
    let (target, created) = runtime
        .block_on(host.resolve_session("reading-1", Some("session-9".into())))
        .expect("session");
    assert!(!created);
    assert_eq!(target, SessionTarget::new("reading-1", "session-9"));
}

#[test]
fn voice_turn_completes_once() {
    let runtime = test_runtime();
    runtime.block_on(async {
        let transport = Arc::new(ScriptedTransport::new(Duration::ZERO, None));
        let (chat, mut rx) =
            StreamingChat::new(SessionTarget::new("reading-1", "session-1"), transport);
        let generation = chat
            .send_message("今日は三章まで", InputType::Voice)
            .expect("send");

        let mut completions = Vec::new();
        while let Ok(Some(notification)) =
            tokio::time::timeout(Duration::from_millis(500), rx.recv()).await
        {
            assert_eq!(notification.generation(), generation);
            match notification {
                ChatNotification::Completed { message, .. } => completions.push(message),
                ChatNotification::Failed { error, .. } => panic!("unexpected failure: {error}"),
                ChatNotification::Updated { .. } => {}
            }
        }

        assert_eq!(completions.len(), 1);
        assert_eq!(
            completions[0].message,
            "[Mock] You said (voice): 今日は三章まで"
        );
        assert!(!chat.is_streaming());
        assert!(chat.state().assembled_text.is_empty());
    });
}

#[test]
fn blank_message_is_refused() {
    let runtime = test_runtime();
    let host = Host::new(ClientSettings::default(), true);
    let result: anyhow::Result<ChatMessage> = runtime.block_on(async {
        let (chat, mut rx) = host.chat(SessionTarget::new("reading-1", "session-1"));
        run_chat_turn(&chat, &mut rx, "   ", InputType::Text, &mut Vec::<u8>::new()).await
    });
    assert!(result.is_err());
}
