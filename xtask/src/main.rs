use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use shiori_core::{
    telemetry, ChatMessage, ChatNotification, ClientSettings, InputType, ScriptedTransport,
    SessionTarget, StreamingChat, TransportKind,
};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::runtime::Runtime;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "xtask", version, about = "Automation helpers for Shiori")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a lightweight smoke test that exercises the Shiori core logic.
    Smoke,
}

fn main() -> Result<()> {
    telemetry::init_tracing(EnvFilter::new("info"))?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Smoke => smoke_test(),
    }
}

fn smoke_test() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config_path = temp_dir.path().join("shiori.yaml");
    fs::write(&config_path, "transport: mock\nstream:\n  idle_timeout_secs: 5\n")?;
    let settings = ClientSettings::from_path(&config_path)
        .map_err(|err| anyhow::anyhow!(err.user_message()))?;
    if settings.transport != TransportKind::Mock {
        bail!("smoke config did not select the mock transport");
    }

    let runtime = Runtime::new()?;
    let (message, updates) = runtime.block_on(run_turn(settings.stream.idle_timeout))?;
    info!(
        "updates" = updates,
        "reply_chars" = message.message.chars().count(),
        "smoke test turn completed"
    );
    Ok(())
}

async fn run_turn(idle_timeout: Duration) -> Result<(ChatMessage, usize)> {
    let transport = Arc::new(ScriptedTransport::new(
        Duration::from_millis(5),
        Some("search_book".into()),
    ));
    let (chat, mut rx) =
        StreamingChat::new(SessionTarget::new("smoke-reading", "smoke-session"), transport);
    let chat = chat.with_idle_timeout(idle_timeout);
    chat.send_message("ping from xtask", InputType::Text)
        .map_err(|err| anyhow::anyhow!(err.user_message()))?;

    let mut updates = 0usize;
    loop {
        let notification = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .context("smoke turn timed out")?
            .context("chat client closed")?;
        match notification {
            ChatNotification::Updated { .. } => updates += 1,
            ChatNotification::Completed { message, .. } => return Ok((message, updates)),
            ChatNotification::Failed { error, .. } => bail!("smoke turn failed: {error}"),
        }
    }
}
