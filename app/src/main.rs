use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use shiori::{run_chat_turn, run_listen, Host};
use shiori_core::{telemetry, ClientSettings, InputType};
use std::io;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "shiori", version, about = "Talk with your reading companion")]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// Reply from the built-in scripted transport instead of the backend.
    #[arg(long, global = true)]
    mock: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a message and stream the reply.
    Chat {
        #[arg(long)]
        reading: String,
        /// Continue an existing session instead of starting one.
        #[arg(long)]
        session: Option<String>,
        /// Mark the message as dictated.
        #[arg(long)]
        voice: bool,
        text: Vec<String>,
    },
    /// Transcribe the microphone.
    Listen {
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// Dictate a message and send it in a new session.
    QuickVoice {
        #[arg(long)]
        reading: String,
        #[arg(long)]
        seconds: Option<u64>,
    },
}

fn main() -> Result<()> {
    telemetry::init_tracing(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    )?;
    let cli = Cli::parse();

    let settings = ClientSettings::load().map_err(|err| anyhow::anyhow!(err.user_message()))?;
    let host = Host::new(settings, cli.mock);
    let runtime = Runtime::new()?;

    match cli.command {
        Command::Chat {
            reading,
            session,
            voice,
            text,
        } => {
            let input_type = if voice {
                InputType::Voice
            } else {
                InputType::Text
            };
            runtime.block_on(chat(&host, &reading, session, &text.join(" "), input_type))
        }
        Command::Listen { seconds } => runtime.block_on(async {
            let (recognizer, mut rx) = host.recognizer()?;
            let limit = seconds.map(Duration::from_secs);
            let text = run_listen(&recognizer, &mut rx, limit, &mut io::stdout()).await?;
            if text.is_empty() {
                eprintln!("(nothing was transcribed)");
            }
            Ok::<_, anyhow::Error>(())
        }),
        Command::QuickVoice { reading, seconds } => {
            runtime.block_on(quick_voice(&host, &reading, seconds.map(Duration::from_secs)))
        }
    }
}

async fn chat(
    host: &Host,
    reading_id: &str,
    session_id: Option<String>,
    text: &str,
    input_type: InputType,
) -> Result<()> {
    let (target, created) = host.resolve_session(reading_id, session_id).await?;
    if created {
        eprintln!("session {}", target.session_id);
    }
    let (chat, mut rx) = host.chat(target);
    run_chat_turn(&chat, &mut rx, text, input_type, &mut io::stdout()).await?;
    Ok(())
}

async fn quick_voice(host: &Host, reading_id: &str, limit: Option<Duration>) -> Result<()> {
    let (recognizer, mut rx) = host.recognizer()?;
    let transcript = run_listen(&recognizer, &mut rx, limit, &mut io::stderr())
        .await
        .context("voice capture failed")?;
    drop(recognizer);
    if transcript.trim().is_empty() {
        bail!("nothing was transcribed; no message sent");
    }

    let (target, _) = host.resolve_session(reading_id, None).await?;
    let (chat, mut chat_rx) = host.chat(target.clone());
    let mut out = io::stdout();
    let sent = run_chat_turn(&chat, &mut chat_rx, &transcript, InputType::Voice, &mut out).await;
    host.end_session(&target).await;
    sent.map(|_| ())
}
