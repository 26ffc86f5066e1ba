//! Coinboard command-line client.
//!
//! Joins the live chat over the shared real-time connection, prints extra
//! topics as they tick, and sends each input line as a chat message.
//!
//! # Usage
//!
//! ```bash
//! # Local development server
//! coinboard
//!
//! # Follow price ticks next to the chat
//! coinboard --url wss://example.com/ws --topic /topic/prices/BTC
//! ```
//!
//! Input commands: `/older` loads older history, `/reconnect` retries after
//! a terminal error, `/quit` exits.

mod input;
mod terminal;

use clap::Parser;
use coinboard_chat::ChatConfig;
use coinboard_client::{
    DriverEvent, Runtime,
    transport::{HttpConfig, InputSender, WsDriver},
};
use coinboard_core::SessionConfig;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::terminal::TerminalPresenter;

/// Coinboard real-time client
#[derive(Parser, Debug)]
#[command(name = "coinboard")]
#[command(about = "Line-based chat and ticker client")]
#[command(version)]
struct Args {
    /// WebSocket endpoint
    #[arg(long, env = "COINBOARD_URL", default_value = "ws://localhost:8080/ws")]
    url: String,

    /// Value of the `host` header in CONNECT
    #[arg(long, env = "COINBOARD_HOST", default_value = "localhost")]
    host: String,

    /// Credential endpoint
    #[arg(long, env = "COINBOARD_CREDENTIAL_URL", default_value = "http://localhost:8080/api/csrf")]
    credential_url: String,

    /// `Cookie` header to read the credential from instead of the endpoint
    #[arg(long, env = "COINBOARD_COOKIE")]
    cookie: Option<String>,

    /// Connect without a credential
    #[arg(long)]
    no_credential: bool,

    /// Chat history endpoint
    #[arg(
        long,
        env = "COINBOARD_HISTORY_URL",
        default_value = "http://localhost:8080/api/chat/messages"
    )]
    history_url: String,

    /// Chat room identifier
    #[arg(long, env = "COINBOARD_CHAT_ID", default_value = "global")]
    chat_id: String,

    /// Mark outgoing chat messages as from a logged-in user
    #[arg(long)]
    authenticated: bool,

    /// Extra topic to print (repeatable)
    #[arg(long = "topic")]
    topics: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    // Logs go to stderr so they never interleave with chat lines
    tracing_subscriber::registry().with(fmt::layer().with_writer(std::io::stderr)).with(filter).init();

    let session = SessionConfig {
        url: args.url,
        host: args.host,
        require_credential: !args.no_credential,
        ..SessionConfig::default()
    };
    let chat =
        ChatConfig { chat_id: args.chat_id, authenticated: args.authenticated, ..ChatConfig::default() };
    let cookie_only = args.cookie.is_some();
    let http = HttpConfig {
        credential_url: (!cookie_only).then_some(args.credential_url),
        history_url: args.history_url,
        cookie: args.cookie,
        ..HttpConfig::default()
    };

    let driver = WsDriver::new(http, TerminalPresenter::new(std::io::stdout()))?;
    tokio::spawn(read_input(driver.input()));

    let mut runtime = Runtime::new(driver, session, chat);
    for topic in &args.topics {
        runtime.subscribe_topic(topic)?;
    }

    tracing::info!(topics = args.topics.len(), "coinboard starting");
    runtime.run().await?;

    Ok(())
}

/// Forward stdin lines until EOF, then quit.
async fn read_input(sender: InputSender) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if sender.send(input::parse_line(&line)).is_err() {
                    return;
                }
            },
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "stdin read failed");
                break;
            },
        }
    }
    let _ = sender.send(DriverEvent::Quit);
}
