use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use lendchat::config::DEFAULT_ENDPOINT;
use lendchat::{
    Comment, ConfigError, ConnectionConfig, ConnectionManager, Identity, Message, ReconnectPolicy, ThreadController,
    ThreadSession,
};
use reqwest::header::{COOKIE, HeaderMap, HeaderValue};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader as AsyncBufReader};
use tracing::{debug, info, warn};

/// Time allowed for the trailing `leave-room` to reach the socket on exit.
const FLUSH_GRACE: Duration = Duration::from_millis(250);

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
    #[error("server returned HTTP {status}: {message}")]
    ServerError { status: u16, message: String },
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("history is not a comment list")]
    NotAHistory,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "lendchat", about = "Equipment discussion thread client")]
struct Cli {
    #[arg(long, env = "LENDCHAT_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    #[arg(long, env = "LENDCHAT_SESSION_COOKIE", help = "Cookie pair sent on the handshake, e.g. session=abc")]
    session_cookie: Option<String>,

    #[arg(long, default_value_t = false)]
    no_reconnect: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Join an equipment thread; stdin lines are sent, new messages printed.
    Chat(ChatArgs),
    /// Fetch and print a comment list.
    History(HistoryArgs),
}

#[derive(Args, Debug)]
struct ChatArgs {
    #[arg(long)]
    equipment_id: String,

    #[arg(long)]
    username: String,

    #[arg(long)]
    display_name: Option<String>,

    #[arg(long, default_value = "Student")]
    role: String,

    #[arg(long, help = "Stable user id; defaults to the username")]
    user_id: Option<String>,

    #[arg(long, conflicts_with = "history_url", help = "JSON file with the bootstrap comment list")]
    history: Option<PathBuf>,

    #[arg(long, help = "URL returning the bootstrap comment list")]
    history_url: Option<String>,
}

#[derive(Args, Debug)]
struct HistoryArgs {
    #[arg(long)]
    url: String,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    if let Err(error) = dotenvy::dotenv() {
        if !error.not_found() {
            eprintln!("ignoring unreadable .env: {error}");
        }
    }
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let config = connection_config(&cli)?;

    match cli.command {
        Command::Chat(args) => run_chat(config, args).await,
        Command::History(args) => {
            let json = fetch_json(&args.url, config.session_cookie.as_deref()).await?;
            print_json(&json)
        }
    }
}

/// Environment first, then explicit flags on top.
fn connection_config(cli: &Cli) -> Result<ConnectionConfig, CliError> {
    let mut config = ConnectionConfig::from_env()?;
    config.endpoint = ConnectionConfig::new(cli.endpoint.as_str())?.endpoint;
    if cli.session_cookie.is_some() {
        config.session_cookie.clone_from(&cli.session_cookie);
    }
    if cli.no_reconnect {
        config.reconnect = ReconnectPolicy::disabled();
    }
    Ok(config)
}

async fn run_chat(config: ConnectionConfig, args: ChatArgs) -> Result<(), CliError> {
    let history = match (&args.history, &args.history_url) {
        (Some(path), _) => comments_from_json(serde_json::from_reader(BufReader::new(File::open(path)?))?)?,
        (None, Some(url)) => comments_from_json(fetch_json(url, config.session_cookie.as_deref()).await?)?,
        (None, None) => Vec::new(),
    };

    let identity = Identity {
        id: args.user_id.unwrap_or_else(|| args.username.clone()),
        display_name: args.display_name.unwrap_or_else(|| args.username.clone()),
        username: args.username,
        role: args.role,
    };

    let mut controller = ThreadController::new(ConnectionManager::websocket(config));
    let session = controller.start(&args.equipment_id, identity, history);
    info!(room_id = %args.equipment_id, seeded = session.len(), "thread ready");

    let mut printed = print_new(&session, 0);
    let mut changes = session.changes();
    let mut lines = AsyncBufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    debug!("stdin closed");
                    break;
                };
                if !session.send(&line) {
                    debug!("blank line not sent");
                }
            }
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                printed = print_new(&session, printed);
            }
            result = &mut ctrl_c => {
                if let Err(error) = result {
                    warn!(%error, "ctrl-c handler failed");
                }
                break;
            }
        }
    }

    controller.stop();
    tokio::time::sleep(FLUSH_GRACE).await;
    Ok(())
}

/// Print messages from index `from` onward; returns the new printed count.
fn print_new(session: &ThreadSession, from: usize) -> usize {
    let snapshot = session.snapshot();
    for message in snapshot.iter().skip(from) {
        println!("{}", format_message(message, session.is_mine(message)));
    }
    snapshot.len()
}

fn format_message(message: &Message, mine: bool) -> String {
    let author = if mine { "you" } else { message.author_name() };
    let role = message
        .sender
        .as_ref()
        .filter(|s| !s.role.is_empty())
        .map(|s| format!(" ({})", s.role))
        .unwrap_or_default();
    format!("[{}] {author}{role}: {}", message.created_at_rfc3339(), message.content)
}

/// Accepts a bare array or an object wrapping it under `comments` or `data`.
fn comments_from_json(value: Value) -> Result<Vec<Comment>, CliError> {
    let list = match value {
        Value::Array(_) => value,
        Value::Object(mut map) => map
            .remove("comments")
            .or_else(|| map.remove("data"))
            .ok_or(CliError::NotAHistory)?,
        _ => return Err(CliError::NotAHistory),
    };
    Ok(serde_json::from_value(list)?)
}

async fn fetch_json(url: &str, session_cookie: Option<&str>) -> Result<Value, CliError> {
    let mut headers = HeaderMap::new();
    if let Some(cookie) = session_cookie {
        headers.insert(COOKIE, HeaderValue::from_str(cookie)?);
    }

    let client = reqwest::Client::builder().default_headers(headers).build()?;
    let response = client.get(url).send().await?;
    let status = response.status();
    let value = response.json::<Value>().await.unwrap_or_else(|_| Value::Null);

    if !status.is_success() {
        return Err(CliError::ServerError { status: status.as_u16(), message: value.to_string() });
    }
    Ok(value)
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
