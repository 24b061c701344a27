use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use lemonade_core::{AssistantProfile, ChatClient, ChatSession, Config, Lifecycle, ReplyEvent};
use tracing::warn;
use tracing_subscriber::EnvFilter;

mod app;
mod handler;
mod tui;
mod ui;

use app::App;
use tui::EventHandler;

const DEFAULT_LOG_FILTER: &str = "lemonade=info,lemonade_core=info";

#[derive(Parser)]
#[command(name = "lemonade")]
#[command(about = "Chat with the lemonade shop's streaming assistants")]
struct Cli {
    /// Signed in as an admin (mounts the business assistant)
    #[arg(long, global = true)]
    admin: bool,
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat (default)
    Chat,
    /// Stream one answer to stdout
    Ask {
        /// Your question
        question: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    let client = build_client(config)?;

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => {
            let _guard = init_file_logging()?;
            run_chat(client, cli.admin).await
        }
        Commands::Ask { question } => {
            init_stderr_logging();
            ask(client, cli.admin, question).await
        }
    }
}

/// A missing file gives defaults; an unreadable or corrupt one is an error
fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::load().context("failed to load the default config file")?,
    };
    Ok(config)
}

/// Environment variables take precedence over the config file
fn build_client(mut config: Config) -> Result<ChatClient> {
    if let Ok(url) = std::env::var("LEMONADE_FUNCTIONS_URL") {
        config.functions_url = Some(url);
    }
    if let Ok(key) = std::env::var("LEMONADE_API_KEY") {
        config.api_key = Some(key);
    }
    Ok(ChatClient::from_config(&config)?)
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// The terminal UI owns the screen, so logs go to a file in the config directory
fn init_file_logging() -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = Config::config_dir()?;
    std::fs::create_dir_all(&log_dir)?;
    let appender = tracing_appender::rolling::never(&log_dir, "lemonade.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(guard)
}

fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
}

async fn run_chat(client: ChatClient, is_admin: bool) -> Result<()> {
    let mut terminal = tui::init()?;
    tui::install_panic_hook();

    let mut events = EventHandler::new();
    let mut app = App::new(client, is_admin, events.sender());

    let result = async {
        while !app.should_quit {
            terminal.draw(|frame| ui::render(&mut app, frame))?;
            match events.next().await {
                Some(event) => handler::handle_event(&mut app, event)?,
                None => break,
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    app.shutdown();
    tui::restore()?;
    result
}

async fn ask(client: ChatClient, is_admin: bool, question: String) -> Result<()> {
    let profile = if is_admin {
        AssistantProfile::Admin
    } else {
        AssistantProfile::Customer
    };
    let mut session = ChatSession::new(profile);
    session.set_input(question);
    let Some(payload) = session.begin_turn() else {
        return Err(anyhow!("question is empty"));
    };

    println!("{}", profile.display_name().bold().yellow());

    // Print only the part of the accumulated reply not shown yet
    let mut shown = 0;
    let result = client
        .stream_chat(profile, &payload, |text| {
            if let Some(suffix) = text.get(shown..) {
                let mut stdout = std::io::stdout();
                if let Err(err) = write!(stdout, "{suffix}").and_then(|()| stdout.flush()) {
                    warn!(error = %err, "failed to write reply to stdout");
                }
            }
            shown = text.len();
            session.apply(ReplyEvent::Content(text.to_string()));
        })
        .await;
    println!();

    session.apply(match result {
        Ok(end) => ReplyEvent::Completed(end),
        Err(err) => ReplyEvent::Failed(err.to_string()),
    });

    match session.lifecycle() {
        Lifecycle::Completed => Ok(()),
        _ => {
            let notice = session
                .messages()
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default();
            println!("{}", notice.red());
            Err(anyhow!("{} did not answer", profile.display_name()))
        }
    }
}
