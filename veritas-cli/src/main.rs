//! CLI entry point for Veritas

mod render;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use console::style;
use dialoguer::{Confirm, Input};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};
use veritas_agent::{ChatEvent, ChatLoop, ChatSettings, IgnoreReason, SendOutcome};
use veritas_core::config::{Config, ConfigLoader};
use veritas_core::logging::init_logging;
use veritas_core::session::{FileStorage, ModelKind, SessionId, SessionStore};
use veritas_providers::MockAnalyst;

#[derive(Parser)]
#[command(name = "veritas")]
#[command(about = "Multi-source news analysis assistant")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration directory
    #[arg(short, long, global = true)]
    config_dir: Option<PathBuf>,

    /// Model to use (fast or reasoning)
    #[arg(short, long, global = true)]
    model: Option<ModelKind>,

    /// Disable live web search
    #[arg(long, global = true)]
    offline: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive investigation
    Chat,
    /// Ask one question and stream the analysis
    Ask {
        /// Prompt to analyze
        prompt: String,
        /// Session id or unique id prefix (defaults to the current session)
        #[arg(short, long)]
        session: Option<String>,
    },
    /// Manage saved investigations
    Sessions {
        #[command(subcommand)]
        command: SessionCommands,
    },
    /// Show status information
    Status,
}

#[derive(Subcommand)]
enum SessionCommands {
    /// List investigations, newest first
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one investigation
    Show {
        /// Session id or unique id prefix (defaults to the current session)
        id: Option<String>,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start a new investigation
    New,
    /// Delete an investigation
    Delete {
        /// Session id or unique id prefix
        id: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loader = if let Some(dir) = &cli.config_dir {
        ConfigLoader::with_dir(dir)
    } else {
        ConfigLoader::new()
    };
    let mut config = loader.load()?;
    if let Some(model) = cli.model {
        config.chat.model = model;
    }
    if cli.offline {
        config.chat.live_search = false;
    }

    let _log_guard = init_logging(&config.logging);
    debug!(config_dir = %loader.config_dir().display(), "Configuration loaded");

    match cli.command {
        Commands::Chat => {
            info!("Starting interactive chat");
            run_chat(&config).await?;
        }
        Commands::Ask { prompt, session } => {
            info!("Running one-shot analysis");
            run_ask(&config, &prompt, session.as_deref()).await?;
        }
        Commands::Sessions { command } => match command {
            SessionCommands::List { json } => run_sessions_list(&config, json)?,
            SessionCommands::Show { id, json } => run_sessions_show(&config, id.as_deref(), json)?,
            SessionCommands::New => run_sessions_new(&config)?,
            SessionCommands::Delete { id, yes } => run_sessions_delete(&config, &id, yes)?,
        },
        Commands::Status => run_status(&loader, &config)?,
    }

    Ok(())
}

fn storage_for(config: &Config) -> FileStorage {
    FileStorage::new(config.storage_dir(), config.storage.key.clone())
}

fn open_store(config: &Config) -> SessionStore {
    SessionStore::init(storage_for(config), config.chat.model)
}

fn build_chat(config: &Config) -> Arc<ChatLoop> {
    let producer = Arc::new(MockAnalyst::with_delay(Duration::from_millis(
        config.producer.token_delay_ms,
    )));
    let settings = ChatSettings {
        model: config.chat.model,
        live_search: config.chat.live_search,
    };
    Arc::new(ChatLoop::new(
        open_store(config).into_shared(),
        producer,
        settings,
    ))
}

fn resolve_session(store: &SessionStore, id: &str) -> Result<SessionId> {
    match store.resolve_id(id) {
        Some(full) => Ok(full),
        None => bail!("No investigation matches '{}'", id),
    }
}

/// Send one prompt and print the reply as it streams in
async fn stream_exchange(chat: &Arc<ChatLoop>, prompt: &str) -> Result<SendOutcome> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let task = {
        let chat = Arc::clone(chat);
        let prompt = prompt.to_string();
        tokio::spawn(async move { chat.send_message(&prompt, Some(&tx)).await })
    };

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.set_message("Analyzing sources...");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let mut stdout = std::io::stdout();
    let mut streaming = false;
    while let Some(event) = rx.recv().await {
        match event {
            ChatEvent::Started { .. } => {}
            ChatEvent::AssistantDelta { text } => {
                if !streaming {
                    spinner.finish_and_clear();
                    streaming = true;
                }
                write!(stdout, "{}", text)?;
                stdout.flush()?;
            }
            ChatEvent::Completed { .. } | ChatEvent::Error { .. } => {
                spinner.finish_and_clear();
                if streaming {
                    writeln!(stdout)?;
                }
            }
        }
    }
    spinner.finish_and_clear();

    let outcome = task.await?;
    match &outcome {
        SendOutcome::Completed {
            session_id,
            message_id,
        } => {
            let store = chat.store().lock();
            if let Some(message) = store
                .session(session_id)
                .and_then(|s| s.message(message_id))
            {
                render::print_reply_footer(message);
            }
        }
        SendOutcome::Failed {
            session_id,
            message_id,
            ..
        } => {
            let store = chat.store().lock();
            if let Some(message) = store
                .session(session_id)
                .and_then(|s| s.message(message_id))
            {
                println!("{}", style(&message.content).red());
            }
        }
        SendOutcome::Ignored(reason) => {
            let note = match reason {
                IgnoreReason::EmptyPrompt => "Nothing to analyze.",
                IgnoreReason::NoActiveSession => "No active investigation.",
                IgnoreReason::Busy => "Still analyzing the previous question.",
            };
            println!("{}", style(note).dim());
        }
    }
    Ok(outcome)
}

async fn run_ask(config: &Config, prompt: &str, session: Option<&str>) -> Result<()> {
    let chat = build_chat(config);
    if let Some(id) = session {
        let id = resolve_session(&chat.store().lock(), id)?;
        chat.select_session(&id);
    }

    let outcome = stream_exchange(&chat, prompt).await?;
    if let SendOutcome::Failed { error, .. } = outcome {
        bail!("Analysis failed: {}", error);
    }
    Ok(())
}

enum ReplCommand<'a> {
    Prompt(&'a str),
    New,
    List,
    Switch(&'a str),
    Delete(&'a str),
    Model(&'a str),
    Search(&'a str),
    Help,
    Quit,
    Unknown(&'a str),
}

fn parse_repl_line(line: &str) -> ReplCommand<'_> {
    let Some(command) = line.trim().strip_prefix('/') else {
        return ReplCommand::Prompt(line);
    };
    let (name, arg) = command
        .split_once(char::is_whitespace)
        .map_or((command, ""), |(name, arg)| (name, arg.trim()));
    match name {
        "new" => ReplCommand::New,
        "list" => ReplCommand::List,
        "switch" => ReplCommand::Switch(arg),
        "delete" => ReplCommand::Delete(arg),
        "model" => ReplCommand::Model(arg),
        "search" => ReplCommand::Search(arg),
        "help" => ReplCommand::Help,
        "quit" | "exit" => ReplCommand::Quit,
        _ => ReplCommand::Unknown(name),
    }
}

fn print_repl_help() {
    println!("{}", style("Commands:").bold());
    println!("  /new              start a new investigation");
    println!("  /list             list investigations");
    println!("  /switch <id>      switch to an investigation");
    println!("  /delete <id>      delete an investigation");
    println!("  /model <m>        fast or reasoning");
    println!("  /search on|off    toggle live search");
    println!("  /quit             leave");
}

/// Next REPL line; `piped` is set when stdin is not a terminal
fn read_line(
    piped: Option<&mut impl Iterator<Item = std::io::Result<String>>>,
) -> Result<Option<String>> {
    match piped {
        Some(lines) => Ok(lines.next().transpose()?),
        None => {
            let line: String = Input::new()
                .with_prompt(">")
                .allow_empty(true)
                .interact_text()?;
            Ok(Some(line))
        }
    }
}

async fn run_chat(config: &Config) -> Result<()> {
    let chat = build_chat(config);
    let interactive = std::io::stdin().is_terminal();

    println!("{}", style("Veritas").bold().cyan());
    render::print_status_line(&chat.settings());
    if let Some(session) = chat.view().active_session {
        println!("Investigation: {}", style(&session.title).bold());
    }
    println!("{}", style("Type /help for commands.").dim());

    let mut piped = (!interactive).then(|| std::io::stdin().lines());
    while let Some(line) = read_line(piped.as_mut())? {
        match parse_repl_line(&line) {
            ReplCommand::Prompt(prompt) if prompt.trim().is_empty() => {}
            ReplCommand::Prompt(prompt) => {
                stream_exchange(&chat, prompt).await?;
            }
            ReplCommand::New => {
                let id = chat.new_chat();
                println!("Started investigation {}", style(render::short_id(&id)).cyan());
            }
            ReplCommand::List => render::print_session_list(&chat.view()),
            ReplCommand::Switch(id) => {
                let resolved = chat.store().lock().resolve_id(id);
                match resolved {
                    Some(full) if chat.select_session(&full) => {
                        if let Some(session) = chat.view().active_session {
                            render::print_session(&session);
                        }
                    }
                    _ => println!("{}", style(format!("No investigation matches '{}'", id)).red()),
                }
            }
            ReplCommand::Delete(id) => {
                let resolved = chat.store().lock().resolve_id(id);
                match resolved {
                    Some(full) if chat.delete_session(&full) => {
                        println!("Deleted {}", style(render::short_id(&full)).cyan());
                    }
                    _ => println!("{}", style(format!("No investigation matches '{}'", id)).red()),
                }
            }
            ReplCommand::Model(name) => match ModelKind::parse(name) {
                Some(model) => {
                    chat.set_model(model);
                    render::print_status_line(&chat.settings());
                }
                None => println!("{}", style("Expected: /model fast|reasoning").red()),
            },
            ReplCommand::Search(flag) => match flag {
                "on" => {
                    chat.set_live_search(true);
                    render::print_status_line(&chat.settings());
                }
                "off" => {
                    chat.set_live_search(false);
                    render::print_status_line(&chat.settings());
                }
                _ => println!("{}", style("Expected: /search on|off").red()),
            },
            ReplCommand::Help => print_repl_help(),
            ReplCommand::Quit => break,
            ReplCommand::Unknown(name) => {
                println!("{}", style(format!("Unknown command /{}", name)).red());
            }
        }
    }

    Ok(())
}

fn run_sessions_list(config: &Config, json: bool) -> Result<()> {
    let store = open_store(config);
    if json {
        println!("{}", serde_json::to_string_pretty(&store.view())?);
    } else {
        render::print_session_list(&store.view());
    }
    Ok(())
}

fn run_sessions_show(config: &Config, id: Option<&str>, json: bool) -> Result<()> {
    let store = open_store(config);
    let session = match id {
        Some(id) => {
            let full = resolve_session(&store, id)?;
            store.session(&full).cloned()
        }
        None => store.active_session().cloned(),
    };
    let Some(session) = session else {
        bail!("No active investigation");
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&session)?);
    } else {
        render::print_session(&session);
    }
    Ok(())
}

fn run_sessions_new(config: &Config) -> Result<()> {
    let mut store = open_store(config);
    let id = store.create_session();
    println!("{}", id);
    Ok(())
}

fn run_sessions_delete(config: &Config, id: &str, yes: bool) -> Result<()> {
    let mut store = open_store(config);
    let full = resolve_session(&store, id)?;
    let title = store
        .session(&full)
        .map(|s| s.title.clone())
        .unwrap_or_default();

    if !yes {
        if !std::io::stdin().is_terminal() {
            bail!("Refusing to delete without confirmation; pass --yes");
        }
        let confirmed = Confirm::new()
            .with_prompt(format!("Delete \"{}\"?", title))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Delete cancelled.");
            return Ok(());
        }
    }

    store.delete_session(&full);
    println!("Deleted {} ({})", style(render::short_id(&full)).cyan(), title);
    Ok(())
}

fn run_status(loader: &ConfigLoader, config: &Config) -> Result<()> {
    let storage = storage_for(config);
    let storage_path = storage.path();
    let store = SessionStore::init(storage, config.chat.model);
    let settings = ChatSettings {
        model: config.chat.model,
        live_search: config.chat.live_search,
    };

    println!("{}", style("Veritas Status").bold().cyan());
    println!("Version: {}\n", env!("CARGO_PKG_VERSION"));

    println!("{}", style("Configuration:").bold());
    let config_path = loader.config_path();
    let config_state = if config_path.exists() {
        style("found").green()
    } else {
        style("defaults").dim()
    };
    println!("  Config file: {} ({})", config_path.display(), config_state);
    println!("  Model: {} ({})", settings.model.display_name(), settings.model);
    println!("  Mode: {}", render::status_line(&settings));
    println!("  Token delay: {} ms", config.producer.token_delay_ms);
    println!();

    println!("{}", style("Storage:").bold());
    println!("  Sessions file: {}", storage_path.display());
    println!("  Investigations: {}", store.sessions().len());
    if let Some(session) = store.active_session() {
        println!("  Current: {} ({})", session.title, render::short_id(&session.id));
    }
    println!();

    println!("{}", style("Logging:").bold());
    println!("  Level: {}", config.logging.level);
    println!("  Directory: {}", config.log_dir().display());

    Ok(())
}
