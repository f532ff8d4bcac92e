use anyhow::{anyhow, Result};
use astroguide_core::{
    display_domain, ChatClient, ChatMessage, ChatRole, ChatStore, Config, FileStore, KeyValueStore,
    Level, MemoryStore, BACKEND_ERROR_MESSAGE,
};
use clap::{Parser, Subcommand};
use colored::*;
use dialoguer::{theme::ColorfulTheme, Confirm};
use std::path::{Path, PathBuf};

mod app;
mod handler;
mod logging;
mod tui;
mod ui;

use app::{App, Store};
use tui::{EventHandler, Tui};

#[derive(Parser)]
#[command(name = "astroguide", version)]
#[command(about = "Ask space and astronomy questions from your terminal")]
struct Cli {
    /// Backend base URL (overrides ASTROGUIDE_API_URL and the config file)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Keep history and theme in memory for this run only
    #[arg(long, global = true)]
    ephemeral: bool,

    /// Learning level: beginner or advanced
    #[arg(long, global = true, value_parser = parse_level)]
    level: Option<Level>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a single question and print the answer
    Ask {
        /// Your question
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },
    /// Print the saved conversation
    History,
    /// Delete the saved conversation
    Clear {
        /// Don't ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Check that the backend is reachable
    Status,
    /// Show or update the config file
    Config {
        /// Backend base URL to save
        #[arg(long)]
        set_api_url: Option<String>,
        /// Default learning level to save
        #[arg(long, value_parser = parse_level)]
        set_level: Option<Level>,
    },
}

fn parse_level(s: &str) -> Result<Level, String> {
    Level::parse(s).ok_or_else(|| format!("unknown level '{}' (expected beginner or advanced)", s))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, config_error) = match Config::load() {
        Ok(config) => (config, None),
        Err(err) => (Config::new(), Some(err)),
    };

    let data_dir = match &config.data_dir {
        Some(dir) => Some(dir.clone()),
        None => FileStore::default_root().ok(),
    };
    let _log_guard = logging::init_tracing(&log_dir(data_dir.as_deref()))?;

    if let Some(err) = config_error {
        tracing::warn!("failed to load config, using defaults: {:#}", err);
    }

    if let Some(Commands::Config { set_api_url, set_level }) = &cli.command {
        return update_config(config, set_api_url.clone(), *set_level);
    }

    let base_url = cli.api_url.clone().unwrap_or_else(|| config.resolve_base_url());
    tracing::info!(base_url = %base_url, ephemeral = cli.ephemeral, "starting astroguide");
    let client = ChatClient::new(&base_url);

    if let Some(Commands::Status) = &cli.command {
        return check_status(&client).await;
    }

    let storage = open_storage(cli.ephemeral, data_dir)?;
    let mut store = ChatStore::open(client, storage, app::system_theme());
    store.set_level(cli.level.unwrap_or_else(|| config.level()));

    match cli.command {
        None => run_tui(store).await,
        Some(Commands::Ask { question }) => ask(&mut store, &question.join(" ")).await,
        Some(Commands::History) => {
            print_history(&store);
            Ok(())
        }
        Some(Commands::Clear { yes }) => clear_history(&mut store, yes),
        Some(Commands::Status) | Some(Commands::Config { .. }) => Ok(()),
    }
}

/// Logs live under the data dir, or the temp dir when there is none.
fn log_dir(data_dir: Option<&Path>) -> PathBuf {
    match data_dir {
        Some(dir) => dir.join("logs"),
        None => std::env::temp_dir().join("astroguide").join("logs"),
    }
}

fn open_storage(ephemeral: bool, data_dir: Option<PathBuf>) -> Result<Box<dyn KeyValueStore + Send>> {
    if ephemeral {
        return Ok(Box::new(MemoryStore::new()));
    }

    let dir = data_dir.ok_or_else(|| {
        anyhow!("no data directory found; set data_dir in the config file or pass --ephemeral")
    })?;
    Ok(Box::new(FileStore::new(dir)))
}

async fn run_tui(store: Store) -> Result<()> {
    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let mut app = App::new(store);
    let mut events = EventHandler::new();

    let result = run_app(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;
    result
}

async fn run_app(terminal: &mut Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    let tx = events.sender();

    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        let Some(event) = events.next().await else {
            break;
        };
        handler::handle_event(app, event, &tx)?;
    }

    Ok(())
}

async fn ask(store: &mut Store, question: &str) -> Result<()> {
    println!(
        "🔭 Asking at {} level...\n",
        store.level().as_str().bold().magenta()
    );

    if !store.submit(question).await {
        return Err(anyhow!("Nothing to ask: the question is empty"));
    }

    if let Some(answer) = store.messages().last() {
        print_message(answer);
        if answer.content == BACKEND_ERROR_MESSAGE && answer.sources.is_none() {
            println!("Check the backend with: {}", "astroguide status".bold());
        }
    }

    Ok(())
}

fn print_message(msg: &ChatMessage) {
    match msg.role {
        ChatRole::User => {
            println!("{}", "You:".bold().cyan());
            println!("{}\n", msg.content);
        }
        ChatRole::Assistant => {
            println!("{}", "AstroGuide:".bold().yellow());
            if msg.content == BACKEND_ERROR_MESSAGE && msg.sources.is_none() {
                println!("{}", msg.content.red());
            } else {
                println!("{}", msg.content);
            }

            let sources = msg.visible_sources();
            if !sources.is_empty() {
                println!("\n{}", "Sources:".bold());
                println!(
                    "{}",
                    "Links are provided for reference and may change over time.".dimmed()
                );
                for url in sources {
                    println!("  • {}  {}", display_domain(url).blue(), url.dimmed());
                }
            }
            println!();
        }
    }
}

fn print_history(store: &Store) {
    let messages = store.messages();
    if messages.is_empty() {
        println!("{}", "No saved conversation".dimmed());
        return;
    }

    for msg in messages {
        print_message(msg);
    }
    println!("{} messages", messages.len().to_string().bold());
}

fn clear_history(store: &mut Store, yes: bool) -> Result<()> {
    if store.messages().is_empty() {
        println!("{}", "Nothing to clear".dimmed());
        return Ok(());
    }

    store.request_clear();

    let confirmed = yes
        || Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt("Clear chat? This will permanently delete the conversation.")
            .default(false)
            .interact()?;

    if confirmed {
        store.confirm_clear();
        println!("{}", "Chat cleared".green());
    } else {
        store.cancel_clear();
        println!("{}", "Cancelled".dimmed());
    }

    Ok(())
}

async fn check_status(client: &ChatClient) -> Result<()> {
    println!("📡 Checking {}...", client.base_url().cyan());

    match client.status().await {
        Ok(status) => {
            println!("{} {} {}", "✓".green(), status.status.bold(), status.message);
            Ok(())
        }
        Err(err) => {
            println!("{}: {}", "Backend unreachable".red(), err);
            println!(
                "Set the backend URL with: {}",
                "astroguide config --set-api-url <URL>".bold()
            );
            Err(anyhow!("backend at {} is not reachable", client.base_url()))
        }
    }
}

fn update_config(mut config: Config, api_url: Option<String>, level: Option<Level>) -> Result<()> {
    let path = Config::get_config_path()?;

    if api_url.is_none() && level.is_none() {
        println!("{}", path.display().to_string().dimmed());
        println!(
            "  api_base_url:  {}",
            config.api_base_url.as_deref().unwrap_or("(not set)")
        );
        println!("  effective url: {}", config.resolve_base_url().cyan());
        println!("  default_level: {}", config.level().as_str());
        if let Some(dir) = &config.data_dir {
            println!("  data_dir:      {}", dir.display());
        }
        return Ok(());
    }

    if let Some(url) = api_url {
        config.api_base_url = Some(url);
    }
    if let Some(level) = level {
        config.default_level = Some(level.as_str().to_string());
    }
    config.save()?;

    println!("{} {}", "Saved".green(), path.display());
    Ok(())
}
