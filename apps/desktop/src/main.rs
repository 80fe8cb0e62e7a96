use std::{
    io::Write as _,
    path::PathBuf,
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{GridView, TodoController};
use storage::TodoStore;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod app;
mod commands;
mod config;

use app::{Outcome, TodoApp};
use commands::parse_command;
use config::{load_settings, normalize_database_url, DEFAULT_CONFIG_PATH};

#[derive(Parser, Debug)]
#[command(name = "todo", about = "Keep a todo list in a local SQLite file")]
struct Args {
    /// Settings file; missing is fine.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    #[arg(long)]
    database_url: Option<String>,
    #[arg(long)]
    page_size: Option<usize>,
}

fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = load_settings(&args.config)?;
    if let Some(database_url) = args.database_url {
        settings.database_url = database_url;
    }
    if let Some(page_size) = args.page_size {
        settings.page_size = page_size;
    }
    init_tracing(&settings.log_filter);

    let database_url = normalize_database_url(&settings.database_url);
    let store = TodoStore::new(&database_url)
        .await
        .with_context(|| format!("failed to open todo database at '{database_url}'"))?;
    let controller = TodoController::mount(
        Arc::new(store),
        GridView::with_page_size(settings.page_size),
    )
    .await
    .context("failed to mount todo view")?;
    info!(database_url = %database_url, "todo list ready");

    let mut app = TodoApp::new(controller);
    println!("{}", app.opening_page().await);
    println!("type 'help' for commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("todo> ");
        std::io::stdout().flush().context("failed to flush stdout")?;

        let Some(line) = lines.next_line().await.context("failed to read stdin")? else {
            break;
        };
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                println!("error: {err}");
                continue;
            }
        };
        match app.execute(command).await {
            Ok(Outcome::Continue(message)) => println!("{message}"),
            Ok(Outcome::Quit) => break,
            Err(err) => {
                error!(error = %err, "command failed");
                println!("error: {}", err.report());
            }
        }
    }

    app.shutdown().await;
    Ok(())
}
