use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use shared::domain::TodoId;
use storage::{TodoStore, SCHEMA_VERSION};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "todo-admin", about = "Scriptable access to a todo database")]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/todos.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Add {
        title: String,
    },
    List {
        #[arg(long)]
        json: bool,
    },
    SetDone {
        id: i64,
        #[arg(action = clap::ArgAction::Set)]
        done: bool,
    },
    Rename {
        id: i64,
        title: String,
    },
    Delete {
        id: i64,
    },
    Schema,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    let store = TodoStore::new(&cli.database_url)
        .await
        .with_context(|| format!("failed to open todo database at '{}'", cli.database_url))?;

    match cli.command {
        Command::Add { title } => match store.create(&title).await? {
            Some(id) => println!("created todo_id={id}"),
            None => bail!("title must not be empty"),
        },
        Command::List { json } => {
            let todos = store.list_all().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&todos)?);
            } else {
                for todo in todos {
                    let mark = if todo.done { "x" } else { " " };
                    println!("[{mark}] {:>4}  {}", todo.id.0, todo.title);
                }
            }
        }
        Command::SetDone { id, done } => {
            report(store.update_done(TodoId(id), done).await?, id, "updated");
        }
        Command::Rename { id, title } => {
            report(store.update_title(TodoId(id), &title).await?, id, "renamed");
        }
        Command::Delete { id } => {
            report(store.delete(TodoId(id)).await?, id, "deleted");
        }
        Command::Schema => {
            let version = store.schema_version().await?;
            println!("schema_version={version} expected={SCHEMA_VERSION}");
        }
    }

    store.close().await;
    Ok(())
}

fn report(applied: bool, id: i64, verb: &str) {
    if applied {
        println!("{verb} todo_id={id}");
    } else {
        println!("no todo with id={id}");
    }
}
