//! Todo terminal client.
//!
//! Reads commands from stdin and prints outcomes to stdout. Logs go to stderr.

pub use self::error::{Error, Result};
mod error;

mod commands;
mod shell;

use std::sync::Arc;

use clap::{Parser, ValueEnum};
use todo_core::backend::memory::MemoryBackend;
use todo_firebase::FirebaseBackend;
use tracing::info;

use crate::shell::{Backend, Shell};

const DEFAULT_LOG_FILTER: &str = "warn,todo_core=info,todo_firebase=info,todo=info";

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendKind {
    /// In-process backend; nothing persists after exit.
    Memory,
    /// Firebase Authentication + Firestore, configured from the environment.
    Firebase,
}

/// Todo list client.
#[derive(Parser, Debug)]
#[command(name = "todo", version, about = "Todo list client")]
struct Args {
    /// Identity and document backend.
    #[arg(long, value_enum, env = "TODO_BACKEND", default_value = "memory")]
    backend: BackendKind,

    /// Pre-register an `email:password` account (memory backend, repeatable).
    #[arg(long = "user", value_name = "EMAIL:PASSWORD")]
    users: Vec<String>,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    init_logging()?;

    let args = Args::parse();
    info!(backend = ?args.backend, "starting todo");

    let backend = match args.backend {
        BackendKind::Memory => {
            let memory = Arc::new(MemoryBackend::new());
            for user in &args.users {
                let (email, password) = user.split_once(':').ok_or_else(|| {
                    Error::Custom(format!("--user expects EMAIL:PASSWORD, got `{user}`"))
                })?;
                memory.register_password_account(email, password);
            }
            Backend::Memory(memory)
        }
        BackendKind::Firebase => {
            if !args.users.is_empty() {
                return Err(Error::Custom("--user only applies to the memory backend".into()));
            }
            Backend::Firebase(FirebaseBackend::from_env()?)
        }
    };

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut shell = Shell::new(backend, std::io::stdout());
    shell.run(stdin).await
}

/// Logs go to stderr so stdout carries only command output.
fn init_logging() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(DEFAULT_LOG_FILTER))
        .map_err(|e| Error::Logging(e.to_string()))?;
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))
}
