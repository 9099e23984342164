#![allow(missing_docs)]

//! Process entry point.
//!
//! Loads configuration and credentials from the runtime directory, builds a
//! [`wintermute::gateway::Gateway`], and drives it from a small interactive
//! CLI — this binary is a reference harness, not part of the core library.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use wintermute::agent::trace::{NullTraceSink, NullTypingSink, TraceSink, TypingSink};
use wintermute::config::{self, RuntimePaths};
use wintermute::credentials;
use wintermute::gateway::Gateway;
use wintermute::logging;

#[derive(Debug, Parser)]
#[command(name = "wintermute", version, about = "Multi-provider LLM orchestration gateway")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run as a long-lived interactive session, logging to the production log file.
    Start,
    /// Send a single prompt and print the answer, then exit.
    Ask {
        /// The prompt text to send.
        prompt: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let paths = config::runtime_paths().context("failed to resolve runtime paths")?;

    match cli.command {
        Command::Start => run_start(&paths).await,
        Command::Ask { prompt } => run_ask(&paths, &prompt).await,
    }
}

fn build_gateway(paths: &RuntimePaths) -> Result<Gateway> {
    let loaded_config = config::load_config(&paths.config_toml)
        .with_context(|| format!("failed to load config at {}", paths.config_toml.display()))?;
    let creds = credentials::load_credentials(&paths.env_file)
        .with_context(|| format!("failed to load credentials at {}", paths.env_file.display()))?;

    let trace_sink: Arc<dyn TraceSink> = Arc::new(NullTraceSink);
    let typing_sink: Arc<dyn TypingSink> = Arc::new(NullTypingSink);

    Gateway::new(&loaded_config, &creds, paths.clone(), trace_sink, typing_sink)
}

/// Interactive REPL: one line in, one final answer out, all in a single
/// `"cli"` session (§6).
async fn run_start(paths: &RuntimePaths) -> Result<()> {
    let logs_dir = paths.root.join("logs");
    let _guard = logging::init_production(&logs_dir)?;
    info!("wintermute starting");

    let gateway = build_gateway(paths)?;
    let cancel = CancellationToken::new();

    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();
    println!("wintermute ready. Type a message, or \"exit\" to quit.");

    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text.eq_ignore_ascii_case("exit") {
            break;
        }

        match gateway.handle_turn("cli", text, vec![], None, cancel.clone()).await {
            Ok(answer) => println!("{answer}"),
            Err(e) => error!("turn failed: {e}"),
        }
    }

    info!("wintermute shutting down");
    Ok(())
}

/// One-shot prompt/answer, for scripting (§6).
async fn run_ask(paths: &RuntimePaths, prompt: &str) -> Result<()> {
    logging::init_cli();
    let gateway = build_gateway(paths)?;
    let answer = gateway.handle_turn("cli", prompt, vec![], None, CancellationToken::new()).await?;
    println!("{answer}");
    Ok(())
}
