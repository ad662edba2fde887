//! Counsel CLI - Interactive Streaming Chat
//!
//! Terminal front end for the counsel QA service. Reads questions from
//! stdin, streams each answer token by token to stdout, and keeps the
//! conversation going once the server assigns it an identity.
//!
//! # Usage
//!
//! ```bash
//! # Interactive session against the default service address
//! counsel
//!
//! # Custom service address
//! counsel --base-url http://qa.internal:9000
//!
//! # One-shot question, non-streaming
//! counsel --once "What is a lease?"
//!
//! # Verbose logging
//! RUST_LOG=debug counsel
//! ```

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};

use counsel_core::{ChatController, ClientConfig, HttpTransport, SessionPhase, Transcript};

/// Counsel - streaming client for the counsel QA service
#[derive(Parser, Debug)]
#[command(name = "counsel")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base address of the QA service
    #[arg(short = 'u', long, env = "COUNSEL_BASE_URL", value_name = "URL")]
    base_url: Option<String>,

    /// Retrieval depth for new conversations
    #[arg(short = 'k', long, env = "COUNSEL_TOP_K", value_name = "N")]
    top_k: Option<u32>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "COUNSEL_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Ask a single question without streaming and exit
    #[arg(long, value_name = "QUESTION")]
    once: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "COUNSEL_LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new(format!("counsel={level},counsel_core={level}"))
        });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Resolve configuration from file, environment, and CLI flags
fn resolve_config(args: &Args) -> Result<ClientConfig> {
    let mut config = match &args.config {
        Some(path) => ClientConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ClientConfig::load().context("failed to load configuration")?,
    };
    if let Some(base_url) = &args.base_url {
        config.base_url = base_url.trim_end_matches('/').to_string();
    }
    if let Some(top_k) = args.top_k {
        config.top_k = top_k;
    }
    Ok(config)
}

/// Print whatever the pending assistant message gained since `printed`.
///
/// A final answer may replace the accumulated content rather than extend
/// it; in that case start over on a fresh line.
fn print_delta(transcript: &Transcript, printed: &mut usize) {
    if let Some(message) = transcript.messages().last() {
        match message.content.get(*printed..) {
            Some(delta) if !delta.is_empty() => {
                print!("{delta}");
                let _ = std::io::stdout().flush();
                *printed = message.content.len();
            }
            Some(_) => {}
            None => {
                println!();
                print!("{}", message.content);
                let _ = std::io::stdout().flush();
                *printed = message.content.len();
            }
        }
    }
}

async fn run_once(config: &ClientConfig, question: &str) -> Result<()> {
    let transport = HttpTransport::new(config)?;
    let answer = transport.query_once(question, config.top_k).await?;
    match answer.get("response").and_then(|v| v.as_str()) {
        Some(text) => println!("{text}"),
        None => println!("{answer}"),
    }
    Ok(())
}

async fn run_interactive(config: ClientConfig) -> Result<()> {
    let mut controller = ChatController::with_http(config)?;
    let stdin = std::io::stdin();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break; // EOF
        }
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question == "/quit" || question == "/exit" {
            break;
        }

        let Some(mut session) = controller.send(question).await else {
            continue;
        };

        // The question and an empty pending answer are already in the
        // transcript; print only what arrives from here on.
        let mut transcript = controller.subscribe();
        let mut printed = 0;
        loop {
            if session.is_finished() {
                break;
            }
            tokio::select! {
                changed = transcript.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = transcript.borrow_and_update().clone();
                    print_delta(&snapshot, &mut printed);
                }
                phase = session.wait() => {
                    debug!(?phase, "session finished");
                    break;
                }
            }
        }
        // Catch anything published after the last observed change.
        print_delta(&controller.transcript(), &mut printed);
        println!();

        if let SessionPhase::Failed(err) = session.phase() {
            eprintln!("error: {err}");
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let config = resolve_config(&args)?;
    info!(base_url = %config.base_url, "counsel starting");

    if let Some(question) = &args.once {
        return run_once(&config, question).await;
    }

    run_interactive(config).await
}
