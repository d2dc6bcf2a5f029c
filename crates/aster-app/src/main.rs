//! Aster terminal front end - composition root.
//!
//! 1. Parse CLI args and load configuration from TOML
//! 2. Install the tracing subscriber
//! 3. Load knowledge data (configured file or the bundled set)
//! 4. Build the chat engine and start the session purge task
//! 5. Run a line-oriented REPL over stdin until `/quit` or EOF

mod cli;

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use aster_chat::ChatEngine;
use aster_core::config::AsterConfig;
use aster_core::KnowledgeStore;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use cli::CliArgs;

/// Periodically drop sessions idle for longer than `max_age_hours`.
async fn purge_loop(engine: Arc<ChatEngine>, interval_secs: u64, max_age_hours: u32) {
    tracing::info!(interval_secs, max_age_hours, "Session purge loop started");

    let mut interval =
        tokio::time::interval(tokio::time::Duration::from_secs(interval_secs.max(1)));
    // The first tick completes immediately.
    interval.tick().await;

    loop {
        interval.tick().await;
        let removed = engine.purge_inactive_since(max_age_hours);
        tracing::debug!(removed, "Purge cycle complete");
    }
}

fn load_knowledge(config: &AsterConfig) -> aster_core::Result<KnowledgeStore> {
    match config.knowledge.path.as_deref() {
        Some(path) => {
            let store = KnowledgeStore::from_path(Path::new(path))?;
            tracing::info!(path, "Knowledge data loaded");
            Ok(store)
        }
        None => {
            tracing::info!("Using bundled knowledge data");
            KnowledgeStore::bundled()
        }
    }
}

/// Handle a slash command. Returns `false` when the REPL should exit.
fn run_command(engine: &ChatEngine, user: &str, line: &str) -> bool {
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    match command {
        "/quit" | "/exit" => return false,
        "/search" => {
            let query = rest.trim();
            if query.is_empty() {
                println!("usage: /search <query>");
                return true;
            }
            let hits = engine.knowledge().search(query);
            if hits.is_empty() {
                println!("no matches for '{query}'");
            }
            for hit in hits {
                println!("  {}", hit.path);
            }
        }
        "/state" => match engine.sessions().snapshot(user) {
            Some(session) => match serde_json::to_string_pretty(&session) {
                Ok(json) => println!("{json}"),
                Err(e) => tracing::warn!(error = %e, "Failed to serialize session"),
            },
            None => println!("no session for '{user}' yet"),
        },
        other => println!("unknown command {other}; try /search, /state or /quit"),
    }
    true
}

fn prompt() {
    print!("you> ");
    let _ = std::io::stdout().flush();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let config = AsterConfig::load_or_default(&config_file);

    // Tracing. RUST_LOG wins over both the flag and the config file.
    let level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level)),
        )
        .init();

    tracing::info!("Starting Aster v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration resolved");

    // Engine.
    let knowledge = load_knowledge(&config)?;
    let engine = Arc::new(ChatEngine::new(config.chat.clone(), knowledge)?);

    // === Background tasks ===
    tokio::spawn(purge_loop(
        Arc::clone(&engine),
        config.chat.purge_interval_secs,
        config.chat.session_max_age_hours,
    ));

    // === REPL ===
    let user = args.user;
    println!(
        "{} support assistant. Type /quit to leave.",
        config.chat.exchange_name
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        prompt();
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        let line = line.trim();
        if line.starts_with('/') {
            if !run_command(&engine, &user, line) {
                break;
            }
            continue;
        }

        match engine.handle_turn(&user, line) {
            Ok(reply) => println!("bot> {reply}"),
            Err(e) => println!("bot> ({e})"),
        }
    }

    tracing::info!("Shutting down");
    Ok(())
}
