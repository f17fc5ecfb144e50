use std::env;
use std::sync::Arc;

use buddy_core::{BuddyConfig, ChatService, ChatUpdate, HttpBackend, SessionState, TurnOutcome};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

mod render;

use render::Progress;

#[derive(Debug, Parser)]
#[command(name = "buddy", about = "Chat with the Buddy pipeline from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
enum Command {
    /// Check that the backend is reachable
    Health,
    /// List threads, most recently updated first
    Threads,
    /// Create a thread and print its id
    New,
    /// Print a thread's turns
    History { thread_id: String },
    /// Send a message and stream the reply; Ctrl-C stops the turn
    Send {
        thread_id: String,
        #[arg(value_name = "MESSAGE", required = true)]
        message: Vec<String>,
    },
    /// Delete a thread
    Delete { thread_id: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut config = BuddyConfig::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_filter(&config))
        .with_writer(std::io::stderr)
        .init();

    if let Ok(url) = env::var("BUDDY_URL") {
        config.server.base_url = url;
    }
    config.stream.reconcile_delay_ms =
        parse_u64("BUDDY_RECONCILE_MS", config.stream.reconcile_delay_ms);
    config.stream.log_frames = parse_bool("BUDDY_LOG_FRAMES", config.stream.log_frames);

    let backend = Arc::new(HttpBackend::new(&config.server)?);
    tracing::debug!(base_url = %backend.base_url(), "using backend");

    match cli.command {
        Command::Health => {
            backend.health().await?;
            println!("ok {}", backend.base_url());
        }
        Command::Threads => {
            for thread in backend.list_threads().await? {
                println!("{}", render::thread_line(&thread));
            }
        }
        Command::New => {
            let created = backend.create_thread().await?;
            println!("{}", created.thread_id);
        }
        Command::Delete { thread_id } => {
            backend.delete_thread(&thread_id).await?;
            tracing::info!(%thread_id, "thread deleted");
        }
        Command::History { thread_id } => {
            let (service, _updates) = ChatService::new(backend, config.stream.clone());
            for turn in service.history(&thread_id).await? {
                for line in render::turn_lines(&turn) {
                    println!("{line}");
                }
                println!();
            }
        }
        Command::Send { thread_id, message } => {
            let content = message.join(" ");
            if content.trim().is_empty() {
                eprintln!("send: message is empty");
                std::process::exit(2);
            }
            let (service, updates) = ChatService::new(backend, config.stream.clone());
            let printer = tokio::spawn(print_updates(updates));
            let outcome = send(&service, &thread_id, &content).await?;
            drop(service);
            join_printer(printer).await;
            if outcome.state == SessionState::Errored {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

/// Stream one turn, cancelling it on Ctrl-C.
async fn send(
    service: &ChatService,
    thread_id: &str,
    content: &str,
) -> Result<TurnOutcome, buddy_core::ChatError> {
    let ticket = service.send(thread_id, content)?;
    let wait = ticket.wait();
    tokio::pin!(wait);
    tokio::select! {
        outcome = &mut wait => outcome,
        _ = tokio::signal::ctrl_c() => {
            service.cancel(thread_id);
            wait.await
        }
    }
}

/// Wait for the update printer; false when it panicked or was aborted.
async fn join_printer(printer: JoinHandle<()>) -> bool {
    match printer.await {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(error = %err, "update printer stopped abnormally");
            false
        }
    }
}

async fn print_updates(mut updates: mpsc::Receiver<ChatUpdate>) {
    let mut progress = Progress::new();
    while let Some(update) = updates.recv().await {
        match update {
            ChatUpdate::Turn { state, turn, .. } => {
                for line in progress.advance(&turn.agent_steps) {
                    println!("{line}");
                }
                if state.is_terminal() {
                    if let Some(reply) = render::reply_line(&turn) {
                        println!("{reply}");
                    }
                }
            }
            ChatUpdate::Title { title, .. } => println!("# {title}"),
            ChatUpdate::ReconcileFailed { error, .. } => {
                tracing::warn!(%error, "could not refresh the thread from the backend");
            }
            ChatUpdate::Reconciled { thread_id, turns } => {
                tracing::debug!(%thread_id, turns = turns.len(), "thread refreshed");
            }
            ChatUpdate::Closed { .. } => {}
        }
    }
}

fn parse_u64(key: &str, default: u64) -> u64 {
    match env::var(key) {
        Ok(v) => v.parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

fn parse_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"),
        Err(_) => default,
    }
}

fn tracing_filter(config: &BuddyConfig) -> tracing_subscriber::EnvFilter {
    let explicit = env::var("BUDDY_LOG").or_else(|_| env::var("RUST_LOG")).ok();
    if let Some(filter) = explicit {
        return tracing_subscriber::EnvFilter::new(filter);
    }
    if config.debug.enabled() {
        return tracing_subscriber::EnvFilter::new("debug");
    }
    tracing_subscriber::EnvFilter::new("warn")
}
