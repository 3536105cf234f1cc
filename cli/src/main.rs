//! qdelay CLI - schedule payloads and consume due ones from a SQLite-backed queue.
//!
//! # Flow
//!
//! ```text
//! main() -> Cli::parse -> QdelayConfig (file) -> flags override
//!        -> SqliteStore::open_with -> DelayedQueue -> add | add-at | read | watch | pending
//! ```
//!
//! Results are printed to stdout as `<deadline rfc3339>\t<payload>` lines. Logs go to
//! stderr and are filtered with `RUST_LOG` (default `info`).

mod args;

use std::io::{self, Write};

use anyhow::{Context, Result};
use chrono::SecondsFormat;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use qdelay_config::QdelayConfig;
use qdelay_core::{CancellationToken, DelayedQueue};
use qdelay_store::{OrderedStore, SqliteStore};
use qdelay_types::{DelayedResult, QueueKey};

use crate::args::{Cli, Command};

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout carries results, so logs go to stderr.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(env_filter)
        .init();
}

fn load_config(cli: &Cli) -> Result<QdelayConfig> {
    let loaded = match &cli.config {
        Some(path) => QdelayConfig::load_from(path)?,
        None => QdelayConfig::load()?,
    };
    Ok(loaded.unwrap_or_default())
}

fn print_results(results: &[DelayedResult<String>]) -> Result<()> {
    let mut out = io::stdout().lock();
    for result in results {
        let deadline = result
            .score()
            .to_datetime()
            .to_rfc3339_opts(SecondsFormat::Millis, true);
        writeln!(out, "{deadline}\t{}", result.data).context("Failed to write result")?;
    }
    out.flush().context("Failed to flush stdout")
}

async fn watch<S: OrderedStore>(queue: &DelayedQueue<S>, count: usize) -> Result<()> {
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, stopping");
            }
            cancel.cancel();
        });
    }

    tracing::info!(key = %queue.key(), "Watching for due entries (Ctrl-C to stop)");
    while !cancel.is_cancelled() {
        let results = queue.read_with_cancellation(&cancel, count).await?;
        print_results(&results)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let key = match &cli.key {
        Some(key) => QueueKey::new(key.clone())?,
        None => config.queue_key()?,
    };
    let db_path = cli
        .db
        .clone()
        .or_else(|| config.db_path())
        .context("Could not determine database path; pass --db")?;

    let store = SqliteStore::open_with(&db_path, config.sqlite_options())?;
    tracing::debug!(path = %db_path.display(), key = %key, "Opened queue");
    let queue = DelayedQueue::new(store, key).with_options(config.queue_options());

    match cli.command {
        Command::Add { delay, payloads } => {
            let count = payloads.len();
            queue.add(delay, payloads).await?;
            tracing::info!(
                count,
                delay = ?delay,
                "Payloads delayed, they become visible after the delay"
            );
        }
        Command::AddAt { deadline, payloads } => {
            let count = payloads.len();
            queue.add_by_deadline(deadline, payloads).await?;
            tracing::info!(count, deadline = %deadline.to_datetime(), "Payloads scheduled");
        }
        Command::Read { timeout, count } => {
            let results = queue.read(timeout, count).await?;
            if results.is_empty() {
                tracing::info!("No entries became due before the timeout");
            }
            print_results(&results)?;
        }
        Command::Watch { count } => watch(&queue, count).await?,
        Command::Pending => {
            let pending = queue.store().count(queue.key()).await?;
            println!("{pending}");
        }
    }

    Ok(())
}
