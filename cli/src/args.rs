//! Command-line parsing.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use qdelay_types::DeadlineScore;

const DEFAULT_COUNT: usize = 10;

#[derive(Debug, Parser)]
#[command(name = "qdelay", version)]
#[command(about = "Schedule payloads for later and consume them once they are due")]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Config file (default: $QDELAY_CONFIG or ~/.qdelay/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// Queue database file
    #[arg(long, value_name = "PATH")]
    pub db: Option<PathBuf>,
    /// Queue key
    #[arg(long)]
    pub key: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Schedule payloads after a delay
    Add {
        /// Delay in milliseconds
        #[arg(value_name = "DELAY_MS", value_parser = parse_millis)]
        delay: Duration,
        #[arg(allow_hyphen_values = true)]
        payloads: Vec<String>,
    },
    /// Schedule payloads at unix milliseconds or an RFC 3339 time
    AddAt {
        #[arg(value_parser = parse_deadline)]
        deadline: DeadlineScore,
        #[arg(allow_hyphen_values = true)]
        payloads: Vec<String>,
    },
    /// One blocking read (a timeout of 0 waits forever)
    Read {
        #[arg(long = "timeout-ms", value_name = "MS", value_parser = parse_millis)]
        timeout: Option<Duration>,
        #[arg(long, default_value_t = DEFAULT_COUNT, value_parser = parse_count)]
        count: usize,
    },
    /// Read in a loop until Ctrl-C
    Watch {
        #[arg(long, default_value_t = DEFAULT_COUNT, value_parser = parse_count)]
        count: usize,
    },
    /// Print the number of stored entries
    Pending,
}

fn parse_millis(raw: &str) -> Result<Duration, String> {
    raw.parse()
        .map(Duration::from_millis)
        .map_err(|_| format!("expected a non-negative integer, got {raw}"))
}

fn parse_count(raw: &str) -> Result<usize, String> {
    match raw.parse::<usize>() {
        Ok(0) => Err("count must be at least 1".to_string()),
        Ok(count) => Ok(count),
        Err(_) => Err(format!("expected a positive integer, got {raw}")),
    }
}

/// Unix milliseconds, or an RFC 3339 timestamp.
fn parse_deadline(raw: &str) -> Result<DeadlineScore, String> {
    if let Ok(ms) = raw.parse::<i64>() {
        return Ok(DeadlineScore::from_nanos(ms.saturating_mul(1_000_000)));
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| DeadlineScore::from(parsed.with_timezone(&Utc)))
        .map_err(|_| format!("expected unix milliseconds or RFC 3339, got {raw}"))
}
