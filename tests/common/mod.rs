//! Shared test utilities and fixtures
//!
//! Queues over the bundled stores with a short poll interval, plus a typed payload.

#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use qdelay_core::DelayedQueue;
use qdelay_store::{MemoryStore, SqliteStore};
use qdelay_types::QueueKey;
use serde::{Deserialize, Serialize};

pub const POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleData {
    pub id: String,
    pub message: String,
}

impl SimpleData {
    pub fn new(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            message: message.into(),
        }
    }
}

pub fn key(name: &str) -> QueueKey {
    QueueKey::new(name).expect("test key is non-empty")
}

/// Raw-string queue over a fresh memory store.
pub fn memory_queue(name: &str) -> DelayedQueue<MemoryStore> {
    DelayedQueue::new(MemoryStore::new(), key(name)).with_poll_interval(POLL)
}

/// Raw-string queue over a SQLite database file at `path`.
pub fn sqlite_queue(path: &Path, name: &str) -> DelayedQueue<SqliteStore> {
    let store = SqliteStore::open(path).expect("open sqlite store");
    DelayedQueue::new(store, key(name)).with_poll_interval(POLL)
}
