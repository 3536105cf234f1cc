//! Ordered store contract and bundled backends.
//!
//! The queue core only ever talks to an [`OrderedStore`]: a named collection of string
//! members, each with an `i64` score, that supports batched adds and an atomic
//! "select due members and remove them" claim.
//!
//! # Backends
//!
//! ```text
//! OrderedStore
//! ├── MemoryStore  (one mutex, claim runs under the lock)
//! └── SqliteStore  (claim is one BEGIN IMMEDIATE transaction)
//! ```
//!
//! `claim_due` is the only serialization point between concurrent consumers, so every
//! backend must execute it as a single indivisible operation. A read followed by a
//! separate remove lets two consumers observe the same member.

mod fs_secure;
mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::{SqliteOptions, SqliteStore};

use std::error::Error as StdError;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use qdelay_types::{DeadlineScore, QueueKey, ScoredToken};
use thiserror::Error;

/// Failure reported by a store backend. Never retried by the queue.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open store at {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
    #[error("store operation {op} failed: {source}")]
    Backend {
        op: &'static str,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
    #[error("store lock poisoned during {op}")]
    Poisoned { op: &'static str },
    #[error("store returned malformed data during {op}: {detail}")]
    Malformed { op: &'static str, detail: String },
}

impl StoreError {
    pub fn backend(op: &'static str, source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::Backend {
            op,
            source: source.into(),
        }
    }
}

/// Contract over an external sorted-collection store.
pub trait OrderedStore: Send + Sync {
    /// Add every entry to the collection named `key` in one call.
    ///
    /// Re-adding a token that is already stored replaces its score.
    fn add_entries(
        &self,
        key: &QueueKey,
        entries: &[ScoredToken],
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Atomically remove and return up to `max_count` entries whose score is
    /// `<= threshold`, lowest score first.
    ///
    /// Returns an empty vector when nothing is due. Two concurrent calls never return
    /// the same token.
    fn claim_due(
        &self,
        key: &QueueKey,
        threshold: DeadlineScore,
        max_count: usize,
    ) -> impl Future<Output = Result<Vec<ScoredToken>, StoreError>> + Send;

    /// Number of live entries under `key`, due or not.
    fn count(&self, key: &QueueKey) -> impl Future<Output = Result<usize, StoreError>> + Send;
}

impl<S: OrderedStore> OrderedStore for Arc<S> {
    fn add_entries(
        &self,
        key: &QueueKey,
        entries: &[ScoredToken],
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).add_entries(key, entries)
    }

    fn claim_due(
        &self,
        key: &QueueKey,
        threshold: DeadlineScore,
        max_count: usize,
    ) -> impl Future<Output = Result<Vec<ScoredToken>, StoreError>> + Send {
        (**self).claim_due(key, threshold, max_count)
    }

    fn count(&self, key: &QueueKey) -> impl Future<Output = Result<usize, StoreError>> + Send {
        (**self).count(key)
    }
}
