//! Core domain types for qdelay.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer: the store adapters, the queue core and
//! the CLI.
//!
//! # Entry layout
//!
//! ```text
//! ordered collection (one per QueueKey)
//! ├── member: "<EntryId>:<payload_repr>"   (EntryToken)
//! └── score:  deadline in ns since epoch   (DeadlineScore)
//! ```

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod ids;
mod result;
mod token;

pub use ids::{DeadlineScore, EntryId, InvalidEntryId};
pub use result::DelayedResult;
pub use token::{DecodeError, EntryToken, ScoredToken, TOKEN_SEPARATOR};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ============================================================================
// Queue Key
// ============================================================================

/// Name of one logical queue's ordered collection.
///
/// Guaranteed to be non-empty (after trimming). Surrounding whitespace is kept
/// as-is so keys written by other producers match byte for byte.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QueueKey(String);

#[derive(Debug, Error)]
#[error("queue key must not be empty")]
pub struct EmptyQueueKey;

impl QueueKey {
    pub fn new(value: impl Into<String>) -> Result<Self, EmptyQueueKey> {
        let value = value.into();
        if value.trim().is_empty() {
            Err(EmptyQueueKey)
        } else {
            Ok(Self(value))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl TryFrom<String> for QueueKey {
    type Error = EmptyQueueKey;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for QueueKey {
    type Error = EmptyQueueKey;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<QueueKey> for String {
    fn from(value: QueueKey) -> Self {
        value.0
    }
}

impl AsRef<str> for QueueKey {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for QueueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
