use std::sync::atomic::{AtomicU64, Ordering};

use qdelay_types::EntryId;
use uuid::Uuid;

/// Source of per-entry identifiers.
///
/// Ids must be unique among concurrently live entries across every producer that
/// writes to the same queue key, including producers on other hosts.
pub trait IdSource: Send + Sync {
    fn next_id(&self) -> EntryId;
}

/// Random v4 UUIDs in their 32-hex-digit form.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIdSource;

impl IdSource for UuidIdSource {
    fn next_id(&self) -> EntryId {
        EntryId::from_u128(Uuid::new_v4().as_u128())
    }
}

/// `prefix` in the high 64 bits, a process-local counter in the low 64 bits.
///
/// Deterministic, so only unique across producers that use distinct prefixes.
#[derive(Debug)]
pub struct SequentialIdSource {
    prefix: u64,
    next: AtomicU64,
}

impl SequentialIdSource {
    #[must_use]
    pub fn new(prefix: u64) -> Self {
        Self {
            prefix,
            next: AtomicU64::new(0),
        }
    }
}

impl IdSource for SequentialIdSource {
    fn next_id(&self) -> EntryId {
        let seq = self.next.fetch_add(1, Ordering::Relaxed);
        EntryId::from_u128((u128::from(self.prefix) << 64) | u128::from(seq))
    }
}
