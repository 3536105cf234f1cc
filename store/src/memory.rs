//! In-process ordered store.
//!
//! Every queue key maps to a sorted set ordered by `(score, insertion seq)`. All
//! operations take the same mutex, so a claim is trivially atomic with respect to
//! every other claim and add in the process.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use qdelay_types::{DeadlineScore, QueueKey, ScoredToken};

use crate::{OrderedStore, StoreError};

/// Ordered store backed by process memory. Entries do not survive a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    queues: Mutex<HashMap<QueueKey, SortedSet>>,
}

#[derive(Debug, Default)]
struct SortedSet {
    by_score: BTreeSet<(DeadlineScore, u64, String)>,
    members: HashMap<String, (DeadlineScore, u64)>,
    next_seq: u64,
}

impl SortedSet {
    fn insert(&mut self, token: &str, score: DeadlineScore) {
        if let Some((old_score, old_seq)) = self.members.remove(token) {
            self.by_score.remove(&(old_score, old_seq, token.to_string()));
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.members.insert(token.to_string(), (score, seq));
        self.by_score.insert((score, seq, token.to_string()));
    }

    fn pop_due(&mut self, threshold: DeadlineScore, max_count: usize) -> Vec<ScoredToken> {
        let mut claimed = Vec::new();
        while claimed.len() < max_count {
            match self.by_score.first() {
                Some((score, _, _)) if *score <= threshold => {}
                _ => break,
            }
            let Some((score, _, token)) = self.by_score.pop_first() else {
                break;
            };
            self.members.remove(&token);
            claimed.push(ScoredToken { token, score });
        }
        claimed
    }

    fn len(&self) -> usize {
        self.members.len()
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
        op: &'static str,
    ) -> Result<MutexGuard<'_, HashMap<QueueKey, SortedSet>>, StoreError> {
        self.queues.lock().map_err(|_| StoreError::Poisoned { op })
    }

    fn add_now(&self, key: &QueueKey, entries: &[ScoredToken]) -> Result<(), StoreError> {
        let mut queues = self.lock("add_entries")?;
        let set = queues.entry(key.clone()).or_default();
        for entry in entries {
            set.insert(&entry.token, entry.score);
        }
        Ok(())
    }

    fn claim_now(
        &self,
        key: &QueueKey,
        threshold: DeadlineScore,
        max_count: usize,
    ) -> Result<Vec<ScoredToken>, StoreError> {
        let mut queues = self.lock("claim_due")?;
        let Some(set) = queues.get_mut(key) else {
            return Ok(Vec::new());
        };
        let claimed = set.pop_due(threshold, max_count);
        if set.members.is_empty() {
            queues.remove(key);
        }
        Ok(claimed)
    }

    fn count_now(&self, key: &QueueKey) -> Result<usize, StoreError> {
        let queues = self.lock("count")?;
        Ok(queues.get(key).map_or(0, SortedSet::len))
    }
}

impl OrderedStore for MemoryStore {
    async fn add_entries(&self, key: &QueueKey, entries: &[ScoredToken]) -> Result<(), StoreError> {
        self.add_now(key, entries)
    }

    async fn claim_due(
        &self,
        key: &QueueKey,
        threshold: DeadlineScore,
        max_count: usize,
    ) -> Result<Vec<ScoredToken>, StoreError> {
        self.claim_now(key, threshold, max_count)
    }

    async fn count(&self, key: &QueueKey) -> Result<usize, StoreError> {
        self.count_now(key)
    }
}
