//! Concurrent consumers never receive the same entry

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use qdelay_core::DelayedQueue;
use qdelay_store::{MemoryStore, OrderedStore};
use qdelay_types::DeadlineScore;

use crate::common::{POLL, key, sqlite_queue};

const ENTRIES: usize = 40;

fn payloads() -> Vec<String> {
    (0..ENTRIES).map(|i| format!("entry-{i}")).collect()
}

fn assert_partition(a: &[String], b: &[String]) {
    let left: HashSet<_> = a.iter().collect();
    let right: HashSet<_> = b.iter().collect();
    assert_eq!(left.len(), a.len(), "duplicate inside one consumer");
    assert_eq!(right.len(), b.len(), "duplicate inside one consumer");
    assert!(left.is_disjoint(&right), "entry delivered to both consumers");

    let expected = payloads();
    let union: HashSet<_> = left.union(&right).copied().collect();
    assert_eq!(union, expected.iter().collect::<HashSet<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_claims_partition_due_entries_in_memory() {
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(
        DelayedQueue::new(Arc::clone(&store), key("exclusive")).with_poll_interval(POLL),
    );
    queue
        .add_by_deadline(DeadlineScore::now(), payloads())
        .await
        .unwrap();

    let claim = |queue: Arc<DelayedQueue<Arc<MemoryStore>>>| {
        tokio::spawn(async move {
            queue
                .claim(ENTRIES)
                .await
                .unwrap()
                .into_results()
                .into_iter()
                .map(|r| r.data)
                .collect::<Vec<_>>()
        })
    };
    let (a, b) = tokio::join!(claim(Arc::clone(&queue)), claim(Arc::clone(&queue)));
    assert_partition(&a.unwrap(), &b.unwrap());
    assert_eq!(store.count(&key("exclusive")).await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn consumers_on_separate_connections_partition_entries() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("shared.db");

    let producer = sqlite_queue(&path, "shared");
    producer
        .add_by_deadline(DeadlineScore::now(), payloads())
        .await
        .unwrap();

    // Each consumer owns its own connection, as separate processes would.
    let consume = |path: std::path::PathBuf| {
        tokio::spawn(async move {
            let queue = sqlite_queue(&path, "shared");
            let mut seen = Vec::new();
            loop {
                let batch = queue
                    .read(Some(Duration::from_millis(50)), 3)
                    .await
                    .unwrap();
                if batch.is_empty() {
                    break seen;
                }
                seen.extend(batch.into_iter().map(|r| r.data));
            }
        })
    };

    let (a, b) = tokio::join!(consume(path.clone()), consume(path.clone()));
    assert_partition(&a.unwrap(), &b.unwrap());
}
