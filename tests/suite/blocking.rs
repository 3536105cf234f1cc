//! Blocking read, timeout and cancellation

use std::sync::Arc;
use std::time::{Duration, Instant};

use qdelay_core::{CancellationToken, DelayedQueue, QueueOptions};
use qdelay_store::MemoryStore;
use qdelay_types::DeadlineScore;
use rusqlite::Connection;
use tokio::time::timeout;

use crate::common::{POLL, SimpleData, key, memory_queue, sqlite_queue};

#[tokio::test]
async fn unbounded_read_returns_within_a_poll_interval_of_due() {
    let queue = memory_queue("blocking");
    let delay = Duration::from_millis(150);
    queue.add(delay, ["wake"]).await.unwrap();
    let due = DeadlineScore::after(delay);

    let results = timeout(Duration::from_secs(2), queue.read(None, 1))
        .await
        .expect("read should return once the entry is due")
        .unwrap();
    let returned = DeadlineScore::now();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].data, "wake");
    assert!(returned >= results[0].score());
    // One interval plus scheduler jitter.
    let late_nanos = returned.as_nanos().saturating_sub(due.as_nanos());
    let late_by = Duration::from_nanos(u64::try_from(late_nanos).unwrap_or(0));
    assert!(late_by <= POLL * 3, "returned {late_by:?} after due");
}

#[tokio::test]
async fn bounded_read_without_data_returns_empty() {
    let queue = memory_queue("bounded");
    let started = Instant::now();
    let results = queue
        .read(Some(Duration::from_millis(100)), 10)
        .await
        .unwrap();
    assert!(results.is_empty());
    assert!(started.elapsed() >= Duration::from_millis(100));
}

#[tokio::test]
async fn cancellation_before_read_returns_empty_quickly() {
    let queue = DelayedQueue::new(MemoryStore::new(), key("cancelled"))
        .with_poll_interval(Duration::from_millis(25));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let started = Instant::now();
    let results = queue.read_with_cancellation(&cancel, 10).await.unwrap();
    assert!(results.is_empty());
    assert!(started.elapsed() < Duration::from_millis(25) * 4);
}

#[tokio::test]
async fn cancellation_beats_long_timeout() {
    let queue = DelayedQueue::new(MemoryStore::new(), key("race"))
        .with_options(QueueOptions {
            poll_interval: Duration::from_millis(25),
            ..QueueOptions::default()
        });
    let cancel = CancellationToken::new();

    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(40)).await;
            cancel.cancel();
        })
    };

    let started = Instant::now();
    let results = queue
        .read_until(Some(Duration::from_secs(60)), &cancel, 10)
        .await
        .unwrap();
    canceller.await.unwrap();

    assert!(results.is_empty());
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn consumer_drains_producer_with_mixed_delays() {
    let queue = Arc::new(memory_queue("mixed").typed::<SimpleData>());
    let cancel = CancellationToken::new();

    let producer = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move {
            for i in 0..6u64 {
                // Early producers pick longer delays so deadlines arrive out of order.
                let delay = Duration::from_millis(if i < 3 { 150 - i * 40 } else { 30 });
                queue
                    .add(delay, [SimpleData::new(i.to_string(), "Hello world")])
                    .await
                    .unwrap();
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
    };

    let consumer = {
        let queue = Arc::clone(&queue);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut seen = Vec::new();
            while seen.len() < 6 && !cancel.is_cancelled() {
                let batch = queue
                    .read_until(Some(Duration::from_secs(1)), &cancel, 2)
                    .await
                    .unwrap();
                assert!(batch.len() <= 2);
                assert!(batch.windows(2).all(|w| w[0].timestamp_nanos <= w[1].timestamp_nanos));
                seen.extend(batch.into_iter().map(|r| r.data.id));
            }
            seen
        })
    };

    producer.await.unwrap();
    let mut seen = timeout(Duration::from_secs(5), consumer)
        .await
        .expect("consumer should drain all entries")
        .unwrap();
    cancel.cancel();

    seen.sort();
    assert_eq!(seen, ["0", "1", "2", "3", "4", "5"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancellation_is_observed_while_another_process_holds_the_lock() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("contended.db");
    let queue = sqlite_queue(&path, "contended");
    queue.add(Duration::ZERO, ["held"]).await.unwrap();

    let holder = Connection::open(&path).unwrap();
    holder.execute_batch("BEGIN IMMEDIATE;").unwrap();

    let cancel = CancellationToken::new();
    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        })
    };

    let started = Instant::now();
    let results = queue.read_with_cancellation(&cancel, 10).await.unwrap();
    canceller.await.unwrap();
    assert!(results.is_empty());
    assert!(
        started.elapsed() < Duration::from_millis(500),
        "cancellation took {:?}",
        started.elapsed()
    );

    // The entry was never claimed, so it is still there once the lock is released.
    holder.execute_batch("ROLLBACK;").unwrap();
    let results = queue.read(Some(Duration::from_secs(1)), 10).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].data, "held");
}
