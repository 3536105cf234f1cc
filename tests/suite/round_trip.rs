//! Enqueue / claim behavior end to end

use std::time::{Duration, SystemTime};

use qdelay_core::{ClaimOutcome, DelayedQueue, QueueError};
use qdelay_store::{OrderedStore, SqliteStore};
use qdelay_types::DeadlineScore;
use serde::{Deserialize, Serialize};

use crate::common::{SimpleData, key, memory_queue, sqlite_queue};

#[tokio::test]
async fn delayed_payload_round_trips_with_deadline() {
    let queue = memory_queue("round-trip");
    let enqueued_at = SystemTime::now();
    queue.add(Duration::from_millis(200), ["hello"]).await.unwrap();

    let results = queue
        .read(Some(Duration::from_secs(2)), 10)
        .await
        .unwrap();
    let returned_at = SystemTime::now();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].data, "hello");
    let deadline = results[0].deadline();
    assert!(deadline >= enqueued_at + Duration::from_millis(200));
    assert!(deadline <= returned_at);
}

#[tokio::test]
async fn sqlite_round_trip_keeps_payload_text() {
    let tmp = tempfile::tempdir().unwrap();
    let queue = sqlite_queue(&tmp.path().join("q.db"), "texts");
    queue
        .add(Duration::ZERO, ["aaa", "b:b:b", "{not json"])
        .await
        .unwrap();

    let mut data: Vec<String> = queue
        .read(Some(Duration::from_secs(1)), 10)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.data)
        .collect();
    data.sort();
    assert_eq!(data, ["aaa", "b:b:b", "{not json"]);
}

#[tokio::test]
async fn identical_payloads_at_same_deadline_are_kept() {
    let tmp = tempfile::tempdir().unwrap();
    let queue = sqlite_queue(&tmp.path().join("q.db"), "dupes");
    let deadline = DeadlineScore::now();

    queue.add_by_deadline(deadline, ["x"]).await.unwrap();
    queue.add_by_deadline(deadline, ["x"]).await.unwrap();

    let results = queue.claim(10).await.unwrap().into_results();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.data == "x" && r.score() == deadline));
}

#[tokio::test]
async fn earlier_deadline_is_claimed_first() {
    let tmp = tempfile::tempdir().unwrap();
    let queue = sqlite_queue(&tmp.path().join("q.db"), "order");
    let now = SystemTime::now();

    queue
        .add_by_deadline(now - Duration::from_secs(1), ["t1"])
        .await
        .unwrap();
    queue
        .add_by_deadline(now - Duration::from_secs(2), ["t0"])
        .await
        .unwrap();

    let first = queue.claim(1).await.unwrap().into_results();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].data, "t0");
}

#[tokio::test]
async fn not_yet_due_entries_are_suppressed() {
    let queue = memory_queue("later");
    queue.add(Duration::from_millis(300), ["x"]).await.unwrap();

    assert_eq!(queue.claim(10).await.unwrap(), ClaimOutcome::NoDataYet);

    tokio::time::sleep(Duration::from_millis(320)).await;
    let results = queue.claim(10).await.unwrap().into_results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].data, "x");
}

#[tokio::test]
async fn empty_enqueue_is_no_data() {
    let queue = memory_queue("empty");
    let err = queue
        .add(Duration::from_secs(1), std::iter::empty::<&str>())
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::NoData));
    assert_eq!(queue.store().count(&key("empty")).await.unwrap(), 0);
}

#[tokio::test]
async fn typed_reader_over_shared_database() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("typed.db");

    let writer = sqlite_queue(&path, "typed");
    let payloads = [
        SimpleData::new("1234", "Hello world"),
        SimpleData::new("5678", "Goodbye moon"),
    ];
    writer.add(Duration::ZERO, &payloads).await.unwrap();

    let reader = DelayedQueue::new(SqliteStore::open(&path).unwrap(), key("typed"))
        .typed::<SimpleData>();
    let mut results: Vec<SimpleData> = reader
        .read(Some(Duration::from_secs(1)), 2)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.data)
        .collect();
    results.sort_by(|a, b| a.id.cmp(&b.id));
    assert_eq!(results, payloads);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
enum Priority {
    High,
    Low,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Tag(String);

#[tokio::test]
async fn string_shaped_payloads_round_trip_through_sqlite() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("shapes.db");

    let priorities = DelayedQueue::new(SqliteStore::open(&path).unwrap(), key("priorities"))
        .typed::<Priority>();
    priorities
        .add(Duration::ZERO, [Priority::Low, Priority::High])
        .await
        .unwrap();
    let mut got: Vec<Priority> = priorities
        .read(Some(Duration::from_secs(1)), 10)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.data)
        .collect();
    got.sort();
    assert_eq!(got, [Priority::High, Priority::Low]);

    let tags =
        DelayedQueue::new(SqliteStore::open(&path).unwrap(), key("tags")).typed::<Tag>();
    tags.add(Duration::ZERO, [Tag("a:b".into())]).await.unwrap();
    let results = tags.read(Some(Duration::from_secs(1)), 10).await.unwrap();
    assert_eq!(results[0].data, Tag("a:b".into()));

    let numbers =
        DelayedQueue::new(SqliteStore::open(&path).unwrap(), key("numbers")).typed::<u64>();
    numbers.add(Duration::ZERO, [7_u64]).await.unwrap();
    let results = numbers.read(Some(Duration::from_secs(1)), 10).await.unwrap();
    assert_eq!(results[0].data, 7);
}

#[tokio::test]
async fn text_written_raw_is_read_by_string_queue() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("text.db");
    sqlite_queue(&path, "text")
        .add(Duration::ZERO, ["{not json", "42"])
        .await
        .unwrap();

    let reader =
        DelayedQueue::new(SqliteStore::open(&path).unwrap(), key("text")).typed::<String>();
    let mut got: Vec<String> = reader
        .read(Some(Duration::from_secs(1)), 10)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.data)
        .collect();
    got.sort();
    assert_eq!(got, ["42", "{not json"]);
}

#[tokio::test]
async fn queues_on_different_keys_do_not_interfere() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("keys.db");
    let jobs = sqlite_queue(&path, "jobs");
    let mail = sqlite_queue(&path, "mail");

    jobs.add(Duration::ZERO, ["job"]).await.unwrap();

    assert_eq!(mail.claim(10).await.unwrap(), ClaimOutcome::NoDataYet);
    let results = jobs.claim(10).await.unwrap().into_results();
    assert_eq!(results[0].data, "job");
}
