//! SQLite-backed ordered store.
//!
//! One table holds every queue. The claim selects the due rows and deletes them inside
//! a single `BEGIN IMMEDIATE` transaction: the write lock is taken before the select,
//! so claimers in other processes that share the database file never read the same
//! rows.
//!
//! A claim waits at most [`SqliteOptions::claim_lock_wait`] for that lock. If another
//! connection still holds it, the claim reports nothing due and the poll loop retries
//! after one interval, so a blocked claim never delays cancellation or a read timeout.
//! Every driver call runs on the blocking thread pool.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Context;
use qdelay_types::{DeadlineScore, QueueKey, ScoredToken};
use rusqlite::{Connection, ErrorCode, TransactionBehavior, params};
use tokio::task::spawn_blocking;

use crate::fs_secure::prepare_db_file;
use crate::{OrderedStore, StoreError};

/// Connection settings for [`SqliteStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqliteOptions {
    /// How long adds and counts wait for another connection's write lock.
    pub busy_timeout: Duration,
    /// How long a claim waits for the write lock before reporting nothing due.
    pub claim_lock_wait: Duration,
}

impl Default for SqliteOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
            claim_lock_wait: Duration::ZERO,
        }
    }
}

/// Ordered store persisted in a SQLite database.
///
/// Clones share one connection.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
    options: SqliteOptions,
}

/// Attach the failing operation name to driver errors.
trait OpContext<T> {
    fn op(self, op: &'static str) -> Result<T, StoreError>;
}

impl<T> OpContext<T> for rusqlite::Result<T> {
    fn op(self, op: &'static str) -> Result<T, StoreError> {
        self.map_err(|err| StoreError::backend(op, err))
    }
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

/// Run a driver call on the blocking pool so lock waits never stall the runtime.
async fn blocking<T, F>(op: &'static str, f: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
{
    spawn_blocking(f)
        .await
        .map_err(|err| StoreError::backend(op, err))?
}

impl SqliteStore {
    const SCHEMA: &'static str = r"
        CREATE TABLE IF NOT EXISTS delayed_entries (
            queue_key TEXT NOT NULL,
            token TEXT NOT NULL,
            score INTEGER NOT NULL,
            PRIMARY KEY (queue_key, token)
        );

        CREATE INDEX IF NOT EXISTS idx_delayed_entries_due
        ON delayed_entries(queue_key, score);
    ";

    /// Open or create a queue database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with(path, SqliteOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: SqliteOptions) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let opened = prepare_db_file(path)
            .and_then(|()| {
                Connection::open(path)
                    .with_context(|| format!("Failed to open queue database at {}", path.display()))
            })
            .and_then(|db| Self::initialize(db, options, true));

        opened.map_err(|err| StoreError::Open {
            path: path.to_path_buf(),
            source: err.into(),
        })
    }

    /// Open a private in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Connection::open_in_memory()
            .context("Failed to open in-memory queue database")
            .and_then(|db| Self::initialize(db, SqliteOptions::default(), false))
            .map_err(|err| StoreError::Open {
                path: ":memory:".into(),
                source: err.into(),
            })
    }

    fn initialize(db: Connection, options: SqliteOptions, wal: bool) -> anyhow::Result<Self> {
        db.busy_timeout(options.busy_timeout)
            .context("Failed to set queue database busy timeout")?;
        if wal {
            db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
                .context("Failed to set queue database pragmas")?;
        }
        db.execute_batch(Self::SCHEMA)
            .context("Failed to create queue database schema")?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            options,
        })
    }

    fn lock(&self, op: &'static str) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.db.lock().map_err(|_| StoreError::Poisoned { op })
    }

    fn add_now(&self, key: &QueueKey, entries: &[ScoredToken]) -> Result<(), StoreError> {
        const OP: &str = "add_entries";
        let mut db = self.lock(OP)?;
        let tx = db.transaction().op(OP)?;
        {
            let mut insert = tx
                .prepare_cached(
                    "INSERT INTO delayed_entries (queue_key, token, score) VALUES (?1, ?2, ?3)
                     ON CONFLICT (queue_key, token) DO UPDATE SET score = excluded.score",
                )
                .op(OP)?;
            for entry in entries {
                insert
                    .execute(params![key.as_str(), entry.token, entry.score.as_nanos()])
                    .op(OP)?;
            }
        }
        tx.commit().op(OP)
    }

    fn claim_now(
        &self,
        key: &QueueKey,
        threshold: DeadlineScore,
        max_count: usize,
    ) -> Result<Vec<ScoredToken>, StoreError> {
        const OP: &str = "claim_due";
        let mut db = self.lock(OP)?;
        db.busy_timeout(self.options.claim_lock_wait).op(OP)?;
        let claimed = Self::claim_locked(&mut db, key, threshold, max_count);
        db.busy_timeout(self.options.busy_timeout).op(OP)?;
        claimed
    }

    fn claim_locked(
        db: &mut Connection,
        key: &QueueKey,
        threshold: DeadlineScore,
        max_count: usize,
    ) -> Result<Vec<ScoredToken>, StoreError> {
        const OP: &str = "claim_due";
        let limit = i64::try_from(max_count).unwrap_or(i64::MAX);
        let tx = match db.transaction_with_behavior(TransactionBehavior::Immediate) {
            Ok(tx) => tx,
            Err(err) if is_busy(&err) => {
                tracing::debug!(key = %key, "Write lock held elsewhere, nothing claimed");
                return Ok(Vec::new());
            }
            Err(err) => return Err(StoreError::backend(OP, err)),
        };

        let claimed = {
            let mut select = tx
                .prepare_cached(
                    "SELECT token, score FROM delayed_entries
                     WHERE queue_key = ?1 AND score <= ?2
                     ORDER BY score ASC, rowid ASC
                     LIMIT ?3",
                )
                .op(OP)?;
            let rows = select
                .query_map(params![key.as_str(), threshold.as_nanos(), limit], |row| {
                    Ok(ScoredToken {
                        token: row.get(0)?,
                        score: DeadlineScore::from_nanos(row.get(1)?),
                    })
                })
                .op(OP)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().op(OP)?
        };

        if claimed.is_empty() {
            return Ok(claimed);
        }

        {
            let mut delete = tx
                .prepare_cached("DELETE FROM delayed_entries WHERE queue_key = ?1 AND token = ?2")
                .op(OP)?;
            for entry in &claimed {
                let removed = delete.execute(params![key.as_str(), entry.token]).op(OP)?;
                if removed != 1 {
                    return Err(StoreError::Malformed {
                        op: OP,
                        detail: format!("expected to remove 1 row for a claimed token, removed {removed}"),
                    });
                }
            }
        }
        tx.commit().op(OP)?;

        tracing::trace!(key = %key, claimed = claimed.len(), "Claimed due entries");
        Ok(claimed)
    }

    fn count_now(&self, key: &QueueKey) -> Result<usize, StoreError> {
        const OP: &str = "count";
        let db = self.lock(OP)?;
        let count: i64 = db
            .query_row(
                "SELECT COUNT(*) FROM delayed_entries WHERE queue_key = ?1",
                params![key.as_str()],
                |row| row.get(0),
            )
            .op(OP)?;
        usize::try_from(count).map_err(|_| StoreError::Malformed {
            op: OP,
            detail: format!("negative row count {count}"),
        })
    }
}

impl OrderedStore for SqliteStore {
    async fn add_entries(&self, key: &QueueKey, entries: &[ScoredToken]) -> Result<(), StoreError> {
        let store = self.clone();
        let key = key.clone();
        let entries = entries.to_vec();
        blocking("add_entries", move || store.add_now(&key, &entries)).await
    }

    async fn claim_due(
        &self,
        key: &QueueKey,
        threshold: DeadlineScore,
        max_count: usize,
    ) -> Result<Vec<ScoredToken>, StoreError> {
        let store = self.clone();
        let key = key.clone();
        blocking("claim_due", move || store.claim_now(&key, threshold, max_count)).await
    }

    async fn count(&self, key: &QueueKey) -> Result<usize, StoreError> {
        let store = self.clone();
        let key = key.clone();
        blocking("count", move || store.count_now(&key)).await
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
