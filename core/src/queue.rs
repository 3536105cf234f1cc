//! The delayed queue: enqueue, atomic claim, and the blocking poll loop.
//!
//! # Read state machine
//!
//! ```text
//!            claim() -> Claimed ──────────────► Done(results)
//!   Polling ─ claim() -> Err ─────────────────► Failed(err)
//!      ▲     claim() -> NoDataYet ─► suspend ─┬ interval ──► Polling
//!      │                                      └ deadline / cancel ─► Done([])
//!      └──────────────────────────────────────────┘
//! ```
//!
//! The suspend step races the poll interval against the optional deadline and the
//! optional cancellation token, so a read never waits more than one interval past
//! cancellation and never holds a lock while waiting.

use std::future::pending;
use std::time::Duration;

use qdelay_store::OrderedStore;
use qdelay_types::{DeadlineScore, DelayedResult, EntryToken, QueueKey, ScoredToken};
use serde::Serialize;
use tokio::time::{Instant, sleep, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::codec::{Codec, DecodeStrategy, JsonCodec, RawString, Typed};
use crate::error::QueueError;
use crate::ids::{IdSource, UuidIdSource};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runtime knobs for a [`DelayedQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueOptions {
    /// Wait between unsuccessful claim attempts. Also the worst-case extra latency
    /// after an entry becomes due.
    pub poll_interval: Duration,
    /// Reject payloads at enqueue time that the queue's decode strategy could not
    /// materialize. Only meaningful for [`Typed`] queues.
    pub strict_payload_type: bool,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            strict_payload_type: false,
        }
    }
}

/// Result of a single claim attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome<T> {
    Claimed(Vec<DelayedResult<T>>),
    NoDataYet,
}

impl<T> ClaimOutcome<T> {
    #[must_use]
    pub fn into_results(self) -> Vec<DelayedResult<T>> {
        match self {
            Self::Claimed(results) => results,
            Self::NoDataYet => Vec::new(),
        }
    }
}

enum PollState<T> {
    Polling,
    Done(Vec<DelayedResult<T>>),
    Failed(QueueError),
}

enum Wake {
    Interval,
    Deadline,
    Cancelled,
}

/// A delayed-delivery queue over one key of an [`OrderedStore`].
pub struct DelayedQueue<S, D = RawString, C = JsonCodec> {
    store: S,
    key: QueueKey,
    options: QueueOptions,
    ids: Box<dyn IdSource>,
    codec: C,
    decoder: D,
}

impl<S: OrderedStore> DelayedQueue<S> {
    /// Queue returning raw payload strings, with JSON encoding and UUID entry ids.
    pub fn new(store: S, key: QueueKey) -> Self {
        Self {
            store,
            key,
            options: QueueOptions::default(),
            ids: Box::new(UuidIdSource),
            codec: JsonCodec,
            decoder: RawString,
        }
    }
}

impl<S, D, C> DelayedQueue<S, D, C> {
    #[must_use]
    pub fn with_options(mut self, options: QueueOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.options.poll_interval = poll_interval;
        self
    }

    #[must_use]
    pub fn with_id_source(mut self, ids: impl IdSource + 'static) -> Self {
        self.ids = Box::new(ids);
        self
    }

    /// Switch reads to deserializing payloads into `T`.
    pub fn typed<T>(self) -> DelayedQueue<S, Typed<T>, C> {
        self.with_decoder(Typed::new())
    }

    pub fn with_decoder<D2>(self, decoder: D2) -> DelayedQueue<S, D2, C> {
        DelayedQueue {
            store: self.store,
            key: self.key,
            options: self.options,
            ids: self.ids,
            codec: self.codec,
            decoder,
        }
    }

    pub fn with_codec<C2>(self, codec: C2) -> DelayedQueue<S, D, C2> {
        DelayedQueue {
            store: self.store,
            key: self.key,
            options: self.options,
            ids: self.ids,
            codec,
            decoder: self.decoder,
        }
    }

    pub fn key(&self) -> &QueueKey {
        &self.key
    }

    pub fn options(&self) -> &QueueOptions {
        &self.options
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S, D, C> DelayedQueue<S, D, C>
where
    S: OrderedStore,
    D: DecodeStrategy,
    C: Codec,
{
    /// Schedule `payloads` to become due `delay` from now.
    ///
    /// The clock is read once, so every payload of the call shares one deadline.
    pub async fn add<I>(&self, delay: Duration, payloads: I) -> Result<(), QueueError>
    where
        I: IntoIterator,
        I::Item: Serialize,
    {
        self.add_by_deadline(DeadlineScore::after(delay), payloads)
            .await
    }

    /// Schedule `payloads` to become due at `deadline`.
    ///
    /// Every payload gets a fresh entry id, so identical payloads scheduled for the
    /// same instant stay independent entries. All entries are written with one
    /// `add_entries` call.
    pub async fn add_by_deadline<I>(
        &self,
        deadline: impl Into<DeadlineScore>,
        payloads: I,
    ) -> Result<(), QueueError>
    where
        I: IntoIterator,
        I::Item: Serialize,
    {
        let score = deadline.into();
        let reprs = payloads
            .into_iter()
            .map(|payload| self.codec.encode(&payload))
            .collect::<Result<Vec<_>, _>>()?;
        if reprs.is_empty() {
            return Err(QueueError::NoData);
        }

        if self.options.strict_payload_type {
            for repr in &reprs {
                self.decoder
                    .accepts(&self.codec, repr)
                    .map_err(QueueError::DataTypeMismatch)?;
            }
        }

        let entries: Vec<ScoredToken> = reprs
            .into_iter()
            .map(|repr| ScoredToken::new(EntryToken::new(self.ids.next_id(), repr).encode(), score))
            .collect();

        self.store.add_entries(&self.key, &entries).await?;
        debug!(key = %self.key, count = entries.len(), score = %score, "Enqueued delayed entries");
        Ok(())
    }

    /// One non-blocking attempt to claim up to `count` due entries.
    ///
    /// Due means a deadline at or before this process's current clock. A `count` of
    /// zero is treated as one. If any claimed entry fails to decode the whole call
    /// fails and the other entries of the claim are dropped with it.
    pub async fn claim(&self, count: usize) -> Result<ClaimOutcome<D::Output>, QueueError> {
        let threshold = DeadlineScore::now();
        let claimed = self
            .store
            .claim_due(&self.key, threshold, count.max(1))
            .await?;
        if claimed.is_empty() {
            return Ok(ClaimOutcome::NoDataYet);
        }

        let total = claimed.len();
        let mut results = Vec::with_capacity(total);
        for entry in claimed {
            match self.materialize(entry) {
                Ok(result) => results.push(result),
                Err(err) => {
                    warn!(
                        key = %self.key,
                        lost = total,
                        error = %err,
                        "Claimed entries dropped: payload could not be decoded"
                    );
                    return Err(err);
                }
            }
        }

        debug!(key = %self.key, count = total, "Claimed due entries");
        Ok(ClaimOutcome::Claimed(results))
    }

    fn materialize(&self, entry: ScoredToken) -> Result<DelayedResult<D::Output>, QueueError> {
        let token = EntryToken::decode(&entry.token)?;
        let data = self.decoder.materialize(&self.codec, token.payload_repr)?;
        Ok(DelayedResult::new(entry.score, data))
    }

    /// Block until due entries are claimed or `block` elapses.
    ///
    /// `None` or a zero duration waits indefinitely. Returns an empty vector when the
    /// wait ends without data.
    pub async fn read(
        &self,
        block: Option<Duration>,
        count: usize,
    ) -> Result<Vec<DelayedResult<D::Output>>, QueueError> {
        self.poll(deadline_for(block), None, count).await
    }

    /// Block until due entries are claimed or `cancel` fires.
    pub async fn read_with_cancellation(
        &self,
        cancel: &CancellationToken,
        count: usize,
    ) -> Result<Vec<DelayedResult<D::Output>>, QueueError> {
        self.poll(None, Some(cancel), count).await
    }

    /// Block until due entries are claimed, `block` elapses, or `cancel` fires.
    pub async fn read_until(
        &self,
        block: Option<Duration>,
        cancel: &CancellationToken,
        count: usize,
    ) -> Result<Vec<DelayedResult<D::Output>>, QueueError> {
        self.poll(deadline_for(block), Some(cancel), count).await
    }

    async fn poll(
        &self,
        deadline: Option<Instant>,
        cancel: Option<&CancellationToken>,
        count: usize,
    ) -> Result<Vec<DelayedResult<D::Output>>, QueueError> {
        let mut state = PollState::Polling;
        loop {
            state = match state {
                PollState::Polling => match self.claim(count).await {
                    Ok(ClaimOutcome::Claimed(results)) => PollState::Done(results),
                    Err(err) => PollState::Failed(err),
                    Ok(ClaimOutcome::NoDataYet) => match self.suspend(deadline, cancel).await {
                        Wake::Interval => PollState::Polling,
                        Wake::Deadline | Wake::Cancelled => PollState::Done(Vec::new()),
                    },
                },
                PollState::Done(results) => return Ok(results),
                PollState::Failed(err) => return Err(err),
            };
        }
    }

    async fn suspend(&self, deadline: Option<Instant>, cancel: Option<&CancellationToken>) -> Wake {
        let expired = async {
            match deadline {
                Some(at) => sleep_until(at).await,
                None => pending().await,
            }
        };
        let cancelled = async {
            match cancel {
                Some(token) => token.cancelled().await,
                None => pending().await,
            }
        };

        let wake = tokio::select! {
            biased;
            () = cancelled => Wake::Cancelled,
            () = expired => Wake::Deadline,
            () = sleep(self.options.poll_interval) => Wake::Interval,
        };
        match wake {
            Wake::Cancelled => debug!(key = %self.key, "Read cancelled while waiting"),
            Wake::Deadline => debug!(key = %self.key, "Read timed out while waiting"),
            Wake::Interval => {}
        }
        wake
    }
}

fn deadline_for(block: Option<Duration>) -> Option<Instant> {
    block
        .filter(|block| !block.is_zero())
        .map(|block| Instant::now() + block)
}
