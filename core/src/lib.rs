//! Delayed-delivery queue core.
//!
//! Producers schedule payloads for a future deadline; consumers block until due
//! payloads exist and claim them atomically, so no two consumers receive the same
//! entry. Coordination happens only through the [`OrderedStore`](qdelay_store::OrderedStore).
//!
//! # Architecture
//!
//! ```text
//! DelayedQueue<S, D, C>
//! ├── store:   S: OrderedStore   (add_entries / claim_due)
//! ├── ids:     dyn IdSource      (unique token prefix per entry)
//! ├── codec:   C: Codec          (payload -> text, JsonCodec by default)
//! └── decoder: D: DecodeStrategy (RawString or Typed<T>)
//!
//! write: add / add_by_deadline -> EntryToken -> add_entries
//! read:  read* -> poll loop -> claim -> claim_due -> EntryToken::decode -> D
//! ```
//!
//! Delivery is at-most-once per claim: an entry is removed from the store before it is
//! handed to the caller and is never returned to the queue.

mod codec;
mod error;
mod ids;
mod queue;

pub use codec::{Codec, CodecError, DecodeStrategy, JsonCodec, RawString, Typed};
pub use error::QueueError;
pub use ids::{IdSource, SequentialIdSource, UuidIdSource};
pub use queue::{ClaimOutcome, DEFAULT_POLL_INTERVAL, DelayedQueue, QueueOptions};

pub use tokio_util::sync::CancellationToken;
