use std::time::SystemTime;

use crate::ids::DeadlineScore;

/// A claimed entry as seen by the consumer.
///
/// `data` is the raw payload string or the typed value, depending on the decode
/// strategy the queue was built with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayedResult<T> {
    /// Deadline the entry was scheduled for, in nanoseconds since the Unix epoch.
    pub timestamp_nanos: i64,
    pub data: T,
}

impl<T> DelayedResult<T> {
    #[must_use]
    pub fn new(score: DeadlineScore, data: T) -> Self {
        Self {
            timestamp_nanos: score.as_nanos(),
            data,
        }
    }

    #[must_use]
    pub fn score(&self) -> DeadlineScore {
        DeadlineScore::from_nanos(self.timestamp_nanos)
    }

    #[must_use]
    pub fn deadline(&self) -> SystemTime {
        self.score().to_system_time()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> DelayedResult<U> {
        DelayedResult {
            timestamp_nanos: self.timestamp_nanos,
            data: f(self.data),
        }
    }
}
