use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::token::TOKEN_SEPARATOR;

/// Per-entry unique identifier, the prefix of every stored token.
///
/// Never empty and never contains [`TOKEN_SEPARATOR`], so the first separator in a
/// token always terminates the id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntryId(String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid entry id '{0}': must be non-empty and must not contain ':'")]
pub struct InvalidEntryId(pub String);

impl EntryId {
    pub fn parse(value: impl Into<String>) -> Result<Self, InvalidEntryId> {
        let value = value.into();
        if value.is_empty() || value.contains(TOKEN_SEPARATOR) {
            return Err(InvalidEntryId(value));
        }
        Ok(Self(value))
    }

    /// Fixed-width form: 32 lowercase hex digits.
    #[must_use]
    pub fn from_u128(value: u128) -> Self {
        Self(format!("{value:032x}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for EntryId {
    type Error = InvalidEntryId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<EntryId> for String {
    fn from(value: EntryId) -> Self {
        value.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deadline of an entry in nanoseconds since the Unix epoch.
///
/// This is the score of the entry in the ordered collection. Conversions saturate at
/// the `i64` bounds (roughly the years 1677 and 2262); times before the epoch map to
/// negative scores.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct DeadlineScore(i64);

impl DeadlineScore {
    #[must_use]
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    #[must_use]
    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    /// Score for the current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        Self::from(SystemTime::now())
    }

    /// Score for `delay` after the current wall-clock time.
    #[must_use]
    pub fn after(delay: Duration) -> Self {
        Self::now().saturating_add(delay)
    }

    #[must_use]
    pub fn saturating_add(self, delay: Duration) -> Self {
        let delta = i64::try_from(delay.as_nanos()).unwrap_or(i64::MAX);
        Self(self.0.saturating_add(delta))
    }

    #[must_use]
    pub fn to_system_time(self) -> SystemTime {
        let magnitude = Duration::from_nanos(self.0.unsigned_abs());
        if self.0 >= 0 {
            UNIX_EPOCH + magnitude
        } else {
            UNIX_EPOCH - magnitude
        }
    }

    #[must_use]
    pub fn to_datetime(self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.0)
    }
}

impl From<SystemTime> for DeadlineScore {
    fn from(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(after) => Self(i64::try_from(after.as_nanos()).unwrap_or(i64::MAX)),
            Err(before) => {
                let nanos = i64::try_from(before.duration().as_nanos()).unwrap_or(i64::MAX);
                Self(-nanos)
            }
        }
    }
}

impl From<DateTime<Utc>> for DeadlineScore {
    fn from(time: DateTime<Utc>) -> Self {
        let nanos = time.timestamp_nanos_opt().unwrap_or_else(|| {
            if time.timestamp() < 0 {
                i64::MIN
            } else {
                i64::MAX
            }
        });
        Self(nanos)
    }
}

impl fmt::Display for DeadlineScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
