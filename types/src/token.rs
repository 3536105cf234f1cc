//! Token codec: the single string stored per entry.
//!
//! A token is `<EntryId>:<payload_repr>`. The id never contains the separator, so
//! decoding splits on the first separator only and the payload may contain any
//! number of separators itself.

use std::error::Error as StdError;

use thiserror::Error;

use crate::ids::{DeadlineScore, EntryId};

pub const TOKEN_SEPARATOR: char = ':';

/// A claimed or stored entry could not be turned back into a payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("token has no ':' separator")]
    MissingSeparator,
    #[error("token carries an invalid entry id '{0}'")]
    InvalidId(String),
    #[error("payload could not be decoded as {target}: {source}")]
    Payload {
        target: &'static str,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl DecodeError {
    pub fn payload(
        target: &'static str,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Self::Payload {
            target,
            source: source.into(),
        }
    }
}

/// Decoded form of a stored token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryToken {
    pub id: EntryId,
    pub payload_repr: String,
}

impl EntryToken {
    #[must_use]
    pub fn new(id: EntryId, payload_repr: impl Into<String>) -> Self {
        Self {
            id,
            payload_repr: payload_repr.into(),
        }
    }

    #[must_use]
    pub fn encode(&self) -> String {
        let mut token = String::with_capacity(self.id.as_str().len() + 1 + self.payload_repr.len());
        token.push_str(self.id.as_str());
        token.push(TOKEN_SEPARATOR);
        token.push_str(&self.payload_repr);
        token
    }

    pub fn decode(token: &str) -> Result<Self, DecodeError> {
        let (id, payload_repr) = token
            .split_once(TOKEN_SEPARATOR)
            .ok_or(DecodeError::MissingSeparator)?;
        let id = EntryId::parse(id).map_err(|err| DecodeError::InvalidId(err.0))?;
        Ok(Self {
            id,
            payload_repr: payload_repr.to_string(),
        })
    }
}

/// One member of the ordered collection together with its score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredToken {
    pub token: String,
    pub score: DeadlineScore,
}

impl ScoredToken {
    #[must_use]
    pub fn new(token: impl Into<String>, score: DeadlineScore) -> Self {
        Self {
            token: token.into(),
            score,
        }
    }
}
