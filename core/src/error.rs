use qdelay_store::StoreError;
use qdelay_types::DecodeError;
use thiserror::Error;

use crate::codec::CodecError;

/// Errors returned by [`DelayedQueue`](crate::DelayedQueue) operations.
///
/// "Nothing due yet" is not an error: claims report it as
/// [`ClaimOutcome::NoDataYet`](crate::ClaimOutcome::NoDataYet) and reads return an
/// empty vector.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Enqueue was called without payloads. Raised before the store is contacted.
    #[error("no payloads to enqueue")]
    NoData,
    /// Strict mode rejected a payload that does not decode into the queue's type.
    #[error("payload does not match the queue payload type")]
    DataTypeMismatch(#[source] DecodeError),
    #[error("failed to encode payload")]
    Encode(#[from] CodecError),
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A claimed entry could not be decoded. Every entry claimed by the same call has
    /// already been removed from the store.
    #[error("failed to decode claimed entry")]
    Decode(#[from] DecodeError),
}

impl QueueError {
    /// Short machine-friendly name of the error kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NoData => "no_data",
            Self::DataTypeMismatch(_) => "data_type_mismatch",
            Self::Encode(_) => "encode",
            Self::Store(_) => "store",
            Self::Decode(_) => "decode",
        }
    }
}
