//! Error taxonomy for the journal and its collaborators.

use thiserror::Error;

use crate::models::EntryId;

/// Errors raised by journal operations.
///
/// Validation, not-found and state-transition failures are contract
/// violations by the caller and are never retried.
#[derive(Error, Debug)]
pub enum JournalError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("journal entry {0} not found")]
    NotFound(EntryId),

    #[error("invalid state transition for entry {id}: {reason}")]
    InvalidStateTransition { id: EntryId, reason: String },

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("corrupt journal record {id}: {reason}")]
    CorruptRecord { id: EntryId, reason: String },
}

impl JournalError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_transition(id: EntryId, reason: impl Into<String>) -> Self {
        Self::InvalidStateTransition {
            id,
            reason: reason.into(),
        }
    }
}

/// Errors raised while fetching price history.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketDataError {
    /// The source answered but had no usable bars.
    #[error("no data for {0}")]
    NoData(String),

    /// Rate limits, server errors and transport failures. Worth retrying.
    #[error("transient market data failure: {0}")]
    Transient(String),

    /// Bad request, unknown endpoint, undecodable payload.
    #[error("market data request failed: {0}")]
    Permanent(String),
}

impl MarketDataError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NoData(_) | Self::Transient(_))
    }
}

pub type JournalResult<T> = std::result::Result<T, JournalError>;
