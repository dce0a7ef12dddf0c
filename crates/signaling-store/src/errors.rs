//! Signaling store error types.
//!
//! The taxonomy follows a strict split between *failures* and
//! *outcomes*:
//!
//! - Store communication problems and malformed inputs are errors and
//!   propagate to the caller unmodified.
//! - "Not found" on a read path is `Ok(None)`, never an error.
//! - A lapsed participant on refresh is `Ok(false)`, never an error.
//! - Capacity rejections (`RoomFull`, `ClientCapacityTooLow`) are
//!   typed failures the boundary layer branches on explicitly.

use thiserror::Error;

/// Signaling store error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The key-value engine is unreachable or returned an error.
    /// Propagated verbatim; the boundary layer maps this to a
    /// service-unavailable response. Never retried inside the core.
    #[error("storage backend error: {0}")]
    Redis(String),

    /// An entity a mutation depends on does not exist.
    /// Read paths return `Ok(None)` instead of this variant.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Room admission rejected: the effective capacity is already
    /// reached by the active participants.
    #[error("room is full (effective capacity {effective_capacity})")]
    RoomFull {
        /// The binding cap at the moment of rejection.
        effective_capacity: u32,
    },

    /// Room admission rejected: the joining client itself cannot
    /// support the room's current population.
    #[error("client capacity {client_max_size} too low for {active_count} active participants")]
    ClientCapacityTooLow {
        /// The joiner's self-declared capacity.
        client_max_size: u32,
        /// Active participants at the moment of rejection.
        active_count: u32,
    },

    /// The call state encoder was given an unrecognized event token.
    /// The state set is left untouched.
    #[error("invalid call state event: {0}")]
    InvalidStateEvent(String),

    /// A required field is missing or malformed. Detected before any
    /// store operation is issued.
    #[error("validation error: {0}")]
    Validation(String),

    /// A stored entity could not be decoded.
    #[error("stored entity corrupt: {0}")]
    Serialization(String),

    /// An unexpected internal failure, such as the system random
    /// generator refusing to produce token bytes.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Redis(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Reject empty identifiers before they reach the store.
///
/// The store key scheme concatenates identifiers into key names; an
/// empty segment would silently alias another key, so every public
/// operation checks its inputs with this first.
pub(crate) fn require(value: &str, name: &'static str) -> Result<(), StoreError> {
    if value.is_empty() {
        return Err(StoreError::Validation(format!(
            "{name} must not be empty"
        )));
    }
    Ok(())
}
