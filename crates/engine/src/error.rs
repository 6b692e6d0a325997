//! Engine error taxonomy.

use common::{EventId, SeatId};
use kv_store::StoreError;
use thiserror::Error;

/// Errors that can occur during reservation operations.
///
/// The facade maps each variant to a canonical RPC status; the variant
/// also tells the caller whether a retry can help.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Quantity-mode commit refused: not enough stock. Terminal.
    #[error(
        "insufficient inventory for event {event_id}: requested {requested}, remaining {remaining}"
    )]
    InsufficientInventory {
        event_id: EventId,
        requested: i32,
        remaining: i32,
    },

    /// Seat-mode commit refused: at least one seat is taken. Terminal.
    #[error("seats unavailable for event {event_id}: {seat_ids:?}")]
    SeatsUnavailable {
        event_id: EventId,
        seat_ids: Vec<SeatId>,
    },

    /// Lost an optimistic-concurrency race while stock was still
    /// sufficient. Retryable with jitter.
    #[error("commit conflict for event {event_id}, stock still available")]
    Conflict { event_id: EventId },

    /// No inventory record exists for the event.
    #[error("inventory not found for event {0}")]
    InventoryNotFound(EventId),

    /// The request itself is malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A persisted record failed to unmarshal.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// Store-level failure other than a predicate rejection.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
