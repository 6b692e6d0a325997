//! Inventory reservation engine.
//!
//! Guarantees zero oversell of event inventory under concurrency by
//! pushing every serialization decision into the backing store's
//! conditional-write primitives: a version-guarded counter decrement in
//! quantity mode, per-seat status predicates inside one transaction in
//! seat mode. Client retries are made safe by a write-through idempotency
//! layer keyed on the caller's reservation ID.
//!
//! The engine holds no mutable in-process state, so calls may run on any
//! number of tasks (or replicas) in parallel.

pub mod error;
pub mod idempotency;
pub mod records;
pub mod repository;
pub mod reservation;

pub use error::{EngineError, Result};
pub use idempotency::{IdempotencyLayer, Operation, RELEASED, RecordOutcome};
pub use records::{IdempotencyRecord, InventoryRecord, SeatRecord, SeatStatus};
pub use repository::{InventoryRepository, TableNames};
pub use reservation::{
    Availability, CheckRequest, CommitReceipt, CommitRequest, Mode, ReleaseRequest,
    ReservationEngine,
};
