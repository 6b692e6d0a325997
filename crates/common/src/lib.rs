//! Shared identifier types for the inventory reservation system.

pub mod types;

pub use types::{EventId, OrderId, ReservationId, SeatId};
