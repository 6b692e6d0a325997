use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a ticketed event, the unit of inventory.
///
/// Wraps the caller-supplied string to provide type safety and prevent
/// mixing up event IDs with other string-based identifiers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Creates an event ID from a caller-supplied string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the ID is empty (invalid in every request).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EventId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EventId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of a single seat within an event.
///
/// Seats are keyed by `(event_id, seat_id)`; this type carries only the
/// seat part of the composite key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeatId(String);

impl SeatId {
    /// Creates a seat ID from a caller-supplied string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the ID is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for SeatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SeatId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SeatId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Caller-scoped reservation intent, the unit of idempotency.
///
/// Two requests carrying the same reservation ID are retries of one
/// logical operation and must observe exactly one outcome.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationId(String);

impl ReservationId {
    /// Creates a reservation ID from a caller-supplied string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the ID is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for ReservationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ReservationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ReservationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of the order artifact issued by a successful commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    /// Mints a fresh order ID of the form `ord_{12 hex chars}`.
    pub fn mint() -> Self {
        let slug = Uuid::new_v4().simple().to_string();
        Self(format!("ord_{}", &slug[..12]))
    }

    /// Creates an order ID from an existing string (e.g. a stored receipt).
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_order_ids_have_expected_shape() {
        let id = OrderId::mint();
        assert!(id.as_str().starts_with("ord_"));
        assert_eq!(id.as_str().len(), "ord_".len() + 12);
        assert!(
            id.as_str()["ord_".len()..]
                .chars()
                .all(|c| c.is_ascii_hexdigit())
        );
    }

    #[test]
    fn minted_order_ids_are_unique() {
        let a = OrderId::mint();
        let b = OrderId::mint();
        assert_ne!(a, b);
    }

    #[test]
    fn event_id_serializes_transparently() {
        let id = EventId::new("evt_1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"evt_1\"");
        let back: EventId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn empty_ids_are_detected() {
        assert!(EventId::new("").is_empty());
        assert!(ReservationId::new("").is_empty());
        assert!(SeatId::new("").is_empty());
        assert!(!EventId::new("evt_1").is_empty());
    }

    #[test]
    fn seat_ids_order_lexicographically() {
        let mut seats = vec![SeatId::new("B-2"), SeatId::new("A-12")];
        seats.sort();
        assert_eq!(seats[0].as_str(), "A-12");
    }
}
