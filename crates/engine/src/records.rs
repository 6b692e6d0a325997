//! The three persisted record kinds and their attribute marshaling.
//!
//! Records travel to the store as attribute maps: numbers as `N`,
//! timestamps as RFC-3339 `S` attributes. Optional fields round-trip as
//! absent attributes, never as empty sentinels.

use chrono::{DateTime, Utc};
use common::{EventId, ReservationId, SeatId};
use kv_store::{Item, Value};

use crate::error::{EngineError, Result};

pub(crate) const ATTR_EVENT_ID: &str = "event_id";
pub(crate) const ATTR_REMAINING: &str = "remaining";
pub(crate) const ATTR_VERSION: &str = "version";
pub(crate) const ATTR_TOTAL_SEATS: &str = "total_seats";
pub(crate) const ATTR_UPDATED_AT: &str = "updated_at";
pub(crate) const ATTR_SEAT_ID: &str = "seat_id";
pub(crate) const ATTR_STATUS: &str = "status";
pub(crate) const ATTR_RESERVATION_ID: &str = "reservation_id";
pub(crate) const ATTR_KEY: &str = "key";
pub(crate) const ATTR_OPERATION: &str = "operation";
pub(crate) const ATTR_CREATED_AT: &str = "created_at";
pub(crate) const ATTR_EXPIRES_AT: &str = "expires_at";

fn require_s(item: &Item, attr: &str) -> Result<String> {
    item.get(attr)
        .and_then(Value::as_s)
        .map(str::to_string)
        .ok_or_else(|| EngineError::Corrupt(format!("missing or non-string attribute {attr}")))
}

fn require_i32(item: &Item, attr: &str) -> Result<i32> {
    let n = item
        .get(attr)
        .and_then(Value::as_n)
        .ok_or_else(|| EngineError::Corrupt(format!("missing or non-numeric attribute {attr}")))?;
    i32::try_from(n).map_err(|_| EngineError::Corrupt(format!("attribute {attr} out of i32 range")))
}

fn require_time(item: &Item, attr: &str) -> Result<DateTime<Utc>> {
    let raw = require_s(item, attr)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| EngineError::Corrupt(format!("attribute {attr} is not RFC-3339: {e}")))
}

pub(crate) fn rfc3339(t: DateTime<Utc>) -> Value {
    Value::s(t.to_rfc3339())
}

/// Quantity-mode inventory counter for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryRecord {
    pub event_id: EventId,
    /// Units currently sellable, not counting holds.
    pub remaining: i32,
    /// Optimistic-lock counter; only ever increases.
    pub version: i32,
    /// Immutable capacity, kept for audit.
    pub total_seats: i32,
    pub updated_at: DateTime<Utc>,
}

impl InventoryRecord {
    pub fn to_item(&self) -> Item {
        let mut item = Item::new();
        item.insert(ATTR_EVENT_ID.into(), Value::s(self.event_id.as_str()));
        item.insert(ATTR_REMAINING.into(), Value::n(i64::from(self.remaining)));
        item.insert(ATTR_VERSION.into(), Value::n(i64::from(self.version)));
        item.insert(ATTR_TOTAL_SEATS.into(), Value::n(i64::from(self.total_seats)));
        item.insert(ATTR_UPDATED_AT.into(), rfc3339(self.updated_at));
        item
    }

    pub fn from_item(item: &Item) -> Result<Self> {
        Ok(Self {
            event_id: EventId::new(require_s(item, ATTR_EVENT_ID)?),
            remaining: require_i32(item, ATTR_REMAINING)?,
            version: require_i32(item, ATTR_VERSION)?,
            total_seats: require_i32(item, ATTR_TOTAL_SEATS)?,
            updated_at: require_time(item, ATTR_UPDATED_AT)?,
        })
    }
}

/// Lifecycle state of a single seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeatStatus {
    Available,
    Hold,
    Sold,
}

impl SeatStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Available => "AVAILABLE",
            Self::Hold => "HOLD",
            Self::Sold => "SOLD",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "AVAILABLE" => Ok(Self::Available),
            "HOLD" => Ok(Self::Hold),
            "SOLD" => Ok(Self::Sold),
            other => Err(EngineError::Corrupt(format!("unknown seat status {other}"))),
        }
    }
}

impl std::fmt::Display for SeatStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One seat row, keyed by `(event_id, seat_id)`.
///
/// `reservation_id` is present iff the seat is `HOLD` or `SOLD`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatRecord {
    pub event_id: EventId,
    pub seat_id: SeatId,
    pub status: SeatStatus,
    pub reservation_id: Option<ReservationId>,
    pub updated_at: DateTime<Utc>,
}

impl SeatRecord {
    pub fn to_item(&self) -> Item {
        let mut item = Item::new();
        item.insert(ATTR_EVENT_ID.into(), Value::s(self.event_id.as_str()));
        item.insert(ATTR_SEAT_ID.into(), Value::s(self.seat_id.as_str()));
        item.insert(ATTR_STATUS.into(), Value::s(self.status.as_str()));
        if let Some(reservation_id) = &self.reservation_id {
            item.insert(
                ATTR_RESERVATION_ID.into(),
                Value::s(reservation_id.as_str()),
            );
        }
        item.insert(ATTR_UPDATED_AT.into(), rfc3339(self.updated_at));
        item
    }

    pub fn from_item(item: &Item) -> Result<Self> {
        let reservation_id = match item.get(ATTR_RESERVATION_ID) {
            Some(value) => Some(ReservationId::new(value.as_s().ok_or_else(|| {
                EngineError::Corrupt(format!("non-string attribute {ATTR_RESERVATION_ID}"))
            })?)),
            None => None,
        };
        Ok(Self {
            event_id: EventId::new(require_s(item, ATTR_EVENT_ID)?),
            seat_id: SeatId::new(require_s(item, ATTR_SEAT_ID)?),
            status: SeatStatus::parse(&require_s(item, ATTR_STATUS)?)?,
            reservation_id,
            updated_at: require_time(item, ATTR_UPDATED_AT)?,
        })
    }
}

/// Replay-safety receipt for one `(operation, reservation_id)` pair.
///
/// For commits `operation` carries the issued order ID; for releases the
/// literal `RELEASED`. `expires_at` is persisted as epoch seconds so a
/// TTL-capable store can expire rows server-side; readers also filter so
/// an expired record is indistinguishable from an absent one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyRecord {
    pub key: String,
    pub operation: String,
    pub event_id: EventId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn to_item(&self) -> Item {
        let mut item = Item::new();
        item.insert(ATTR_KEY.into(), Value::s(&self.key));
        item.insert(ATTR_OPERATION.into(), Value::s(&self.operation));
        item.insert(ATTR_EVENT_ID.into(), Value::s(self.event_id.as_str()));
        item.insert(ATTR_CREATED_AT.into(), rfc3339(self.created_at));
        item.insert(ATTR_EXPIRES_AT.into(), Value::n(self.expires_at.timestamp()));
        item
    }

    pub fn from_item(item: &Item) -> Result<Self> {
        let expires_epoch = item
            .get(ATTR_EXPIRES_AT)
            .and_then(Value::as_n)
            .ok_or_else(|| {
                EngineError::Corrupt(format!("missing or non-numeric attribute {ATTR_EXPIRES_AT}"))
            })?;
        let expires_at = DateTime::<Utc>::from_timestamp(expires_epoch, 0).ok_or_else(|| {
            EngineError::Corrupt(format!("attribute {ATTR_EXPIRES_AT} out of range"))
        })?;
        Ok(Self {
            key: require_s(item, ATTR_KEY)?,
            operation: require_s(item, ATTR_OPERATION)?,
            event_id: EventId::new(require_s(item, ATTR_EVENT_ID)?),
            created_at: require_time(item, ATTR_CREATED_AT)?,
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn inventory_marshals_both_ways() {
        let record = InventoryRecord {
            event_id: EventId::new("evt_1"),
            remaining: 10,
            version: 0,
            total_seats: 10,
            updated_at: ts(),
        };
        let item = record.to_item();
        assert_eq!(item.get(ATTR_REMAINING), Some(&Value::n(10)));
        assert_eq!(InventoryRecord::from_item(&item).unwrap(), record);
    }

    #[test]
    fn inventory_missing_attribute_is_corrupt() {
        let mut item = InventoryRecord {
            event_id: EventId::new("evt_1"),
            remaining: 10,
            version: 0,
            total_seats: 10,
            updated_at: ts(),
        }
        .to_item();
        item.remove(ATTR_VERSION);

        let err = InventoryRecord::from_item(&item).unwrap_err();
        assert!(matches!(err, EngineError::Corrupt(_)));
    }

    #[test]
    fn available_seat_has_no_reservation_attribute() {
        let record = SeatRecord {
            event_id: EventId::new("evt_1"),
            seat_id: SeatId::new("A-12"),
            status: SeatStatus::Available,
            reservation_id: None,
            updated_at: ts(),
        };
        let item = record.to_item();
        assert!(!item.contains_key(ATTR_RESERVATION_ID));
        assert_eq!(SeatRecord::from_item(&item).unwrap(), record);
    }

    #[test]
    fn sold_seat_carries_its_reservation() {
        let record = SeatRecord {
            event_id: EventId::new("evt_1"),
            seat_id: SeatId::new("A-12"),
            status: SeatStatus::Sold,
            reservation_id: Some(ReservationId::new("rsv_c")),
            updated_at: ts(),
        };
        let back = SeatRecord::from_item(&record.to_item()).unwrap();
        assert_eq!(back.reservation_id, Some(ReservationId::new("rsv_c")));
        assert_eq!(back.status, SeatStatus::Sold);
    }

    #[test]
    fn unknown_status_is_corrupt() {
        assert!(SeatStatus::parse("PENDING").is_err());
        assert_eq!(SeatStatus::parse("HOLD").unwrap(), SeatStatus::Hold);
    }

    #[test]
    fn idempotency_expiry_is_epoch_seconds() {
        let record = IdempotencyRecord {
            key: "commit:rsv_a".into(),
            operation: "ord_abc123def456".into(),
            event_id: EventId::new("evt_1"),
            created_at: ts(),
            expires_at: ts() + chrono::Duration::seconds(300),
        };
        let item = record.to_item();
        assert_eq!(
            item.get(ATTR_EXPIRES_AT),
            Some(&Value::n(record.expires_at.timestamp()))
        );

        let back = IdempotencyRecord::from_item(&item).unwrap();
        assert!(!back.is_expired(ts()));
        assert!(back.is_expired(ts() + chrono::Duration::seconds(300)));
        assert!(back.is_expired(ts() + chrono::Duration::seconds(301)));
    }
}
