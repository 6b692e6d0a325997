//! Typed repository over the store port.
//!
//! The only place that encodes the conditional predicates the engine's
//! correctness depends on. Everything above works with records; everything
//! below works with attribute maps.

use chrono::{DateTime, Utc};
use common::{EventId, ReservationId, SeatId};
use kv_store::{Condition, Key, KeyValueStore, TransactPut, Update, Value, key};

use crate::error::{EngineError, Result};
use crate::records::{
    ATTR_EVENT_ID, ATTR_KEY, ATTR_REMAINING, ATTR_RESERVATION_ID, ATTR_SEAT_ID, ATTR_STATUS,
    ATTR_UPDATED_AT, ATTR_VERSION, IdempotencyRecord, InventoryRecord, SeatRecord, SeatStatus,
    rfc3339,
};

/// Table names the repository addresses, injected from configuration.
#[derive(Debug, Clone)]
pub struct TableNames {
    pub inventory: String,
    pub seats: String,
    pub idempotency: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            inventory: "inventory".to_string(),
            seats: "inventory_seats".to_string(),
            idempotency: "idempotency".to_string(),
        }
    }
}

/// Typed operations on the three record kinds.
///
/// Cloneable so the engine and the idempotency layer can share one store
/// client; the store itself pools connections and is thread-safe.
#[derive(Clone)]
pub struct InventoryRepository<S> {
    store: S,
    tables: TableNames,
}

impl<S: KeyValueStore> InventoryRepository<S> {
    pub fn new(store: S, tables: TableNames) -> Self {
        Self { store, tables }
    }

    /// Table names in effect, for provisioning.
    pub fn tables(&self) -> &TableNames {
        &self.tables
    }

    fn inventory_key(event_id: &EventId) -> Key {
        key([(ATTR_EVENT_ID, Value::s(event_id.as_str()))])
    }

    fn seat_key(event_id: &EventId, seat_id: &SeatId) -> Key {
        key([
            (ATTR_EVENT_ID, Value::s(event_id.as_str())),
            (ATTR_SEAT_ID, Value::s(seat_id.as_str())),
        ])
    }

    fn idempotency_key(record_key: &str) -> Key {
        key([(ATTR_KEY, Value::s(record_key))])
    }

    /// Reads the inventory counter; an absent row is `InventoryNotFound`,
    /// distinct from a readable row with `remaining = 0`.
    pub async fn get_inventory(&self, event_id: &EventId) -> Result<InventoryRecord> {
        let item = self
            .store
            .get_item(&self.tables.inventory, &Self::inventory_key(event_id))
            .await?
            .ok_or_else(|| EngineError::InventoryNotFound(event_id.clone()))?;
        InventoryRecord::from_item(&item)
    }

    /// Seeds or resets an inventory row. Inventory records are created
    /// out-of-band; the engine itself never calls this.
    pub async fn put_inventory(&self, record: &InventoryRecord) -> Result<()> {
        self.store
            .put_item(&self.tables.inventory, record.to_item(), None)
            .await?;
        Ok(())
    }

    /// Seeds or resets a seat row. Same out-of-band lifecycle as
    /// [`Self::put_inventory`].
    pub async fn put_seat(&self, record: &SeatRecord) -> Result<()> {
        self.store
            .put_item(&self.tables.seats, record.to_item(), None)
            .await?;
        Ok(())
    }

    /// The commit decrement: `remaining -= qty, version += 1` guarded by
    /// `remaining >= qty AND version = expected_version`.
    pub async fn commit_quantity(
        &self,
        event_id: &EventId,
        qty: i32,
        expected_version: i32,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let update = Update::new()
            .add(ATTR_REMAINING, -i64::from(qty))
            .add(ATTR_VERSION, 1)
            .set(ATTR_UPDATED_AT, rfc3339(now));
        let predicate = Condition::at_least(ATTR_REMAINING, Value::n(i64::from(qty)))
            .and(Condition::equals(ATTR_VERSION, Value::n(i64::from(expected_version))));
        self.store
            .update_item(
                &self.tables.inventory,
                &Self::inventory_key(event_id),
                update,
                Some(predicate),
            )
            .await?;
        Ok(())
    }

    /// Hands back a surplus decrement after a lost duplicate-commit race:
    /// `remaining += qty, version += 1` guarded by the version only.
    pub async fn restore_quantity(
        &self,
        event_id: &EventId,
        qty: i32,
        expected_version: i32,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let update = Update::new()
            .add(ATTR_REMAINING, i64::from(qty))
            .add(ATTR_VERSION, 1)
            .set(ATTR_UPDATED_AT, rfc3339(now));
        let predicate =
            Condition::equals(ATTR_VERSION, Value::n(i64::from(expected_version)));
        self.store
            .update_item(
                &self.tables.inventory,
                &Self::inventory_key(event_id),
                update,
                Some(predicate),
            )
            .await?;
        Ok(())
    }

    /// Unguarded counter adjustment used by release (`+qty`) and by the
    /// duplicate-release compensation (`-qty`). No version bump.
    pub async fn adjust_remaining(
        &self,
        event_id: &EventId,
        delta: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let update = Update::new()
            .add(ATTR_REMAINING, delta)
            .set(ATTR_UPDATED_AT, rfc3339(now));
        self.store
            .update_item(
                &self.tables.inventory,
                &Self::inventory_key(event_id),
                update,
                None,
            )
            .await?;
        Ok(())
    }

    /// Batch-reads the named seats. Absent rows are simply missing from
    /// the result; ordering is not guaranteed.
    pub async fn get_seats(
        &self,
        event_id: &EventId,
        seat_ids: &[SeatId],
    ) -> Result<Vec<SeatRecord>> {
        if seat_ids.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<Key> = seat_ids
            .iter()
            .map(|seat_id| Self::seat_key(event_id, seat_id))
            .collect();
        let items = self.store.batch_get(&self.tables.seats, &keys).await?;
        items.iter().map(SeatRecord::from_item).collect()
    }

    /// Transactionally moves every named seat to `SOLD` for this
    /// reservation. Each leg carries the predicate
    /// `attribute_not_exists(seat_id) OR status = AVAILABLE OR
    /// (status = HOLD AND reservation_id = :rid)`; one failed leg aborts
    /// the whole transaction.
    pub async fn sell_seats(
        &self,
        event_id: &EventId,
        seat_ids: &[SeatId],
        reservation_id: &ReservationId,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let predicate = Condition::not_exists(ATTR_SEAT_ID)
            .or(Condition::equals(
                ATTR_STATUS,
                Value::s(SeatStatus::Available.as_str()),
            ))
            .or(Condition::equals(ATTR_STATUS, Value::s(SeatStatus::Hold.as_str())).and(
                Condition::equals(ATTR_RESERVATION_ID, Value::s(reservation_id.as_str())),
            ));

        let puts = seat_ids
            .iter()
            .map(|seat_id| {
                let record = SeatRecord {
                    event_id: event_id.clone(),
                    seat_id: seat_id.clone(),
                    status: SeatStatus::Sold,
                    reservation_id: Some(reservation_id.clone()),
                    updated_at: now,
                };
                TransactPut {
                    table: self.tables.seats.clone(),
                    item: record.to_item(),
                    condition: Some(predicate.clone()),
                }
            })
            .collect();
        self.store.transact_write(puts).await?;
        Ok(())
    }

    /// Transactionally returns the named seats to `AVAILABLE` with the
    /// reservation attribute removed. Unguarded: the caller has already
    /// filtered to seats this reservation holds.
    pub async fn release_seats(
        &self,
        event_id: &EventId,
        seat_ids: &[SeatId],
        now: DateTime<Utc>,
    ) -> Result<()> {
        let puts = seat_ids
            .iter()
            .map(|seat_id| {
                let record = SeatRecord {
                    event_id: event_id.clone(),
                    seat_id: seat_id.clone(),
                    status: SeatStatus::Available,
                    reservation_id: None,
                    updated_at: now,
                };
                TransactPut {
                    table: self.tables.seats.clone(),
                    item: record.to_item(),
                    condition: None,
                }
            })
            .collect();
        self.store.transact_write(puts).await?;
        Ok(())
    }

    /// Reads an idempotency record by its full key string.
    pub async fn get_idempotency(&self, record_key: &str) -> Result<Option<IdempotencyRecord>> {
        let item = self
            .store
            .get_item(&self.tables.idempotency, &Self::idempotency_key(record_key))
            .await?;
        item.as_ref().map(IdempotencyRecord::from_item).transpose()
    }

    /// Writes an idempotency record. When `guarded`, the put carries
    /// `attribute_not_exists(key)` so exactly one concurrent writer wins.
    pub async fn put_idempotency(&self, record: &IdempotencyRecord, guarded: bool) -> Result<()> {
        let condition = guarded.then(|| Condition::not_exists(ATTR_KEY));
        self.store
            .put_item(&self.tables.idempotency, record.to_item(), condition)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kv_store::{InMemoryStore, StoreError};

    async fn repo() -> InventoryRepository<InMemoryStore> {
        let store = InMemoryStore::new();
        let tables = TableNames::default();
        store.create_table(&tables.inventory, &[ATTR_EVENT_ID]).await;
        store
            .create_table(&tables.seats, &[ATTR_EVENT_ID, ATTR_SEAT_ID])
            .await;
        store.create_table(&tables.idempotency, &[ATTR_KEY]).await;
        InventoryRepository::new(store, tables)
    }

    fn inventory(remaining: i32, version: i32) -> InventoryRecord {
        InventoryRecord {
            event_id: EventId::new("evt_1"),
            remaining,
            version,
            total_seats: 10,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn missing_inventory_is_not_found() {
        let repo = repo().await;
        let err = repo.get_inventory(&EventId::new("evt_x")).await.unwrap_err();
        assert!(matches!(err, EngineError::InventoryNotFound(_)));
    }

    #[tokio::test]
    async fn commit_quantity_decrements_and_bumps_version() {
        let repo = repo().await;
        repo.put_inventory(&inventory(10, 0)).await.unwrap();

        repo.commit_quantity(&EventId::new("evt_1"), 3, 0, Utc::now())
            .await
            .unwrap();

        let current = repo.get_inventory(&EventId::new("evt_1")).await.unwrap();
        assert_eq!(current.remaining, 7);
        assert_eq!(current.version, 1);
        assert_eq!(current.total_seats, 10);
    }

    #[tokio::test]
    async fn commit_quantity_rejects_stale_version() {
        let repo = repo().await;
        repo.put_inventory(&inventory(10, 5)).await.unwrap();

        let err = repo
            .commit_quantity(&EventId::new("evt_1"), 3, 4, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Store(StoreError::ConditionFailed { .. })
        ));

        let current = repo.get_inventory(&EventId::new("evt_1")).await.unwrap();
        assert_eq!(current.remaining, 10);
    }

    #[tokio::test]
    async fn commit_quantity_rejects_oversell() {
        let repo = repo().await;
        repo.put_inventory(&inventory(2, 5)).await.unwrap();

        let err = repo
            .commit_quantity(&EventId::new("evt_1"), 3, 5, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Store(StoreError::ConditionFailed { .. })
        ));
    }

    #[tokio::test]
    async fn sell_seats_honors_foreign_hold() {
        let repo = repo().await;
        let event_id = EventId::new("evt_1");
        repo.put_seat(&SeatRecord {
            event_id: event_id.clone(),
            seat_id: SeatId::new("A-12"),
            status: SeatStatus::Hold,
            reservation_id: Some(ReservationId::new("rsv_d")),
            updated_at: Utc::now(),
        })
        .await
        .unwrap();

        let err = repo
            .sell_seats(
                &event_id,
                &[SeatId::new("A-12")],
                &ReservationId::new("rsv_e"),
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Store(StoreError::ConditionFailed { .. })
        ));

        // The holder itself may convert its hold.
        repo.sell_seats(
            &event_id,
            &[SeatId::new("A-12")],
            &ReservationId::new("rsv_d"),
            Utc::now(),
        )
        .await
        .unwrap();

        let seats = repo
            .get_seats(&event_id, &[SeatId::new("A-12")])
            .await
            .unwrap();
        assert_eq!(seats[0].status, SeatStatus::Sold);
    }

    #[tokio::test]
    async fn guarded_idempotency_put_single_winner() {
        let repo = repo().await;
        let record = IdempotencyRecord {
            key: "commit:rsv_a".into(),
            operation: "ord_111111111111".into(),
            event_id: EventId::new("evt_1"),
            created_at: Utc::now(),
            expires_at: Utc::now() + chrono::Duration::seconds(300),
        };
        repo.put_idempotency(&record, true).await.unwrap();

        let mut rival = record.clone();
        rival.operation = "ord_222222222222".into();
        let err = repo.put_idempotency(&rival, true).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Store(StoreError::ConditionFailed { .. })
        ));

        let stored = repo.get_idempotency("commit:rsv_a").await.unwrap().unwrap();
        assert_eq!(stored.operation, "ord_111111111111");
    }
}
