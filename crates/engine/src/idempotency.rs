//! Replay guard for commit and release.
//!
//! Authoritative state is the idempotency table; the in-process cache in
//! front of it is a latency optimization only. Reads fall through to the
//! store on every miss and both sides treat expired records as absent, so
//! the cache never needs to be coherent across replicas.

use std::time::Duration;

use chrono::{DateTime, Utc};
use common::{EventId, ReservationId};
use kv_store::KeyValueStore;
use moka::future::Cache;

use crate::error::{EngineError, Result};
use crate::records::IdempotencyRecord;
use crate::repository::InventoryRepository;

/// Marker stored in the `operation` attribute of release receipts.
pub const RELEASED: &str = "RELEASED";

/// Operation discriminant in the idempotency key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Commit,
    Release,
}

impl Operation {
    fn prefix(self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Release => "release",
        }
    }
}

/// Outcome of recording a receipt.
#[derive(Debug)]
pub enum RecordOutcome {
    /// This caller's receipt is the one that stands.
    Recorded,
    /// A concurrent duplicate wrote its receipt first; here is theirs.
    Superseded(IdempotencyRecord),
}

/// Write-through idempotency layer: `(operation, reservation_id)` →
/// terminal result, with a time-to-live.
pub struct IdempotencyLayer<S> {
    repo: InventoryRepository<S>,
    cache: Cache<String, IdempotencyRecord>,
    ttl: chrono::Duration,
}

impl<S: KeyValueStore> IdempotencyLayer<S> {
    /// Creates the layer with the configured TTL and cache capacity.
    pub fn new(repo: InventoryRepository<S>, ttl: Duration, cache_size: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(cache_size)
            .time_to_live(ttl)
            .build();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(300));
        Self { repo, cache, ttl }
    }

    /// Storage key for an operation on a reservation.
    pub fn key(operation: Operation, reservation_id: &ReservationId) -> String {
        format!("{}:{}", operation.prefix(), reservation_id)
    }

    /// Looks up an unexpired receipt, cache first, store on miss.
    pub async fn find(
        &self,
        operation: Operation,
        reservation_id: &ReservationId,
        now: DateTime<Utc>,
    ) -> Result<Option<IdempotencyRecord>> {
        let key = Self::key(operation, reservation_id);

        if let Some(record) = self.cache.get(&key).await {
            if !record.is_expired(now) {
                return Ok(Some(record));
            }
            self.cache.invalidate(&key).await;
        }

        match self.repo.get_idempotency(&key).await? {
            Some(record) if !record.is_expired(now) => {
                self.cache.insert(key, record.clone()).await;
                Ok(Some(record))
            }
            _ => Ok(None),
        }
    }

    /// Builds a receipt stamped `now` with the configured TTL.
    pub fn receipt(
        &self,
        operation: Operation,
        reservation_id: &ReservationId,
        result: String,
        event_id: EventId,
        now: DateTime<Utc>,
    ) -> IdempotencyRecord {
        IdempotencyRecord {
            key: Self::key(operation, reservation_id),
            operation: result,
            event_id,
            created_at: now,
            expires_at: now + self.ttl,
        }
    }

    /// Writes a receipt guarded by `attribute_not_exists(key)` so exactly
    /// one concurrent duplicate wins. On losing the race, returns the
    /// winner's record.
    pub async fn record(
        &self,
        record: IdempotencyRecord,
        now: DateTime<Utc>,
    ) -> Result<RecordOutcome> {
        match self.repo.put_idempotency(&record, true).await {
            Ok(()) => {
                self.cache.insert(record.key.clone(), record).await;
                Ok(RecordOutcome::Recorded)
            }
            Err(EngineError::Store(e)) if e.is_condition_failed() => {
                match self.repo.get_idempotency(&record.key).await? {
                    Some(existing) if !existing.is_expired(now) => {
                        self.cache.insert(existing.key.clone(), existing.clone()).await;
                        Ok(RecordOutcome::Superseded(existing))
                    }
                    // An expired receipt no longer guards; replace it.
                    _ => {
                        self.repo.put_idempotency(&record, false).await?;
                        self.cache.insert(record.key.clone(), record).await;
                        Ok(RecordOutcome::Recorded)
                    }
                }
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{ATTR_EVENT_ID, ATTR_KEY, ATTR_SEAT_ID};
    use crate::repository::TableNames;
    use kv_store::InMemoryStore;

    async fn layer(ttl: Duration) -> IdempotencyLayer<InMemoryStore> {
        let store = InMemoryStore::new();
        let tables = TableNames::default();
        store.create_table(&tables.inventory, &[ATTR_EVENT_ID]).await;
        store
            .create_table(&tables.seats, &[ATTR_EVENT_ID, ATTR_SEAT_ID])
            .await;
        store.create_table(&tables.idempotency, &[ATTR_KEY]).await;
        IdempotencyLayer::new(InventoryRepository::new(store, tables), ttl, 100)
    }

    fn rid() -> ReservationId {
        ReservationId::new("rsv_a")
    }

    #[tokio::test]
    async fn find_misses_then_hits_after_record() {
        let layer = layer(Duration::from_secs(300)).await;
        let now = Utc::now();

        assert!(layer.find(Operation::Commit, &rid(), now).await.unwrap().is_none());

        let receipt = layer.receipt(
            Operation::Commit,
            &rid(),
            "ord_abcabcabcabc".into(),
            EventId::new("evt_1"),
            now,
        );
        assert!(matches!(
            layer.record(receipt, now).await.unwrap(),
            RecordOutcome::Recorded
        ));

        let found = layer
            .find(Operation::Commit, &rid(), now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.operation, "ord_abcabcabcabc");
    }

    #[tokio::test]
    async fn commit_and_release_keys_do_not_collide() {
        let layer = layer(Duration::from_secs(300)).await;
        let now = Utc::now();

        let receipt = layer.receipt(
            Operation::Commit,
            &rid(),
            "ord_abcabcabcabc".into(),
            EventId::new("evt_1"),
            now,
        );
        layer.record(receipt, now).await.unwrap();

        assert!(layer.find(Operation::Release, &rid(), now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_record_is_superseded_by_the_winner() {
        let layer = layer(Duration::from_secs(300)).await;
        let now = Utc::now();

        let winner = layer.receipt(
            Operation::Commit,
            &rid(),
            "ord_111111111111".into(),
            EventId::new("evt_1"),
            now,
        );
        layer.record(winner, now).await.unwrap();

        let loser = layer.receipt(
            Operation::Commit,
            &rid(),
            "ord_222222222222".into(),
            EventId::new("evt_1"),
            now,
        );
        match layer.record(loser, now).await.unwrap() {
            RecordOutcome::Superseded(existing) => {
                assert_eq!(existing.operation, "ord_111111111111");
            }
            RecordOutcome::Recorded => panic!("expected the winner's record to stand"),
        }
    }

    #[tokio::test]
    async fn expired_records_are_absent() {
        let layer = layer(Duration::from_secs(300)).await;
        let now = Utc::now();

        let receipt = layer.receipt(
            Operation::Commit,
            &rid(),
            "ord_abcabcabcabc".into(),
            EventId::new("evt_1"),
            now,
        );
        layer.record(receipt, now).await.unwrap();

        let later = now + chrono::Duration::seconds(301);
        assert!(layer.find(Operation::Commit, &rid(), later).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_record_is_replaced_not_superseding() {
        let layer = layer(Duration::from_secs(300)).await;
        let then = Utc::now() - chrono::Duration::seconds(600);

        let stale = layer.receipt(
            Operation::Commit,
            &rid(),
            "ord_111111111111".into(),
            EventId::new("evt_1"),
            then,
        );
        layer.record(stale, then).await.unwrap();

        let now = Utc::now();
        let fresh = layer.receipt(
            Operation::Commit,
            &rid(),
            "ord_222222222222".into(),
            EventId::new("evt_1"),
            now,
        );
        assert!(matches!(
            layer.record(fresh, now).await.unwrap(),
            RecordOutcome::Recorded
        ));

        let found = layer
            .find(Operation::Commit, &rid(), now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.operation, "ord_222222222222");
    }
}
