use async_trait::async_trait;

use crate::{Condition, Item, Key, Result, Update};

/// A single conditional put inside a transactional write.
#[derive(Debug, Clone)]
pub struct TransactPut {
    /// Target table.
    pub table: String,
    /// Full row to write; must embed its own key attributes.
    pub item: Item,
    /// Predicate over the current row; `None` writes unconditionally.
    pub condition: Option<Condition>,
}

/// Core trait for store implementations.
///
/// All implementations must be thread-safe (Send + Sync) and must surface
/// predicate failures as [`crate::StoreError::ConditionFailed`].
///
/// Contract relied on by the reservation engine:
/// - single-item conditional writes are linearizable,
/// - `transact_write` is atomic across its items within one call,
/// - `batch_get` is eventually consistent and safe to reissue.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads a single row; `None` when the key is absent.
    async fn get_item(&self, table: &str, key: &Key) -> Result<Option<Item>>;

    /// Writes a full row (the item carries its own key attributes),
    /// optionally guarded by a predicate over the current row.
    async fn put_item(&self, table: &str, item: Item, condition: Option<Condition>)
    -> Result<()>;

    /// Applies an update expression to a row under an optional predicate.
    ///
    /// Absent rows are created from the key plus the applied actions when
    /// the predicate admits absence.
    async fn update_item(
        &self,
        table: &str,
        key: &Key,
        update: Update,
        condition: Option<Condition>,
    ) -> Result<()>;

    /// Reads up to `keys.len()` rows. Absent keys are simply missing from
    /// the result; ordering is not guaranteed.
    async fn batch_get(&self, table: &str, keys: &[Key]) -> Result<Vec<Item>>;

    /// Writes all puts atomically. A failed predicate on any item aborts
    /// the whole batch with `ConditionFailed` and no row changes.
    async fn transact_write(&self, puts: Vec<TransactPut>) -> Result<()>;
}
