use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    Condition, Item, Key, Result, StoreError, Update,
    store::{KeyValueStore, TransactPut},
};

#[derive(Debug, Default)]
struct Table {
    key_attrs: Vec<String>,
    rows: HashMap<Key, Item>,
}

impl Table {
    fn key_of(&self, item: &Item) -> Result<Key> {
        let mut key = Key::new();
        for attr in &self.key_attrs {
            let value = item.get(attr).ok_or_else(|| {
                StoreError::Backend(format!("item missing key attribute {attr}"))
            })?;
            key.insert(attr.clone(), value.clone());
        }
        Ok(key)
    }
}

/// In-memory store implementation.
///
/// Backs tests and single-process runs with the same interface as a
/// networked driver. A single write lock across all tables makes
/// conditional writes linearizable and `transact_write` atomic.
///
/// Tables must be declared with their key schema before use, the way a
/// real deployment provisions them out-of-band.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<HashMap<String, Table>>>,
}

impl InMemoryStore {
    /// Creates a store with no tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a table and its key schema. Re-declaring truncates.
    pub async fn create_table(&self, name: &str, key_attrs: &[&str]) {
        let mut tables = self.tables.write().await;
        tables.insert(
            name.to_string(),
            Table {
                key_attrs: key_attrs.iter().map(|a| a.to_string()).collect(),
                rows: HashMap::new(),
            },
        );
    }

    /// Returns the number of rows in a table (0 when undeclared).
    pub async fn item_count(&self, table: &str) -> usize {
        let tables = self.tables.read().await;
        tables.get(table).map_or(0, |t| t.rows.len())
    }

    /// Drops all rows from every table, keeping the schemas.
    pub async fn clear(&self) {
        let mut tables = self.tables.write().await;
        for table in tables.values_mut() {
            table.rows.clear();
        }
    }
}

fn unknown_table(name: &str) -> StoreError {
    StoreError::Backend(format!("table not found: {name}"))
}

fn check(condition: &Option<Condition>, current: Option<&Item>, table: &str) -> Result<()> {
    if let Some(condition) = condition
        && !condition.eval(current)
    {
        return Err(StoreError::ConditionFailed {
            table: table.to_string(),
        });
    }
    Ok(())
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get_item(&self, table: &str, key: &Key) -> Result<Option<Item>> {
        let tables = self.tables.read().await;
        let table = tables.get(table).ok_or_else(|| unknown_table(table))?;
        Ok(table.rows.get(key).cloned())
    }

    async fn put_item(
        &self,
        table: &str,
        item: Item,
        condition: Option<Condition>,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        let entry = tables.get_mut(table).ok_or_else(|| unknown_table(table))?;
        let key = entry.key_of(&item)?;
        check(&condition, entry.rows.get(&key), table)?;
        entry.rows.insert(key, item);
        Ok(())
    }

    async fn update_item(
        &self,
        table: &str,
        key: &Key,
        update: Update,
        condition: Option<Condition>,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        let entry = tables.get_mut(table).ok_or_else(|| unknown_table(table))?;
        let current = entry.rows.get(key);
        check(&condition, current, table)?;

        // Upsert: an absent row starts from its key attributes.
        let mut item = current.cloned().unwrap_or_else(|| {
            key.iter()
                .map(|(attr, value)| (attr.clone(), value.clone()))
                .collect()
        });
        update.apply(&mut item);
        entry.rows.insert(key.clone(), item);
        Ok(())
    }

    async fn batch_get(&self, table: &str, keys: &[Key]) -> Result<Vec<Item>> {
        let tables = self.tables.read().await;
        let table = tables.get(table).ok_or_else(|| unknown_table(table))?;
        Ok(keys
            .iter()
            .filter_map(|key| table.rows.get(key).cloned())
            .collect())
    }

    async fn transact_write(&self, puts: Vec<TransactPut>) -> Result<()> {
        let mut tables = self.tables.write().await;

        // Every predicate is checked against the pre-transaction state
        // before any row changes, so the batch is all-or-nothing.
        let mut staged = Vec::with_capacity(puts.len());
        for put in &puts {
            let entry = tables
                .get(put.table.as_str())
                .ok_or_else(|| unknown_table(&put.table))?;
            let key = entry.key_of(&put.item)?;
            check(&put.condition, entry.rows.get(&key), &put.table)?;
            staged.push(key);
        }

        for (put, key) in puts.into_iter().zip(staged) {
            let entry = tables
                .get_mut(put.table.as_str())
                .expect("table checked above");
            entry.rows.insert(key, put.item);
        }
        Ok(())
    }
}
