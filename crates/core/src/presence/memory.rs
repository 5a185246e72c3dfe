//! In-process presence store.
//!
//! Comparison follows SQL semantics so results match the database verifier:
//! values compare as text, and a NULL or missing column never satisfies an
//! equality or inequality test.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use super::{
    effective_exclude_id, ExtraCondition, ExtraFilters, PresenceVerifier, DEFAULT_ID_COLUMN,
};
use crate::error::StoreError;
use crate::types::{scalar_to_string, Record};

/// Shared handle to collections of records. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    collections: Arc<RwLock<HashMap<String, Vec<Record>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure a collection exists, even if it holds no records.
    pub fn create_collection(&self, collection: &str) {
        self.collections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(collection.to_string())
            .or_default();
    }

    /// Append a record, creating the collection on first use.
    pub fn insert(&self, collection: &str, record: Record) {
        self.collections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(collection.to_string())
            .or_default()
            .push(record);
    }

    /// Remove every record from a collection.
    pub fn clear(&self, collection: &str) {
        if let Some(rows) = self
            .collections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(collection)
        {
            rows.clear();
        }
    }

    fn count_where<F>(&self, collection: &str, predicate: F) -> Result<i64, StoreError>
    where
        F: Fn(&Record) -> bool,
    {
        let guard = self
            .collections
            .read()
            .map_err(|_| StoreError::msg("memory store lock poisoned"))?;
        let rows = guard
            .get(collection)
            .ok_or_else(|| StoreError::msg(format!("collection `{collection}` does not exist")))?;
        Ok(rows.iter().filter(|row| predicate(row)).count() as i64)
    }
}

/// [`PresenceVerifier`] over a [`MemoryStore`].
#[derive(Debug, Default)]
pub struct InMemoryPresenceVerifier {
    store: RwLock<MemoryStore>,
}

impl InMemoryPresenceVerifier {
    pub fn new(store: MemoryStore) -> Self {
        Self {
            store: RwLock::new(store),
        }
    }

    /// Point subsequent queries at a different store.
    pub fn set_connection(&self, store: MemoryStore) {
        *self.store.write().unwrap_or_else(PoisonError::into_inner) = store;
    }

    fn store(&self) -> MemoryStore {
        self.store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn column_text(row: &Record, column: &str) -> Option<String> {
    row.get(column).and_then(scalar_to_string)
}

fn passes_extra(row: &Record, extra: &ExtraFilters) -> bool {
    extra.iter().all(|(key, value)| match ExtraCondition::parse(value) {
        ExtraCondition::IsNull => matches!(row.get(key), None | Some(Value::Null)),
        ExtraCondition::IsNotNull => !matches!(row.get(key), None | Some(Value::Null)),
        ExtraCondition::NotEqual(v) => column_text(row, key).is_some_and(|c| c != v),
    })
}

#[async_trait]
impl PresenceVerifier for InMemoryPresenceVerifier {
    async fn get_count(
        &self,
        collection: &str,
        column: &str,
        value: &str,
        exclude_id: Option<&str>,
        id_column: Option<&str>,
        extra: &ExtraFilters,
    ) -> Result<i64, StoreError> {
        let exclude = effective_exclude_id(exclude_id);
        let id_column = id_column.unwrap_or(DEFAULT_ID_COLUMN);

        self.store().count_where(collection, |row| {
            column_text(row, column).as_deref() == Some(value)
                && exclude.map_or(true, |id| {
                    column_text(row, id_column).is_some_and(|row_id| row_id != id)
                })
                && passes_extra(row, extra)
        })
    }

    async fn get_multi_count(
        &self,
        collection: &str,
        column: &str,
        values: &[String],
        extra: &ExtraFilters,
    ) -> Result<i64, StoreError> {
        if values.is_empty() {
            return Ok(0);
        }

        self.store().count_where(collection, |row| {
            column_text(row, column).is_some_and(|c| values.contains(&c))
                && passes_extra(row, extra)
        })
    }
}
