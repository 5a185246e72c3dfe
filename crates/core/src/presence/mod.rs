//! Presence verification: counting matching records in an external store.
//!
//! The validator only sees the [`PresenceVerifier`] trait, so `unique` and
//! `exists` rules work against any store. `verity-db` provides the Postgres
//! implementation; [`InMemoryPresenceVerifier`] serves tests and embedders.

mod memory;

pub use memory::{InMemoryPresenceVerifier, MemoryStore};

use async_trait::async_trait;

use crate::error::StoreError;

/// Extra filter value meaning "column IS NULL".
pub const NULL_SENTINEL: &str = "NULL";

/// Extra filter value meaning "column IS NOT NULL".
pub const NOT_NULL_SENTINEL: &str = "NOT_NULL";

/// Id column used for exclusion when none is given.
pub const DEFAULT_ID_COLUMN: &str = "id";

/// Ordered `(column, value)` filters. Each narrows the count.
pub type ExtraFilters = [(String, String)];

/// Counts records for `unique` and `exists` rules.
///
/// Switching the underlying store handle is not part of the trait: each
/// implementation exposes its own `set_connection` taking its concrete handle
/// (a `PgPool`, a [`MemoryStore`]), which keeps the trait usable as
/// `dyn PresenceVerifier`.
#[async_trait]
pub trait PresenceVerifier: Send + Sync {
    /// Count records in `collection` whose `column` equals `value`.
    ///
    /// When `exclude_id` is set (and not `"NULL"`), rows whose `id_column`
    /// (default `id`) equals it are left out. Each `extra` pair is applied as
    /// an [`ExtraCondition`].
    async fn get_count(
        &self,
        collection: &str,
        column: &str,
        value: &str,
        exclude_id: Option<&str>,
        id_column: Option<&str>,
        extra: &ExtraFilters,
    ) -> Result<i64, StoreError>;

    /// Count records in `collection` whose `column` is one of `values`.
    async fn get_multi_count(
        &self,
        collection: &str,
        column: &str,
        values: &[String],
        extra: &ExtraFilters,
    ) -> Result<i64, StoreError>;
}

/// How an extra filter value constrains its column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtraCondition<'a> {
    IsNull,
    IsNotNull,
    NotEqual(&'a str),
}

impl<'a> ExtraCondition<'a> {
    /// Interpret the `"NULL"` / `"NOT_NULL"` sentinels; anything else
    /// excludes rows equal to the value.
    pub fn parse(value: &'a str) -> Self {
        match value {
            NULL_SENTINEL => Self::IsNull,
            NOT_NULL_SENTINEL => Self::IsNotNull,
            other => Self::NotEqual(other),
        }
    }
}

/// The id to exclude, if exclusion applies at all.
pub fn effective_exclude_id(exclude_id: Option<&str>) -> Option<&str> {
    exclude_id.filter(|id| *id != NULL_SENTINEL)
}

/// Whether `name` is safe to splice into a query as a table or column name:
/// an identifier, optionally schema-qualified.
pub fn is_safe_identifier(name: &str) -> bool {
    let mut parts = 0;
    for part in name.split('.') {
        parts += 1;
        let mut chars = part.chars();
        let valid_start = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return false;
        }
    }
    parts <= 2
}
