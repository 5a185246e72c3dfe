//! Presence verification against Postgres.
//!
//! Table and column names come from rule parameters, so they are checked with
//! [`is_safe_identifier`] before being spliced into SQL. Every value is bound.
//!
//! The checked column is compared without wrapping it in a cast whenever its
//! type is known to be text-like or integer, so an index on it applies. The
//! bind is cast to the column's type instead. Other column types fall back to
//! comparing `column::text`.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use sqlx::PgPool;
use verity_core::presence::{
    effective_exclude_id, is_safe_identifier, ExtraCondition, ExtraFilters, PresenceVerifier,
    DEFAULT_ID_COLUMN,
};
use verity_core::StoreError;

/// Declared type of `column` in `table`, without modifiers (so `varchar(255)`
/// reads as `character varying` and casting the bind never truncates it).
const COLUMN_TYPE_QUERY: &str = "\
    SELECT format_type(a.atttypid, NULL) \
    FROM pg_attribute a \
    WHERE a.attrelid = to_regclass($1) AND a.attname = $2 \
      AND a.attnum > 0 AND NOT a.attisdropped";

// ---------------------------------------------------------------------------
// Query building
// ---------------------------------------------------------------------------

/// How the checked column is compared against text binds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ColumnKind {
    /// Text-like column; binds are cast to its type.
    Text(String),
    /// Integer column; binds are cast to `bigint`.
    Integer,
    /// Unknown or other type; the column is compared as text.
    Other,
}

impl ColumnKind {
    pub(crate) fn from_type_name(name: &str) -> Self {
        match name {
            "text" | "character varying" | "citext" => Self::Text(name.to_string()),
            "smallint" | "integer" | "bigint" => Self::Integer,
            _ => Self::Other,
        }
    }

    fn column_expr(&self, column: &str) -> String {
        match self {
            Self::Other => format!("{column}::text"),
            _ => column.to_string(),
        }
    }

    fn placeholder(&self, index: usize) -> String {
        match self {
            Self::Text(type_name) => format!("${index}::{type_name}"),
            Self::Integer => format!("${index}::bigint"),
            Self::Other => format!("${index}"),
        }
    }

    /// Whether `value` can equal any row's column. Only canonical integers
    /// can match an integer column; anything else would fail the cast.
    pub(crate) fn admits(&self, value: &str) -> bool {
        match self {
            Self::Integer => value
                .parse::<i64>()
                .is_ok_and(|n| n.to_string() == value),
            _ => true,
        }
    }
}

/// A count query and the values to bind, in `$n` order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CountQuery {
    pub sql: String,
    pub binds: Vec<String>,
}

fn checked_identifier(name: &str) -> Result<&str, StoreError> {
    if is_safe_identifier(name) {
        Ok(name)
    } else {
        Err(StoreError::msg(format!("unsafe identifier `{name}`")))
    }
}

/// Append the extra filter conditions, advancing `binds`.
fn push_extra_filters(
    sql: &mut String,
    binds: &mut Vec<String>,
    extra: &ExtraFilters,
) -> Result<(), StoreError> {
    for (key, value) in extra {
        let key = checked_identifier(key)?;
        match ExtraCondition::parse(value) {
            ExtraCondition::IsNull => sql.push_str(&format!(" AND {key} IS NULL")),
            ExtraCondition::IsNotNull => sql.push_str(&format!(" AND {key} IS NOT NULL")),
            ExtraCondition::NotEqual(other) => {
                binds.push(other.to_string());
                sql.push_str(&format!(" AND {key}::text <> ${}", binds.len()));
            }
        }
    }
    Ok(())
}

pub(crate) fn build_count_query(
    collection: &str,
    column: &str,
    kind: &ColumnKind,
    value: &str,
    exclude_id: Option<&str>,
    id_column: Option<&str>,
    extra: &ExtraFilters,
) -> Result<CountQuery, StoreError> {
    let collection = checked_identifier(collection)?;
    let column = checked_identifier(column)?;

    let mut binds = vec![value.to_string()];
    let mut sql = format!(
        "SELECT COUNT(*)::BIGINT FROM {collection} WHERE {} = {}",
        kind.column_expr(column),
        kind.placeholder(1)
    );

    if let Some(id) = effective_exclude_id(exclude_id) {
        let id_column = checked_identifier(id_column.unwrap_or(DEFAULT_ID_COLUMN))?;
        binds.push(id.to_string());
        sql.push_str(&format!(" AND {id_column}::text <> ${}", binds.len()));
    }

    push_extra_filters(&mut sql, &mut binds, extra)?;
    Ok(CountQuery { sql, binds })
}

pub(crate) fn build_multi_count_query(
    collection: &str,
    column: &str,
    kind: &ColumnKind,
    values: &[String],
    extra: &ExtraFilters,
) -> Result<CountQuery, StoreError> {
    let collection = checked_identifier(collection)?;
    let column = checked_identifier(column)?;

    let placeholders = (1..=values.len())
        .map(|i| kind.placeholder(i))
        .collect::<Vec<_>>()
        .join(", ");
    let mut binds = values.to_vec();
    let mut sql = format!(
        "SELECT COUNT(*)::BIGINT FROM {collection} WHERE {} IN ({placeholders})",
        kind.column_expr(column)
    );

    push_extra_filters(&mut sql, &mut binds, extra)?;
    Ok(CountQuery { sql, binds })
}

// ---------------------------------------------------------------------------
// DatabasePresenceVerifier
// ---------------------------------------------------------------------------

/// Counts matching rows in Postgres tables.
pub struct DatabasePresenceVerifier {
    pool: RwLock<PgPool>,
    column_kinds: RwLock<HashMap<(String, String), ColumnKind>>,
}

impl DatabasePresenceVerifier {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: RwLock::new(pool),
            column_kinds: RwLock::new(HashMap::new()),
        }
    }

    /// Switch to another pool. Queries already in flight keep the old one.
    pub fn set_connection(&self, pool: PgPool) {
        *self.pool.write().unwrap_or_else(PoisonError::into_inner) = pool;
        self.column_kinds
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn pool(&self) -> PgPool {
        self.pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Look up (and cache) how `column` of `collection` should be compared.
    /// A table or column the catalog does not know is compared as text and
    /// not cached.
    pub(crate) async fn column_kind(
        &self,
        collection: &str,
        column: &str,
    ) -> Result<ColumnKind, StoreError> {
        let key = (collection.to_string(), column.to_string());
        let cached = self
            .column_kinds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned();
        if let Some(kind) = cached {
            return Ok(kind);
        }

        let pool = self.pool();
        let type_name = sqlx::query_scalar::<_, String>(COLUMN_TYPE_QUERY)
            .bind(collection)
            // Unquoted identifiers fold to lower case.
            .bind(column.to_lowercase())
            .fetch_optional(&pool)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, collection, column, "Column type lookup failed");
                StoreError::new(e)
            })?;

        let Some(type_name) = type_name else {
            return Ok(ColumnKind::Other);
        };
        let kind = ColumnKind::from_type_name(&type_name);
        tracing::debug!(collection, column, %type_name, ?kind, "Resolved column type");

        self.column_kinds
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, kind.clone());
        Ok(kind)
    }

    async fn run(&self, query: CountQuery) -> Result<i64, StoreError> {
        tracing::debug!(sql = %query.sql, binds = query.binds.len(), "Running presence count");

        let mut q = sqlx::query_scalar::<_, i64>(&query.sql);
        for bind in &query.binds {
            q = q.bind(bind);
        }

        let pool = self.pool();
        let count = q.fetch_optional(&pool).await.map_err(|e| {
            tracing::warn!(error = %e, sql = %query.sql, "Presence count failed");
            StoreError::new(e)
        })?;

        Ok(count.unwrap_or(0))
    }
}

impl std::fmt::Debug for DatabasePresenceVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabasePresenceVerifier").finish_non_exhaustive()
    }
}

#[async_trait]
impl PresenceVerifier for DatabasePresenceVerifier {
    async fn get_count(
        &self,
        collection: &str,
        column: &str,
        value: &str,
        exclude_id: Option<&str>,
        id_column: Option<&str>,
        extra: &ExtraFilters,
    ) -> Result<i64, StoreError> {
        checked_identifier(collection)?;
        checked_identifier(column)?;

        let kind = self.column_kind(collection, column).await?;
        if !kind.admits(value) {
            return Ok(0);
        }
        let query =
            build_count_query(collection, column, &kind, value, exclude_id, id_column, extra)?;
        self.run(query).await
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
        checked_identifier(collection)?;
        checked_identifier(column)?;

        let kind = self.column_kind(collection, column).await?;
        let values: Vec<String> = values.iter().filter(|v| kind.admits(v)).cloned().collect();
        if values.is_empty() {
            return Ok(0);
        }
        let query = build_multi_count_query(collection, column, &kind, &values, extra)?;
        self.run(query).await
    }
}
