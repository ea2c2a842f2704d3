//! Auxiliary lookup against a secondary table

use super::{decode_value, validate_identifier};
use crate::error::{PipelineError, Result};
use crate::record::Value;
use crate::transform::Lookup;
use sqlx::AnyPool;
use std::collections::HashMap;

/// Keys per `IN (...)` query; stays well under SQLite's bound-parameter limit
const MAX_KEYS_PER_QUERY: usize = 500;

/// Single-column lookup keyed by an exact-match identifier
///
/// Runs `SELECT <value_column> FROM <table> WHERE <key_column> = $1`. Zero or
/// one row is expected; if the table holds duplicates the first row wins.
/// Keys are bound as text.
#[derive(Clone, Debug)]
pub struct SqlLookup {
    pool: AnyPool,
    table: String,
    key_column: String,
    value_column: String,
    single_sql: String,
}

impl SqlLookup {
    /// # Errors
    /// Returns a `TransformError` if any of the names is not a plain identifier
    pub fn new(
        pool: AnyPool,
        table: impl Into<String>,
        key_column: impl Into<String>,
        value_column: impl Into<String>,
    ) -> Result<Self> {
        let table = table.into();
        let key_column = key_column.into();
        let value_column = value_column.into();
        for name in [&table, &key_column, &value_column] {
            validate_identifier(name).map_err(PipelineError::transform)?;
        }

        let single_sql = format!(
            "SELECT {} FROM {} WHERE {} = $1 LIMIT 1",
            value_column, table, key_column
        );
        Ok(Self {
            pool,
            table,
            key_column,
            value_column,
            single_sql,
        })
    }

    fn batch_sql(&self, keys: usize) -> String {
        let placeholders = (1..=keys)
            .map(|i| format!("${}", i))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "SELECT {key}, {value} FROM {table} WHERE {key} IN ({placeholders})",
            key = self.key_column,
            value = self.value_column,
            table = self.table,
        )
    }

    fn lookup_error(&self, err: impl std::fmt::Display) -> PipelineError {
        PipelineError::transform(format!("lookup in {} failed: {}", self.table, err))
    }
}

impl Lookup for SqlLookup {
    async fn lookup(&self, key: &str) -> Result<Option<Value>> {
        let row = sqlx::query(self.single_sql.as_str())
            .bind(key.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| self.lookup_error(e))?;

        row.map(|row| decode_value(&row, 0))
            .transpose()
            .map_err(|e| self.lookup_error(e))
    }

    async fn lookup_many(&self, keys: &[String]) -> Result<HashMap<String, Value>> {
        let mut found = HashMap::new();

        for chunk in keys.chunks(MAX_KEYS_PER_QUERY) {
            let sql = self.batch_sql(chunk.len());
            let mut query = sqlx::query(sql.as_str());
            for key in chunk {
                query = query.bind(key.clone());
            }

            let rows = query
                .fetch_all(&self.pool)
                .await
                .map_err(|e| self.lookup_error(e))?;

            for row in rows {
                let key = decode_value(&row, 0).map_err(|e| self.lookup_error(e))?;
                let value = decode_value(&row, 1).map_err(|e| self.lookup_error(e))?;
                if let Some(key) = key.as_key() {
                    found.entry(key).or_insert(value);
                }
            }
        }

        log::debug!(
            "Looked up {} keys in {}, {} matched",
            keys.len(),
            self.table,
            found.len()
        );
        Ok(found)
    }
}
