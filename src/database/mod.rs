//! Relational source and sink operations
//!
//! This module handles everything that talks SQL:
//! - Streaming rows out of a table or query ([`TableReader`])
//! - Single-column lookups against an auxiliary table ([`SqlLookup`])
//! - Persisting records back into a table ([`TableWriter`])

mod lookup;
mod reader;
mod sink;

pub use lookup::SqlLookup;
pub use reader::TableReader;
pub use sink::{CommitMode, TableWriter, TableSession, WriteMode};

use crate::record::Value;
use regex::Regex;
use sqlx::any::AnyRow;
use sqlx::{Row, TypeInfo, ValueRef};
use std::sync::LazyLock;

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").expect("valid regex")
});

/// Check that a table or column name can be spliced into SQL unquoted
pub fn validate_identifier(name: &str) -> Result<(), String> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(format!("'{}' is not a valid SQL identifier", name))
    }
}

/// Decode one column of a row into a tagged value
pub(crate) fn decode_value(row: &AnyRow, index: usize) -> Result<Value, sqlx::Error> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_ascii_uppercase();

    let value = match type_name.as_str() {
        "BOOLEAN" => Value::Bool(row.try_get(index)?),
        "SMALLINT" => Value::Integer(row.try_get::<i16, _>(index)?.into()),
        "INTEGER" => Value::Integer(row.try_get::<i32, _>(index)?.into()),
        "BIGINT" => Value::Integer(row.try_get(index)?),
        "REAL" => Value::Float(row.try_get::<f32, _>(index)?.into()),
        "DOUBLE" => Value::Float(row.try_get(index)?),
        "BLOB" => {
            let bytes: Vec<u8> = row.try_get(index)?;
            Value::Text(String::from_utf8_lossy(&bytes).into_owned())
        }
        _ => Value::Text(row.try_get(index)?),
    };
    Ok(value)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared SQLite fixtures for database tests

    use sqlx::AnyPool;
    use sqlx::any::AnyPoolOptions;
    use std::path::Path;

    pub async fn sqlite_pool(dir: &Path) -> AnyPool {
        sqlx::any::install_default_drivers();
        let url = format!("sqlite://{}?mode=rwc", dir.join("source.db").display());
        let pool = AnyPoolOptions::new()
            .max_connections(4)
            .connect(&url)
            .await
            .unwrap();
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await
            .unwrap();
        pool
    }

    pub async fn execute(pool: &AnyPool, sql: &str) {
        sqlx::query(sql).execute(pool).await.unwrap();
    }
}
