//! Row reader
//!
//! Streams a table or a job-specific query as [`Record`]s.

use super::{decode_value, validate_identifier};
use crate::error::{PipelineError, Result};
use crate::etl::{Extraction, Extractor};
use crate::record::{Record, Schema};
use futures::{StreamExt, future};
use sqlx::any::AnyRow;
use sqlx::{AnyPool, Column, Executor, Row, Statement};
use std::pin::Pin;
use std::sync::Arc;

/// Extractor for rows of a relational table or query
///
/// Column names are captured once, before the first record is yielded. Values
/// keep their natural type (see [`crate::Value`]); nothing is coerced.
///
/// # Example
/// ```no_run
/// use tablepipe::database::TableReader;
/// use tablepipe::etl::Extractor;
/// use futures::TryStreamExt;
///
/// # async fn example(pool: sqlx::AnyPool) -> tablepipe::Result<()> {
/// let reader = TableReader::table(pool, "shipments")?;
/// let extraction = reader.extract().await?;
/// println!("columns: {}", extraction.schema);
/// let records: Vec<_> = extraction.items.try_collect().await?;
/// # Ok(())
/// # }
/// ```
pub struct TableReader {
    pool: AnyPool,
    sql: String,
}

impl TableReader {
    /// Read every row of `table`
    ///
    /// # Errors
    /// Returns a `ReadError` if the table name is not a plain identifier
    pub fn table(pool: AnyPool, table: &str) -> Result<Self> {
        validate_identifier(table).map_err(PipelineError::read)?;
        Ok(Self {
            pool,
            sql: format!("SELECT * FROM {}", table),
        })
    }

    /// Read the rows produced by a job-specific query
    pub fn query(pool: AnyPool, sql: impl Into<String>) -> Self {
        Self {
            pool,
            sql: sql.into(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Column names for a statement that produced no rows
    async fn describe(&self) -> Result<Vec<String>> {
        let statement = self
            .pool
            .prepare(self.sql.as_str())
            .await
            .map_err(|e| PipelineError::read(format!("{}: {}", self.sql, e)))?;
        Ok(column_names(statement.columns()))
    }
}

impl Extractor for TableReader {
    type Item = Record;

    async fn extract(&self) -> Result<Extraction<'_, Self::Item>> {
        log::debug!("Executing {}", self.sql);

        let mut rows = sqlx::query(self.sql.as_str()).fetch(&self.pool).peekable();

        let columns = match Pin::new(&mut rows).peek().await {
            Some(Ok(row)) => Some(column_names(row.columns())),
            Some(Err(_)) => None,
            None => Some(self.describe().await?),
        };
        // A statement that fails outright is reported before any sink is opened
        let Some(columns) = columns else {
            let reason = match rows.next().await {
                Some(Err(e)) => e.to_string(),
                _ => "statement failed".to_string(),
            };
            return Err(PipelineError::read(format!("{}: {}", self.sql, reason)));
        };
        let schema = Arc::new(Schema::new(columns));

        let sql = self.sql.clone();
        let row_schema = Arc::clone(&schema);
        let items = rows
            .map(move |row| {
                let row = row.map_err(|e| PipelineError::read(format!("{}: {}", sql, e)))?;
                decode_record(&row_schema, &row)
            })
            // The first error ends the sequence
            .scan(false, |failed, item| {
                if *failed {
                    return future::ready(None);
                }
                *failed = item.is_err();
                future::ready(Some(item))
            })
            .boxed();

        Ok(Extraction { schema, items })
    }
}

fn column_names<C: Column>(columns: &[C]) -> Vec<String> {
    columns.iter().map(|c| c.name().to_string()).collect()
}

fn decode_record(schema: &Arc<Schema>, row: &AnyRow) -> Result<Record> {
    let values = (0..row.len())
        .map(|i| {
            decode_value(row, i).map_err(|e| {
                PipelineError::read(format!("column '{}': {}", row.column(i).name(), e))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Record::new(Arc::clone(schema), values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::testing::{execute, sqlite_pool};
    use crate::record::Value;
    use futures::TryStreamExt;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_read_table() {
        let temp = TempDir::new().unwrap();
        let pool = sqlite_pool(temp.path()).await;
        execute(&pool, "CREATE TABLE shipments (id INTEGER, name TEXT, weight REAL)").await;
        execute(&pool, "INSERT INTO shipments VALUES (1, 'A', 2.5), (2, NULL, 4.0)").await;

        let reader = TableReader::table(pool, "shipments").unwrap();
        let extraction = reader.extract().await.unwrap();
        assert_eq!(extraction.schema.columns(), ["id", "name", "weight"]);

        let records: Vec<Record> = extraction.items.try_collect().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0].values(),
            [Value::Integer(1), Value::from("A"), Value::Float(2.5)]
        );
        assert_eq!(records[1].get("name"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_empty_table_still_has_columns() {
        let temp = TempDir::new().unwrap();
        let pool = sqlite_pool(temp.path()).await;
        execute(&pool, "CREATE TABLE shipments (id INTEGER, name TEXT)").await;

        let reader = TableReader::table(pool, "shipments").unwrap();
        let extraction = reader.extract().await.unwrap();
        assert_eq!(extraction.schema.columns(), ["id", "name"]);

        let records: Vec<Record> = extraction.items.try_collect().await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_query_source() {
        let temp = TempDir::new().unwrap();
        let pool = sqlite_pool(temp.path()).await;
        execute(&pool, "CREATE TABLE orders (status TEXT)").await;
        execute(
            &pool,
            "INSERT INTO orders VALUES ('failed'), ('delivered'), ('failed')",
        )
        .await;

        let reader = TableReader::query(
            pool,
            "SELECT status, COUNT(*) AS total FROM orders GROUP BY status ORDER BY status",
        );
        let extraction = reader.extract().await.unwrap();
        let records: Vec<Record> = extraction.items.try_collect().await.unwrap();

        assert_eq!(extraction.schema.columns(), ["status", "total"]);
        assert_eq!(records[1].get("total"), Some(&Value::Integer(2)));
    }

    #[tokio::test]
    async fn test_missing_table_is_read_error() {
        let temp = TempDir::new().unwrap();
        let pool = sqlite_pool(temp.path()).await;

        let reader = TableReader::table(pool, "nope").unwrap();
        let err = reader.extract().await.err().unwrap();
        assert!(matches!(err, PipelineError::Read(_)), "{:?}", err);
        assert!(err.to_string().contains("SELECT * FROM nope"));
    }

    #[tokio::test]
    async fn test_error_mid_stream_ends_rows() {
        let temp = TempDir::new().unwrap();
        let pool = sqlite_pool(temp.path()).await;

        // abs() of the smallest integer overflows, on the second row only
        let reader = TableReader::query(
            pool,
            "WITH t(x) AS (VALUES (1), (2), (3)) \
             SELECT CASE WHEN x = 2 THEN abs(x - 9223372036854775807 - 3) ELSE x END AS v \
             FROM t",
        );
        let mut items = reader.extract().await.unwrap().items;

        let first = items.next().await.unwrap().unwrap();
        assert_eq!(first.values(), [Value::Integer(1)]);

        let err = items.next().await.unwrap().unwrap_err();
        assert!(matches!(err, PipelineError::Read(_)), "{:?}", err);

        assert!(items.next().await.is_none());
    }

    #[tokio::test]
    async fn test_rejects_bad_table_name() {
        let temp = TempDir::new().unwrap();
        let pool = sqlite_pool(temp.path()).await;

        let err = TableReader::table(pool, "shipments where 1=1").err().unwrap();
        assert!(matches!(err, PipelineError::Read(_)));
    }
}
