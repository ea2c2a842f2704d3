//! Structured sink: persists records back into a table

use super::validate_identifier;
use crate::error::{PipelineError, Result};
use crate::etl::{ExportArtifact, LoadSession, Loader};
use crate::record::{Record, Schema, Value};
use serde::{Deserialize, Serialize};
use sqlx::AnyPool;
use sqlx::any::{Any, AnyArguments};
use sqlx::query::Query;
use std::sync::Arc;

/// How each record is written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Plain `INSERT`
    Insert,
    /// `INSERT ... ON CONFLICT (key) DO UPDATE`, so reruns replace earlier rows
    Upsert { key: String },
}

/// When written records become visible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitMode {
    /// All records of a run are committed together, or none are
    #[default]
    Transactional,
    /// Each record commits on its own; rows written before a failure stay
    PerRecord,
}

/// Loader that writes records into a database table
///
/// # Example
/// ```no_run
/// use tablepipe::database::{TableWriter, WriteMode};
///
/// # fn example(pool: sqlx::AnyPool) -> tablepipe::Result<()> {
/// let writer = TableWriter::new(pool, "products_enriched")?
///     .with_mode(WriteMode::Upsert { key: "productId".into() });
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct TableWriter {
    pool: AnyPool,
    table: String,
    mode: WriteMode,
    commit: CommitMode,
}

impl TableWriter {
    /// # Errors
    /// Returns a `WriteError` if the table name is not a plain identifier
    pub fn new(pool: AnyPool, table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        validate_identifier(&table).map_err(PipelineError::write)?;
        Ok(Self {
            pool,
            table,
            mode: WriteMode::Insert,
            commit: CommitMode::default(),
        })
    }

    pub fn with_mode(mut self, mode: WriteMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_commit_mode(mut self, commit: CommitMode) -> Self {
        self.commit = commit;
        self
    }

    fn insert_sql(&self, schema: &Schema) -> Result<String> {
        if schema.is_empty() {
            return Err(PipelineError::write("cannot insert rows without columns"));
        }
        for column in schema.columns() {
            validate_identifier(column).map_err(PipelineError::write)?;
        }

        let columns = schema.columns().join(", ");
        let placeholders = (1..=schema.len())
            .map(|i| format!("${}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let insert = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table, columns, placeholders
        );

        match &self.mode {
            WriteMode::Insert => Ok(insert),
            WriteMode::Upsert { key } => {
                if schema.index_of(key).is_none() {
                    return Err(PipelineError::write(format!(
                        "upsert key '{}' is not a column of [{}]",
                        key, schema
                    )));
                }
                let updates = schema
                    .columns()
                    .iter()
                    .filter(|c| *c != key)
                    .map(|c| format!("{c} = excluded.{c}"))
                    .collect::<Vec<_>>();
                if updates.is_empty() {
                    Ok(format!("{} ON CONFLICT ({}) DO NOTHING", insert, key))
                } else {
                    Ok(format!(
                        "{} ON CONFLICT ({}) DO UPDATE SET {}",
                        insert,
                        key,
                        updates.join(", ")
                    ))
                }
            }
        }
    }
}

impl Loader for TableWriter {
    type Item = Record;
    type Session = TableSession;

    async fn begin(&self, schema: Arc<Schema>) -> Result<Self::Session> {
        let sql = self.insert_sql(&schema)?;
        log::debug!("Writing with {}", sql);

        let target = match self.commit {
            CommitMode::Transactional => Target::Transaction(
                self.pool
                    .begin()
                    .await
                    .map_err(|e| PipelineError::write(format!("begin transaction: {}", e)))?,
            ),
            CommitMode::PerRecord => Target::Pool(self.pool.clone()),
        };

        Ok(TableSession {
            table: self.table.clone(),
            schema,
            sql,
            target,
            rows: 0,
            bytes: 0,
        })
    }
}

enum Target {
    Transaction(sqlx::Transaction<'static, Any>),
    Pool(AnyPool),
}

/// Open write to a table; an uncommitted transaction rolls back on drop
pub struct TableSession {
    table: String,
    schema: Arc<Schema>,
    sql: String,
    target: Target,
    rows: u64,
    bytes: u64,
}

impl LoadSession for TableSession {
    type Item = Record;

    async fn load(&mut self, items: Vec<Self::Item>) -> Result<usize> {
        for record in &items {
            record.ensure_schema(&self.schema)?;

            let query = record
                .values()
                .iter()
                .fold(sqlx::query(self.sql.as_str()), bind_value);
            let result = match &mut self.target {
                Target::Transaction(tx) => query.execute(&mut **tx).await,
                Target::Pool(pool) => query.execute(&*pool).await,
            };
            result.map_err(|e| {
                PipelineError::write(format!("insert into {} failed: {}", self.table, e))
            })?;

            self.rows += 1;
            self.bytes += record
                .values()
                .iter()
                .map(|v| v.to_string().len() as u64)
                .sum::<u64>();
        }
        Ok(items.len())
    }

    async fn commit(self) -> Result<ExportArtifact> {
        if let Target::Transaction(tx) = self.target {
            tx.commit().await.map_err(|e| {
                PipelineError::write(format!("commit to {} failed: {}", self.table, e))
            })?;
        }

        Ok(ExportArtifact {
            location: format!("table:{}", self.table),
            row_count: self.rows,
            byte_size: self.bytes,
        })
    }
}

fn bind_value<'q>(
    query: Query<'q, Any, AnyArguments<'q>>,
    value: &Value,
) -> Query<'q, Any, AnyArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Integer(i) => query.bind(*i),
        Value::Float(x) => query.bind(*x),
        Value::Text(s) => query.bind(s.clone()),
    }
}
