//! Records flowing through a pipeline run
//!
//! A [`Record`] is one row bound to the run's [`Schema`]. Column values are
//! kept as a tagged [`Value`] so numbers and nulls survive the trip from the
//! source to the sink without being flattened to strings.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A single column value, decoded once at read time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Text form used for lookup keys; `None` for SQL NULL
    pub fn as_key(&self) -> Option<String> {
        match self {
            Self::Null => None,
            other => Some(other.to_string()),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Ordered column names captured before the first row of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<String>,
}

impl Schema {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Position of a column by name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

impl std::fmt::Display for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.columns.join(","))
    }
}

/// One row of data, immutable once built
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    schema: Arc<Schema>,
    values: Vec<Value>,
}

impl Record {
    /// Build a record; the value count must match the schema's arity
    pub fn new(schema: Arc<Schema>, values: Vec<Value>) -> crate::Result<Self> {
        if schema.len() != values.len() {
            return Err(crate::PipelineError::read(format!(
                "row has {} values but schema [{}] has {} columns",
                values.len(),
                schema,
                schema.len()
            )));
        }
        Ok(Self { schema, values })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.schema.index_of(column).map(|i| &self.values[i])
    }

    /// Same record with one column replaced; `None` if the column is unknown
    pub fn with_value(&self, column: &str, value: Value) -> Option<Record> {
        let index = self.schema.index_of(column)?;
        let mut values = self.values.clone();
        values[index] = value;
        Some(Record {
            schema: Arc::clone(&self.schema),
            values,
        })
    }

    /// Fail with `SchemaMismatch` unless this record belongs to `expected`
    pub fn ensure_schema(&self, expected: &Schema) -> crate::Result<()> {
        if self.schema.as_ref() != expected {
            return Err(crate::PipelineError::SchemaMismatch {
                expected: expected.to_string(),
                actual: self.schema.to_string(),
            });
        }
        Ok(())
    }

    /// Iterate `(column, value)` pairs in schema order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.schema
            .columns()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fields = self
            .iter()
            .map(|(column, value)| format!("{}={}", column, value))
            .collect::<Vec<_>>();
        write!(f, "({})", fields.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product() -> Record {
        let schema = Arc::new(Schema::new(vec![
            "productId".into(),
            "productSku".into(),
            "productData".into(),
        ]));
        Record::new(
            schema,
            vec![Value::Integer(7), "X123".into(), "plain".into()],
        )
        .unwrap()
    }

    #[test]
    fn test_arity_checked() {
        let schema = Arc::new(Schema::new(vec!["id".into(), "name".into()]));
        assert!(Record::new(schema, vec![Value::Integer(1)]).is_err());
    }

    #[test]
    fn test_with_value_replaces_one_field() {
        let record = product();
        let replaced = record.with_value("productData", "enriched".into()).unwrap();

        assert_eq!(replaced.get("productData"), Some(&Value::from("enriched")));
        assert_eq!(replaced.get("productId"), Some(&Value::Integer(7)));
        assert_eq!(record.get("productData"), Some(&Value::from("plain")));
        assert!(record.with_value("missing", Value::Null).is_none());
    }

    #[test]
    fn test_schema_variance_rejected() {
        let record = product();
        assert!(record.ensure_schema(record.schema()).is_ok());

        let other = Schema::new(vec!["productId".into(), "productSku".into()]);
        let err = record.ensure_schema(&other).unwrap_err();
        assert!(matches!(err, crate::PipelineError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_display_and_keys() {
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(Value::Float(1.5).to_string(), "1.5");
        assert_eq!(Value::Null.as_key(), None);
        assert_eq!(Value::Integer(42).as_key().as_deref(), Some("42"));
        assert_eq!(
            product().to_string(),
            "(productId=7, productSku=X123, productData=plain)"
        );
    }
}
