//! Lookup enricher
//!
//! Replaces one designated field of a record with a value fetched from an
//! auxiliary store, keyed by another field of the same record.

use super::Lookup;
use crate::error::{PipelineError, Result};
use crate::etl::Transformer;
use crate::record::{Record, Value};
use std::collections::{HashMap, HashSet};

/// Transformer that enriches records through a [`Lookup`]
///
/// - key field is NULL: the record passes through, no lookup is made
/// - no row for the key: the record passes through unchanged
/// - a row for the key: only `target_field` is replaced, column order is kept
///
/// `transform_many` batches the lookups of a whole batch into a single
/// [`Lookup::lookup_many`] call.
///
/// # Example
/// ```no_run
/// use tablepipe::database::SqlLookup;
/// use tablepipe::transform::LookupEnricher;
///
/// # fn example(pool: sqlx::AnyPool) -> tablepipe::Result<()> {
/// let lookup = SqlLookup::new(pool, "loyality_data", "productSku", "loyalityData")?;
/// let enricher = LookupEnricher::new(lookup, "productSku", "productData");
/// # Ok(())
/// # }
/// ```
pub struct LookupEnricher<L> {
    lookup: L,
    key_field: String,
    target_field: String,
}

impl<L: Lookup> LookupEnricher<L> {
    pub fn new(lookup: L, key_field: impl Into<String>, target_field: impl Into<String>) -> Self {
        Self {
            lookup,
            key_field: key_field.into(),
            target_field: target_field.into(),
        }
    }

    /// The lookup key of a record, `None` when the key field is NULL
    fn key_of(&self, record: &Record) -> Result<Option<String>> {
        record
            .get(&self.key_field)
            .map(Value::as_key)
            .ok_or_else(|| {
                PipelineError::transform(format!(
                    "key field '{}' not in [{}]",
                    self.key_field,
                    record.schema()
                ))
            })
    }

    fn enrich(&self, record: Record, found: Option<Value>) -> Result<Record> {
        let Some(value) = found else {
            return Ok(record);
        };

        let enriched = record
            .with_value(&self.target_field, value)
            .ok_or_else(|| {
                PipelineError::transform(format!(
                    "target field '{}' not in [{}]",
                    self.target_field,
                    record.schema()
                ))
            })?;
        log::debug!("Transforming {} into {}", record, enriched);
        Ok(enriched)
    }
}

impl<L: Lookup> Transformer for LookupEnricher<L> {
    type Input = Record;
    type Output = Record;

    async fn transform(&self, input: Self::Input) -> Result<Self::Output> {
        let found = match self.key_of(&input)? {
            Some(key) => self.lookup.lookup(&key).await?,
            None => None,
        };
        self.enrich(input, found)
    }

    async fn transform_many(&self, inputs: Vec<Self::Input>) -> Result<Vec<Self::Output>> {
        let keys = inputs
            .iter()
            .map(|record| self.key_of(record))
            .collect::<Result<Vec<_>>>()?;

        let mut seen = HashSet::new();
        let distinct = keys
            .iter()
            .flatten()
            .filter(|key| seen.insert(key.as_str()))
            .cloned()
            .collect::<Vec<_>>();

        let found: HashMap<String, Value> = if distinct.is_empty() {
            HashMap::new()
        } else {
            self.lookup.lookup_many(&distinct).await?
        };

        inputs
            .into_iter()
            .zip(keys)
            .map(|(record, key)| {
                // Duplicate keys within a batch share one looked-up value
                let value = key.and_then(|k| found.get(&k).cloned());
                self.enrich(record, value)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Schema;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockLookup {
        rows: HashMap<String, Value>,
        calls: AtomicUsize,
        fail: bool,
    }

    impl MockLookup {
        fn loyalty() -> Self {
            let mut rows = HashMap::new();
            rows.insert("X123".to_string(), Value::from("loyalty-data-v2"));
            Self {
                rows,
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::loyalty()
            }
        }
    }

    impl Lookup for MockLookup {
        async fn lookup(&self, key: &str) -> Result<Option<Value>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(PipelineError::transform("lookup store unavailable"));
            }
            Ok(self.rows.get(key).cloned())
        }
    }

    fn product(sku: Value) -> Record {
        let schema = Arc::new(Schema::new(vec![
            "productId".into(),
            "productSku".into(),
            "productName".into(),
            "productAmount".into(),
            "productData".into(),
        ]));
        Record::new(
            schema,
            vec![
                Value::Integer(1),
                sku,
                "Widget".into(),
                Value::Float(9.5),
                "plain".into(),
            ],
        )
        .unwrap()
    }

    fn enricher(lookup: MockLookup) -> LookupEnricher<MockLookup> {
        LookupEnricher::new(lookup, "productSku", "productData")
    }

    #[tokio::test]
    async fn test_match_replaces_only_target_field() {
        let input = product("X123".into());
        let output = enricher(MockLookup::loyalty())
            .transform(input.clone())
            .await
            .unwrap();

        assert_eq!(output.get("productData"), Some(&Value::from("loyalty-data-v2")));
        assert_eq!(output.schema().columns(), input.schema().columns());
        for (column, value) in input.iter().filter(|(c, _)| *c != "productData") {
            assert_eq!(output.get(column), Some(value));
        }
    }

    #[tokio::test]
    async fn test_no_match_passes_through() {
        let input = product("X999".into());
        let output = enricher(MockLookup::loyalty())
            .transform(input.clone())
            .await
            .unwrap();
        assert_eq!(output, input);
    }

    #[tokio::test]
    async fn test_null_key_skips_lookup() {
        let transformer = enricher(MockLookup::loyalty());
        let input = product(Value::Null);
        let output = transformer.transform(input.clone()).await.unwrap();

        assert_eq!(output, input);
        assert_eq!(transformer.lookup.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_lookup_failure_is_transform_error() {
        let err = enricher(MockLookup::failing())
            .transform(product("X123".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Transform(_)));
    }

    #[tokio::test]
    async fn test_unknown_fields_are_errors() {
        let transformer = LookupEnricher::new(MockLookup::loyalty(), "sku", "productData");
        assert!(transformer.transform(product("X123".into())).await.is_err());

        let transformer = LookupEnricher::new(MockLookup::loyalty(), "productSku", "data");
        assert!(transformer.transform(product("X123".into())).await.is_err());
        // No match means the target field is never touched
        assert!(transformer.transform(product("X999".into())).await.is_ok());
    }

    #[tokio::test]
    async fn test_transform_many_dedupes_keys() {
        let transformer = enricher(MockLookup::loyalty());
        let inputs = vec![
            product("X123".into()),
            product("X999".into()),
            product("X123".into()),
            product(Value::Null),
        ];

        let outputs = transformer.transform_many(inputs.clone()).await.unwrap();

        // Default lookup_many: one call per distinct non-null key
        assert_eq!(transformer.lookup.calls.load(Ordering::SeqCst), 2);
        assert_eq!(outputs.len(), 4);
        assert_eq!(outputs[0].get("productData"), Some(&Value::from("loyalty-data-v2")));
        assert_eq!(outputs[1], inputs[1]);
        assert_eq!(outputs[2].get("productData"), Some(&Value::from("loyalty-data-v2")));
        assert_eq!(outputs[3], inputs[3]);
    }
}
