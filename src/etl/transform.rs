//! Transformer trait for data transformation

use crate::error::Result;
use std::future::Future;

/// Transformer trait for transforming data items
///
/// Implementors define how to transform items:
/// - Data enrichment (lookups against auxiliary tables)
/// - Format conversion
/// - Validation
///
/// A transformer must not hold mutable shared state; callers may invoke it
/// for several items concurrently.
///
/// # Example
/// ```no_run
/// use tablepipe::etl::Transformer;
/// use tablepipe::{Record, Result, Value};
///
/// struct Redactor {
///     column: String,
/// }
///
/// impl Transformer for Redactor {
///     type Input = Record;
///     type Output = Record;
///
///     async fn transform(&self, input: Self::Input) -> Result<Self::Output> {
///         Ok(input.with_value(&self.column, Value::Null).unwrap_or(input))
///     }
/// }
/// ```
pub trait Transformer: Send + Sync {
    /// Input item type
    type Input: Send;

    /// Output item type after transformation
    type Output: Send;

    /// Transform a single item
    ///
    /// # Errors
    /// Returns an error if transformation fails (lookup failure, validation, etc.)
    fn transform(&self, input: Self::Input) -> impl Future<Output = Result<Self::Output>> + Send;

    /// Transform multiple items (default: one at a time, in order)
    ///
    /// Override this for optimized batch processing
    fn transform_many(
        &self,
        inputs: Vec<Self::Input>,
    ) -> impl Future<Output = Result<Vec<Self::Output>>> + Send {
        async move {
            let mut outputs = Vec::with_capacity(inputs.len());
            for input in inputs {
                outputs.push(self.transform(input).await?);
            }
            Ok(outputs)
        }
    }
}

/// Identity transformer that passes items through unchanged
///
/// Use this when you need a transformer but don't want to modify the data.
/// The generic parameter T must be specified when creating the transformer.
pub struct IdentityTransformer<T> {
    _phantom: std::marker::PhantomData<fn() -> T>,
}

impl<T> Default for IdentityTransformer<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T> IdentityTransformer<T> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T: Send> Transformer for IdentityTransformer<T> {
    type Input = T;
    type Output = T;

    async fn transform(&self, input: Self::Input) -> Result<Self::Output> {
        Ok(input)
    }

    async fn transform_many(&self, inputs: Vec<Self::Input>) -> Result<Vec<Self::Output>> {
        Ok(inputs)
    }
}
