//! Extractor trait for streaming data out of a source

use crate::error::Result;
use crate::record::Schema;
use futures::stream::BoxStream;
use std::sync::Arc;

/// A lazy, single-pass sequence of items plus the column metadata that was
/// captured before the first item was produced.
pub struct Extraction<'a, T> {
    pub schema: Arc<Schema>,
    pub items: BoxStream<'a, Result<T>>,
}

/// Extractor trait for extracting data from a source
///
/// Implementors define how to stream items from sources like:
/// - Database tables and queries
/// - Files
///
/// The returned stream is finite and not restartable; reading again needs a
/// fresh call to [`Extractor::extract`]. An error item ends the stream.
///
/// # Example
/// ```no_run
/// use tablepipe::etl::{Extraction, Extractor};
/// use tablepipe::{Record, Result, Schema};
/// use futures::StreamExt;
/// use std::sync::Arc;
///
/// struct StaticRows {
///     schema: Arc<Schema>,
///     rows: Vec<Record>,
/// }
///
/// impl Extractor for StaticRows {
///     type Item = Record;
///
///     async fn extract(&self) -> Result<Extraction<'_, Self::Item>> {
///         Ok(Extraction {
///             schema: Arc::clone(&self.schema),
///             items: futures::stream::iter(self.rows.clone().into_iter().map(Ok)).boxed(),
///         })
///     }
/// }
/// ```
pub trait Extractor: Send + Sync {
    /// The type of items extracted
    type Item: Send;

    /// Start extracting from the source
    ///
    /// # Errors
    /// Returns an error if the read cannot be started (query failure, etc.)
    fn extract(
        &self,
    ) -> impl std::future::Future<Output = Result<Extraction<'_, Self::Item>>> + Send;
}
