//! Loader traits for writing data to destinations

use crate::error::Result;
use crate::record::Schema;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

/// The durable output of a successful run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportArtifact {
    /// File path, or `table:<name>` for table sinks
    pub location: String,
    pub row_count: u64,
    pub byte_size: u64,
}

/// Loader trait for loading data to a destination
///
/// Loading happens in three steps: [`Loader::begin`] opens a session for the
/// run's schema, [`LoadSession::load`] receives batches as they are produced,
/// and [`LoadSession::commit`] makes the output durable. Dropping a session
/// without committing discards whatever it staged.
///
/// # Example
/// ```no_run
/// use tablepipe::etl::{ExportArtifact, LoadSession, Loader};
/// use tablepipe::{Record, Result, Schema};
/// use std::sync::Arc;
///
/// struct CountingLoader;
///
/// struct CountingSession(u64);
///
/// impl Loader for CountingLoader {
///     type Item = Record;
///     type Session = CountingSession;
///
///     async fn begin(&self, _schema: Arc<Schema>) -> Result<Self::Session> {
///         Ok(CountingSession(0))
///     }
/// }
///
/// impl LoadSession for CountingSession {
///     type Item = Record;
///
///     async fn load(&mut self, items: Vec<Self::Item>) -> Result<usize> {
///         self.0 += items.len() as u64;
///         Ok(items.len())
///     }
///
///     async fn commit(self) -> Result<ExportArtifact> {
///         Ok(ExportArtifact { location: "memory".into(), row_count: self.0, byte_size: 0 })
///     }
/// }
/// ```
pub trait Loader: Send + Sync {
    /// The type of items to load
    type Item: Send;

    /// The open write session for one run
    type Session: LoadSession<Item = Self::Item>;

    /// Open a session for a run producing items of `schema`
    ///
    /// # Errors
    /// Returns an error if the destination cannot be prepared (I/O, permissions, etc.)
    fn begin(&self, schema: Arc<Schema>) -> impl Future<Output = Result<Self::Session>> + Send;
}

/// An in-progress write to a destination
pub trait LoadSession: Send {
    type Item: Send;

    /// Write a batch of items, returning how many were accepted
    ///
    /// # Errors
    /// Returns an error if writing fails or an item does not fit the session's schema
    fn load(&mut self, items: Vec<Self::Item>) -> impl Future<Output = Result<usize>> + Send;

    /// Make everything loaded so far durable
    fn commit(self) -> impl Future<Output = Result<ExportArtifact>> + Send;
}
