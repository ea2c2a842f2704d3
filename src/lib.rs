//! tablepipe
//!
//! A small batch ETL engine: read rows from a relational table, optionally
//! enrich each row through a lookup, and commit the result to a dated CSV file
//! or back into a table.

pub mod cli;
pub mod client;
pub mod config;
pub mod database;
pub mod error;
pub mod etl;
pub mod job;
pub mod record;
pub mod storage;
pub mod transform;

// Re-exports for convenience
pub use client::{Auth, Connection, ConnectionProvider};
pub use config::{Config, ConfigError};
pub use error::{ConnectError, ErrorKind, PipelineError, Result};
pub use etl::{ExportArtifact, Extractor, IdentityTransformer, Loader, Pipeline, Transformer};
pub use job::{JobCatalog, Orchestrator, RunDescriptor, RunId, RunStatus};
pub use record::{Record, Schema, Value};
