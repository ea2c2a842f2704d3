//! Job orchestration
//!
//! - [`catalog`]: named job definitions (built-in and YAML)
//! - [`run`]: run ids and run descriptors
//! - [`registry`]: descriptor store and per-table exclusion
//! - [`orchestrator`]: sync and async triggers, deadline and cancellation

pub mod catalog;
pub mod orchestrator;
pub mod registry;
pub mod run;

pub use catalog::{Enrichment, JobCatalog, JobSpec, Sink, Source};
pub use orchestrator::{Orchestrator, RunHandle, TriggerError};
pub use registry::{ConcurrencyPolicy, RunRegistry, TableGuard};
pub use run::{RunDescriptor, RunError, RunId, RunStatus};
