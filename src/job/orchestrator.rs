//! Job orchestrator
//!
//! Turns a trigger into a run: assigns a run id, waits for the source table,
//! connects, drives the pipeline and records the terminal state.
//!
//! ```text
//! trigger(job) ─► RunDescriptor{Running} ─► acquire table ─► connect
//!                                                              │
//!               RunDescriptor{Succeeded|Failed} ◄── pipeline ◄─┘
//! ```

use super::catalog::{JobCatalog, JobSpec, Sink, Source};
use super::registry::RunRegistry;
use super::run::{RunDescriptor, RunError, RunId};
use crate::client::ConnectionProvider;
use crate::config::Config;
use crate::database::{SqlLookup, TableReader, TableWriter, WriteMode};
use crate::error::{ErrorKind, PipelineError, Result};
use crate::etl::{ExportArtifact, IdentityTransformer, Loader, Pipeline, Transformer};
use crate::record::Record;
use crate::storage::DelimitedFileWriter;
use crate::transform::LookupEnricher;
use chrono::NaiveDate;
use sqlx::AnyPool;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TriggerError {
    #[error("unknown job '{0}'")]
    UnknownJob(String),
}

/// Runs jobs from a catalog; cheap to clone and share between tasks
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    catalog: JobCatalog,
    registry: RunRegistry,
    export_date: Option<NaiveDate>,
}

impl Orchestrator {
    pub fn new(config: Config, catalog: JobCatalog) -> Self {
        Self::build(config, catalog, None)
    }

    /// Date file exports instead of today's UTC date
    pub fn with_export_date(self, date: NaiveDate) -> Self {
        Self::build(
            self.inner.config.clone(),
            self.inner.catalog.clone(),
            Some(date),
        )
    }

    fn build(config: Config, catalog: JobCatalog, export_date: Option<NaiveDate>) -> Self {
        let registry = RunRegistry::new(config.concurrency);
        Self {
            inner: Arc::new(Inner {
                config,
                catalog,
                registry,
                export_date,
            }),
        }
    }

    pub fn catalog(&self) -> &JobCatalog {
        &self.inner.catalog
    }

    /// Run a job to completion and return its terminal descriptor
    ///
    /// A failed run is still `Ok`; inspect `status` and `error`.
    pub async fn trigger(&self, job: &str) -> std::result::Result<RunDescriptor, TriggerError> {
        Ok(self.launch(job)?.wait().await)
    }

    /// Start a job in the background
    ///
    /// The run id is assigned before this returns; poll [`Orchestrator::status`]
    /// or await [`RunHandle::wait`].
    pub fn launch(&self, job: &str) -> std::result::Result<RunHandle, TriggerError> {
        let spec = self
            .inner
            .catalog
            .get(job)
            .cloned()
            .ok_or_else(|| TriggerError::UnknownJob(job.to_string()))?;

        let descriptor = RunDescriptor::start(RunId::generate(), job, spec.source_label());
        let run_id = descriptor.run_id.clone();
        self.inner.registry.store(descriptor.clone());
        log::info!("Run {} of job {} started", run_id, job);

        let cancel = CancellationToken::new();
        let task = tokio::spawn({
            let this = self.clone();
            let cancel = cancel.clone();
            async move { this.execute(spec, descriptor, cancel).await }
        });

        Ok(RunHandle {
            run_id,
            cancel,
            task,
            orchestrator: self.clone(),
        })
    }

    /// Current descriptor of a run, if the run id is known
    pub fn status(&self, run_id: &RunId) -> Option<RunDescriptor> {
        self.inner.registry.get(run_id)
    }

    pub fn runs(&self) -> Vec<RunDescriptor> {
        self.inner.registry.list()
    }

    async fn execute(
        &self,
        spec: JobSpec,
        mut descriptor: RunDescriptor,
        cancel: CancellationToken,
    ) -> RunDescriptor {
        match self.run_job(&spec, &cancel).await {
            Ok(artifact) => {
                log::info!(
                    "Run {} succeeded: {} rows to {}",
                    descriptor.run_id,
                    artifact.row_count,
                    artifact.location
                );
                descriptor.succeed(artifact);
            }
            Err(e) => {
                log::error!("Run {} failed: {}", descriptor.run_id, e);
                descriptor.fail(RunError::from(&e));
            }
        }
        self.inner.registry.store(descriptor.clone());
        descriptor
    }

    async fn run_job(&self, spec: &JobSpec, cancel: &CancellationToken) -> Result<ExportArtifact> {
        let work = async {
            let _table = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                guard = self.inner.registry.acquire(spec.source_label()) => guard?,
            };
            self.connect_and_run(spec, cancel).await
        };

        match self.inner.config.run_deadline {
            Some(deadline) => tokio::time::timeout(deadline, work)
                .await
                .map_err(|_| PipelineError::DeadlineExceeded(deadline))?,
            None => work.await,
        }
    }

    async fn connect_and_run(
        &self,
        spec: &JobSpec,
        cancel: &CancellationToken,
    ) -> Result<ExportArtifact> {
        let config = &self.inner.config;
        let provider = ConnectionProvider::new(&config.database_url, config.auth.clone())
            .with_connect_timeout(config.connect_timeout);

        let connection = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            connection = provider.open() => connection?,
        };

        let result = self.dispatch(spec, connection.pool(), cancel).await;
        connection.close().await;
        result
    }

    async fn dispatch(
        &self,
        spec: &JobSpec,
        pool: &AnyPool,
        cancel: &CancellationToken,
    ) -> Result<ExportArtifact> {
        let reader = match &spec.source {
            Source::Table { table } => TableReader::table(pool.clone(), table)?,
            Source::Query { sql } => TableReader::query(pool.clone(), sql.clone()),
        };

        let enricher = match &spec.enrichment {
            Some(enrichment) => {
                let lookup = SqlLookup::new(
                    pool.clone(),
                    &enrichment.lookup_table,
                    &enrichment.key_column,
                    &enrichment.value_column,
                )?;
                Some(LookupEnricher::new(
                    lookup,
                    &enrichment.key_field,
                    &enrichment.target_field,
                ))
            }
            None => None,
        };

        match (enricher, &spec.sink) {
            (None, Sink::File { .. }) => {
                let writer = self.file_writer(spec);
                self.drive(reader, IdentityTransformer::<Record>::new(), writer, cancel)
                    .await
            }
            (None, Sink::Table { .. }) => {
                let writer = table_writer(pool, &spec.sink)?;
                self.drive(reader, IdentityTransformer::<Record>::new(), writer, cancel)
                    .await
            }
            (Some(enricher), Sink::File { .. }) => {
                self.drive(reader, enricher, self.file_writer(spec), cancel).await
            }
            (Some(enricher), Sink::Table { .. }) => {
                let writer = table_writer(pool, &spec.sink)?;
                self.drive(reader, enricher, writer, cancel).await
            }
        }
    }

    async fn drive<T, L>(
        &self,
        reader: TableReader,
        transformer: T,
        loader: L,
        cancel: &CancellationToken,
    ) -> Result<ExportArtifact>
    where
        T: Transformer<Input = Record, Output = Record>,
        L: Loader<Item = Record>,
    {
        Pipeline::new(reader, transformer, loader)
            .with_batch_size(self.inner.config.batch_size)
            .with_cancellation(cancel.clone())
            .run()
            .await
    }

    fn file_writer(&self, spec: &JobSpec) -> DelimitedFileWriter {
        let config = &self.inner.config;
        let (dir, quoting) = match &spec.sink {
            Sink::File { dir, quoting } => (
                dir.clone().unwrap_or_else(|| config.output_dir.clone()),
                quoting.unwrap_or(config.quoting),
            ),
            Sink::Table { .. } => (config.output_dir.clone(), config.quoting),
        };

        let writer = DelimitedFileWriter::new(dir, spec.source_label()).with_quoting(quoting);
        match self.inner.export_date {
            Some(date) => writer.with_date(date),
            None => writer,
        }
    }
}

fn table_writer(pool: &AnyPool, sink: &Sink) -> Result<TableWriter> {
    match sink {
        Sink::Table {
            table,
            upsert_key,
            commit,
        } => {
            let mode = match upsert_key {
                Some(key) => WriteMode::Upsert { key: key.clone() },
                None => WriteMode::Insert,
            };
            Ok(TableWriter::new(pool.clone(), table)?
                .with_mode(mode)
                .with_commit_mode(*commit))
        }
        Sink::File { .. } => Err(PipelineError::write("job does not write to a table")),
    }
}

/// A run started with [`Orchestrator::launch`]
pub struct RunHandle {
    run_id: RunId,
    cancel: CancellationToken,
    task: JoinHandle<RunDescriptor>,
    orchestrator: Orchestrator,
}

impl RunHandle {
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Ask the run to stop; it fails with `Cancelled` unless already finished
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the run to reach a terminal state
    pub async fn wait(self) -> RunDescriptor {
        match self.task.await {
            Ok(descriptor) => descriptor,
            Err(e) => {
                log::error!("Run {} task ended abnormally: {}", self.run_id, e);
                let registry = &self.orchestrator.inner.registry;
                let mut descriptor = registry.get(&self.run_id).unwrap_or_else(|| {
                    RunDescriptor::start(self.run_id.clone(), "unknown", "unknown")
                });
                descriptor.fail(abnormal_end(&e));
                registry.store(descriptor.clone());
                descriptor
            }
        }
    }
}

/// Failure recorded for a run task that never returned its descriptor
fn abnormal_end(e: &JoinError) -> RunError {
    let kind = if e.is_panic() {
        ErrorKind::Aborted
    } else {
        ErrorKind::Cancelled
    };
    RunError {
        kind,
        message: format!("run task ended abnormally: {}", e),
    }
}
