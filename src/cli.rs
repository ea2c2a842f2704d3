//! CLI helper functions

use crate::{
    client::ConnectionProvider,
    config::{Config, ConfigError},
    job::{JobCatalog, Orchestrator, RunDescriptor, RunStatus, Sink, TriggerError},
};
use eyre::{Context, Result};
use owo_colors::OwoColorize;
use std::path::Path;

/// Exit status when the process configuration is incomplete or invalid
pub const EXIT_CONFIG: i32 = 42;

/// Exit status when a run finishes `Failed`
pub const EXIT_RUN_FAILED: i32 = 1;

/// Load the configuration from environment variables
///
/// See [`crate::config`] for the variables read.
pub fn load_config() -> std::result::Result<Config, ConfigError> {
    Config::from_env()
}

/// Build an orchestrator with the built-in jobs plus the jobs file, if any
pub fn load_orchestrator(config: Config) -> Result<Orchestrator> {
    let catalog = JobCatalog::load(&config).context("Failed to load job catalog")?;
    Ok(Orchestrator::new(config, catalog))
}

/// Open and close one connection to the source database
pub async fn check_connection(config: &Config) -> Result<()> {
    let provider = ConnectionProvider::new(&config.database_url, config.auth.clone())
        .with_connect_timeout(config.connect_timeout);
    log::info!("Checking connection to {}", provider.redacted_dsn().bright_black());

    let connection = provider
        .open()
        .await
        .with_context(|| format!("Failed to connect to {}", provider.redacted_dsn()))?;
    connection.close().await;

    log::info!("Connection {}", "OK".green());
    Ok(())
}

/// Trigger a job and report its outcome
///
/// With `json` the terminal descriptor is printed to stdout. With `print` a
/// successful file export is echoed to stdout as well.
pub async fn run_job(
    orchestrator: &Orchestrator,
    job: &str,
    json: bool,
    print: bool,
) -> Result<RunDescriptor> {
    let run = orchestrator.trigger(job).await.map_err(|e| match e {
        TriggerError::UnknownJob(_) => eyre::eyre!(
            "{} (available: {})",
            e,
            orchestrator.catalog().names().join(", ")
        ),
    })?;

    report(&run, json)?;

    let writes_file = orchestrator
        .catalog()
        .get(job)
        .is_some_and(|spec| matches!(spec.sink, Sink::File { .. }));
    if print && writes_file && run.status == RunStatus::Succeeded {
        if let Some(artifact) = &run.artifact {
            print_export(&artifact.location)?;
        }
    }

    Ok(run)
}

/// Log a terminal descriptor, or print it as JSON
pub fn report(run: &RunDescriptor, json: bool) -> Result<()> {
    if json {
        let out = serde_json::to_string_pretty(run).context("Failed to serialize run")?;
        println!("{}", out);
        return Ok(());
    }

    match (&run.artifact, &run.error) {
        (Some(artifact), _) => log::info!(
            "Run {} {}: {} rows, {} bytes to {}",
            run.run_id.bright_black(),
            run.status.green(),
            artifact.row_count,
            artifact.byte_size,
            artifact.location.cyan()
        ),
        (None, Some(error)) => log::error!(
            "Run {} {}: {} {}",
            run.run_id.bright_black(),
            run.status.red(),
            error.kind.yellow(),
            error.message
        ),
        (None, None) => log::warn!("Run {} is {}", run.run_id, run.status),
    }
    Ok(())
}

/// Echo an exported file to stdout
pub fn print_export(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read export: {}", path.display()))?;
    print!("{}", content);
    log::info!("file={}, size={}", path.display(), content.len());
    Ok(())
}

/// List the jobs of the catalog
pub fn list_jobs(catalog: &JobCatalog, json: bool) -> Result<()> {
    if json {
        let out = serde_json::to_string_pretty(catalog.jobs()).context("Failed to serialize jobs")?;
        println!("{}", out);
        return Ok(());
    }

    for spec in catalog.jobs() {
        let sink = match &spec.sink {
            Sink::File { .. } => "file".to_string(),
            Sink::Table { table, .. } => format!("table {}", table),
        };
        let enriched = match &spec.enrichment {
            Some(e) => format!(" enriched from {}", e.lookup_table),
            None => String::new(),
        };
        println!(
            "{}: {} -> {}{}",
            spec.name.green(),
            spec.source_label(),
            sink,
            enriched.bright_black()
        );
    }
    Ok(())
}
