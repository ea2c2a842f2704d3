//! Job catalog
//!
//! Named job definitions. Two jobs are always present, derived from the
//! process configuration:
//! - `export`: copy `TABLE` to a dated CSV file under `OUTPUT_DIR`
//! - `enrich`: read `ENRICH_SOURCE_TABLE`, enrich each row from the lookup
//!   table and write the result to `ENRICH_SINK_TABLE`
//!
//! More jobs can be declared in a YAML file (`JOBS_FILE`):
//! ```yaml
//! jobs:
//!   - name: failed-orders
//!     source:
//!       type: query
//!       sql: SELECT id, status FROM orders WHERE status = 'failed'
//!     sink:
//!       type: file
//!       quoting: rfc4180
//!   - name: products-to-file
//!     source:
//!       type: table
//!       table: products
//!     enrichment:
//!       lookup_table: loyality_data
//!       key_column: productSku
//!       value_column: loyalityData
//!       key_field: productSku
//!       target_field: productData
//!     sink:
//!       type: file
//! ```

use crate::config::Config;
use crate::database::CommitMode;
use crate::storage::Quoting;
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where a job reads its rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Source {
    Table { table: String },
    /// A job-specific read; file exports are named after the job
    Query { sql: String },
}

/// Lookup applied to every row before it is written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrichment {
    pub lookup_table: String,
    pub key_column: String,
    pub value_column: String,
    pub key_field: String,
    pub target_field: String,
}

/// Where a job writes its rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Sink {
    /// Dated CSV file; directory and quoting default to the configured ones
    File {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dir: Option<PathBuf>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        quoting: Option<Quoting>,
    },
    Table {
        table: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        upsert_key: Option<String>,
        #[serde(default)]
        commit: CommitMode,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub name: String,
    pub source: Source,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<Enrichment>,
    pub sink: Sink,
}

impl JobSpec {
    /// Name used for the run descriptor, the export file and the table lock
    pub fn source_label(&self) -> &str {
        match &self.source {
            Source::Table { table } => table,
            Source::Query { .. } => &self.name,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCatalog {
    #[serde(default)]
    jobs: Vec<JobSpec>,
}

impl JobCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in `export` and `enrich` jobs
    pub fn from_config(config: &Config) -> Self {
        let mut catalog = Self::new();
        catalog.insert(JobSpec {
            name: "export".to_string(),
            source: Source::Table {
                table: config.table.clone(),
            },
            enrichment: None,
            sink: Sink::File {
                dir: None,
                quoting: None,
            },
        });
        catalog.insert(JobSpec {
            name: "enrich".to_string(),
            source: Source::Table {
                table: config.enrich.source_table.clone(),
            },
            enrichment: Some(Enrichment {
                lookup_table: config.lookup.table.clone(),
                key_column: config.lookup.key_column.clone(),
                value_column: config.lookup.value_column.clone(),
                key_field: config.enrich.key_field.clone(),
                target_field: config.enrich.target_field.clone(),
            }),
            sink: Sink::Table {
                table: config.enrich.sink_table.clone(),
                upsert_key: config.enrich.upsert_key.clone(),
                commit: CommitMode::Transactional,
            },
        });
        catalog
    }

    /// Built-in jobs plus those of the configured jobs file
    ///
    /// A job in the file replaces a built-in job of the same name.
    pub fn load(config: &Config) -> Result<Self> {
        let mut catalog = Self::from_config(config);
        if let Some(path) = &config.jobs_file {
            for job in Self::read(path)?.jobs {
                catalog.insert(job);
            }
        }
        Ok(catalog)
    }

    /// Read a catalog from a YAML file
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read jobs file: {}", path.as_ref().display()))?;

        let catalog: Self = serde_yaml::from_str(&content).with_context(|| {
            format!("Failed to parse jobs file: {}", path.as_ref().display())
        })?;

        Ok(catalog)
    }

    /// Add a job, replacing any job with the same name
    pub fn insert(&mut self, job: JobSpec) {
        match self.jobs.iter_mut().find(|j| j.name == job.name) {
            Some(existing) => *existing = job,
            None => self.jobs.push(job),
        }
    }

    pub fn get(&self, name: &str) -> Option<&JobSpec> {
        self.jobs.iter().find(|j| j.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.jobs.iter().map(|j| j.name.as_str()).collect()
    }

    pub fn jobs(&self) -> &[JobSpec] {
        &self.jobs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(extra: &[(&str, &str)]) -> Config {
        let vars: std::collections::HashMap<&str, &str> = [("DATABASE_URL", "sqlite::memory:")]
            .into_iter()
            .chain(extra.iter().copied())
            .collect();
        Config::from_lookup(|name| vars.get(name).map(|v| v.to_string())).unwrap()
    }

    #[test]
    fn test_builtin_jobs() {
        let catalog = JobCatalog::from_config(&config(&[("TABLE", "parcels")]));
        assert_eq!(catalog.names(), vec!["export", "enrich"]);

        let export = catalog.get("export").unwrap();
        assert_eq!(export.source_label(), "parcels");
        assert!(export.enrichment.is_none());

        let enrich = catalog.get("enrich").unwrap();
        assert_eq!(enrich.source_label(), "products");
        let enrichment = enrich.enrichment.as_ref().unwrap();
        assert_eq!(enrichment.lookup_table, "loyality_data");
        assert_eq!(enrichment.value_column, "loyalityData");
        assert!(matches!(&enrich.sink, Sink::Table { table, .. } if table == "products_enriched"));

        assert!(catalog.get("nightly").is_none());
    }

    #[test]
    fn test_read_jobs_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("jobs.yml");
        std::fs::write(
            &path,
            r#"
jobs:
  - name: failed-orders
    source:
      type: query
      sql: SELECT id, status FROM orders WHERE status = 'failed'
    sink:
      type: file
      quoting: rfc4180
  - name: export
    source:
      type: table
      table: shipments_v2
    sink:
      type: table
      table: shipments_archive
      upsert_key: id
"#,
        )
        .unwrap();

        let catalog = JobCatalog::load(&config(&[("JOBS_FILE", path.to_str().unwrap())])).unwrap();
        assert_eq!(catalog.names(), vec!["export", "enrich", "failed-orders"]);

        let failed = catalog.get("failed-orders").unwrap();
        assert_eq!(failed.source_label(), "failed-orders");
        assert_eq!(
            failed.sink,
            Sink::File {
                dir: None,
                quoting: Some(Quoting::Rfc4180)
            }
        );

        let export = catalog.get("export").unwrap();
        assert_eq!(export.source_label(), "shipments_v2");
        assert_eq!(
            export.sink,
            Sink::Table {
                table: "shipments_archive".into(),
                upsert_key: Some("id".into()),
                commit: CommitMode::Transactional,
            }
        );
    }

    #[test]
    fn test_bad_jobs_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("jobs.yml");
        std::fs::write(&path, "jobs:\n  - name: broken\n").unwrap();

        let err = JobCatalog::read(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse jobs file"));
        assert!(JobCatalog::read(temp.path().join("missing.yml")).is_err());
    }
}
