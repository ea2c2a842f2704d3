//! Process configuration
//!
//! Built once at startup from environment variables (optionally sourced from a
//! dotenv file) and passed explicitly to whatever needs it. Nothing below the
//! CLI reads the environment.
//!
//! Expected environment variables:
//! - DATABASE_URL: source connection string, or all of PGHOST, PGDATABASE,
//!   PGUSER and PGPASSWORD (PGPORT defaults to 5432)
//! - TABLE: table exported by the `export` job (default `shipments`)
//! - OUTPUT_DIR: directory for exported files (default `/data`)
//! - CSV_QUOTING: `never` or `rfc4180` (default `never`)
//! - CONNECT_TIMEOUT_SECS, RUN_DEADLINE_SECS, BATCH_SIZE
//! - CONCURRENCY_POLICY: `queue` or `reject` (default `queue`)
//! - LOOKUP_TABLE, LOOKUP_KEY_COLUMN, LOOKUP_VALUE_COLUMN
//! - ENRICH_KEY_FIELD, ENRICH_TARGET_FIELD, ENRICH_SOURCE_TABLE,
//!   ENRICH_SINK_TABLE, ENRICH_UPSERT_KEY
//! - JOBS_FILE: optional YAML file with additional jobs

use crate::client::Auth;
use crate::job::ConcurrencyPolicy;
use crate::storage::Quoting;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing configuration: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("invalid {name}='{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Where the auxiliary lookup values come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupConfig {
    pub table: String,
    pub key_column: String,
    pub value_column: String,
}

/// Settings of the built-in `enrich` job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichConfig {
    pub key_field: String,
    pub target_field: String,
    pub source_table: String,
    pub sink_table: String,
    pub upsert_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub auth: Auth,
    pub table: String,
    pub output_dir: PathBuf,
    pub quoting: Quoting,
    pub connect_timeout: Duration,
    pub run_deadline: Option<Duration>,
    pub batch_size: usize,
    pub concurrency: ConcurrencyPolicy,
    pub lookup: LookupConfig,
    pub enrich: EnrichConfig,
    pub jobs_file: Option<PathBuf>,
}

impl Config {
    /// Read the configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from any variable source
    ///
    /// Every missing required variable is reported at once.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let (database_url, auth) = match var("DATABASE_URL") {
            Some(url) => (url, Auth::new(var("PGUSER"), var("PGPASSWORD"))),
            None => {
                let required = ["PGHOST", "PGDATABASE", "PGUSER", "PGPASSWORD"];
                let missing = required
                    .into_iter()
                    .filter(|name| var(*name).is_none())
                    .collect::<Vec<_>>();
                if !missing.is_empty() {
                    return Err(ConfigError::Missing(
                        std::iter::once("DATABASE_URL").chain(missing).collect(),
                    ));
                }

                let port: u16 = parse(&var, "PGPORT", 5432)?;
                let url = format!(
                    "postgres://{}:{}/{}",
                    var("PGHOST").unwrap_or_default(),
                    port,
                    var("PGDATABASE").unwrap_or_default()
                );
                (url, Auth::new(var("PGUSER"), var("PGPASSWORD")))
            }
        };

        let batch_size: usize = parse(&var, "BATCH_SIZE", 100)?;
        if batch_size == 0 {
            return Err(ConfigError::Invalid {
                name: "BATCH_SIZE",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let run_deadline = match var("RUN_DEADLINE_SECS") {
            Some(_) => Some(Duration::from_secs(parse(&var, "RUN_DEADLINE_SECS", 0)?)),
            None => None,
        };

        Ok(Self {
            database_url,
            auth,
            table: var("TABLE").unwrap_or_else(|| "shipments".to_string()),
            output_dir: var("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/data")),
            quoting: parse(&var, "CSV_QUOTING", Quoting::Never)?,
            connect_timeout: Duration::from_secs(parse(&var, "CONNECT_TIMEOUT_SECS", 10)?),
            run_deadline,
            batch_size,
            concurrency: parse(&var, "CONCURRENCY_POLICY", ConcurrencyPolicy::Queue)?,
            lookup: LookupConfig {
                table: var("LOOKUP_TABLE").unwrap_or_else(|| "loyality_data".to_string()),
                key_column: var("LOOKUP_KEY_COLUMN").unwrap_or_else(|| "productSku".to_string()),
                value_column: var("LOOKUP_VALUE_COLUMN")
                    .unwrap_or_else(|| "loyalityData".to_string()),
            },
            enrich: EnrichConfig {
                key_field: var("ENRICH_KEY_FIELD").unwrap_or_else(|| "productSku".to_string()),
                target_field: var("ENRICH_TARGET_FIELD")
                    .unwrap_or_else(|| "productData".to_string()),
                source_table: var("ENRICH_SOURCE_TABLE").unwrap_or_else(|| "products".to_string()),
                sink_table: var("ENRICH_SINK_TABLE")
                    .unwrap_or_else(|| "products_enriched".to_string()),
                upsert_key: var("ENRICH_UPSERT_KEY"),
            },
            jobs_file: var("JOBS_FILE").map(PathBuf::from),
        })
    }
}

fn parse<T, F>(var: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
            value,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = from_pairs(&[("DATABASE_URL", "sqlite:///tmp/source.db")]).unwrap();

        assert_eq!(config.database_url, "sqlite:///tmp/source.db");
        assert_eq!(config.auth, Auth::None);
        assert_eq!(config.table, "shipments");
        assert_eq!(config.output_dir, PathBuf::from("/data"));
        assert_eq!(config.quoting, Quoting::Never);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.run_deadline, None);
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.concurrency, ConcurrencyPolicy::Queue);
        assert_eq!(config.lookup.table, "loyality_data");
        assert_eq!(config.enrich.target_field, "productData");
        assert_eq!(config.enrich.upsert_key, None);
        assert_eq!(config.jobs_file, None);
    }

    #[test]
    fn test_postgres_parts() {
        let config = from_pairs(&[
            ("PGHOST", "db.internal"),
            ("PGDATABASE", "warehouse"),
            ("PGUSER", "etl"),
            ("PGPASSWORD", "s3cret"),
        ])
        .unwrap();

        assert_eq!(config.database_url, "postgres://db.internal:5432/warehouse");
        assert_eq!(
            config.auth,
            Auth::Password("etl".to_string(), "s3cret".to_string())
        );
    }

    #[test]
    fn test_missing_reported_together() {
        let err = from_pairs(&[("PGHOST", "db.internal"), ("PGUSER", "")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Missing(vec!["DATABASE_URL", "PGDATABASE", "PGUSER", "PGPASSWORD"])
        );
        assert!(err.to_string().contains("PGPASSWORD"));
    }

    #[test]
    fn test_invalid_values() {
        let base = ("DATABASE_URL", "sqlite::memory:");

        let err = from_pairs(&[base, ("BATCH_SIZE", "lots")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "BATCH_SIZE", .. }));

        let err = from_pairs(&[base, ("BATCH_SIZE", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "BATCH_SIZE", .. }));

        let err = from_pairs(&[base, ("CSV_QUOTING", "sometimes")]).unwrap_err();
        assert!(err.to_string().contains("CSV_QUOTING"));
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            ("DATABASE_URL", "postgres://localhost/warehouse"),
            ("TABLE", "orders"),
            ("OUTPUT_DIR", "/tmp/out"),
            ("CSV_QUOTING", "rfc4180"),
            ("RUN_DEADLINE_SECS", "30"),
            ("CONCURRENCY_POLICY", "reject"),
            ("ENRICH_UPSERT_KEY", "productId"),
            ("JOBS_FILE", "jobs.yml"),
        ])
        .unwrap();

        assert_eq!(config.table, "orders");
        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.quoting, Quoting::Rfc4180);
        assert_eq!(config.run_deadline, Some(Duration::from_secs(30)));
        assert_eq!(config.concurrency, ConcurrencyPolicy::Reject);
        assert_eq!(config.enrich.upsert_key.as_deref(), Some("productId"));
        assert_eq!(config.jobs_file, Some(PathBuf::from("jobs.yml")));
    }

    #[test]
    #[serial_test::serial]
    fn test_from_env() {
        unsafe {
            std::env::set_var("DATABASE_URL", "sqlite:///tmp/env.db");
            std::env::set_var("TABLE", "parcels");
        }

        let config = Config::from_env().unwrap();
        assert_eq!(config.database_url, "sqlite:///tmp/env.db");
        assert_eq!(config.table, "parcels");

        unsafe {
            std::env::remove_var("DATABASE_URL");
            std::env::remove_var("TABLE");
        }
    }
}
