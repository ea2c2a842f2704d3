//! In-process run registry
//!
//! Keeps every run descriptor for status polling and serialises runs that
//! touch the same table.

use super::run::{RunDescriptor, RunId};
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;

/// What a trigger does while another run holds its table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcurrencyPolicy {
    /// Wait for the running job to finish
    #[default]
    Queue,
    /// Fail at once with `AlreadyRunning`
    Reject,
}

impl FromStr for ConcurrencyPolicy {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "queue" => Ok(Self::Queue),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown policy '{}', expected queue or reject", other)),
        }
    }
}

/// Exclusive hold on a table for the lifetime of one run
#[derive(Debug)]
pub struct TableGuard {
    table: String,
    _guard: OwnedMutexGuard<()>,
}

impl TableGuard {
    pub fn table(&self) -> &str {
        &self.table
    }
}

#[derive(Debug, Default)]
pub struct RunRegistry {
    policy: ConcurrencyPolicy,
    runs: Mutex<HashMap<RunId, RunDescriptor>>,
    tables: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl RunRegistry {
    pub fn new(policy: ConcurrencyPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn policy(&self) -> ConcurrencyPolicy {
        self.policy
    }

    /// Insert or replace the descriptor of a run
    pub fn store(&self, descriptor: RunDescriptor) {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(descriptor.run_id.clone(), descriptor);
    }

    pub fn get(&self, run_id: &RunId) -> Option<RunDescriptor> {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(run_id)
            .cloned()
    }

    /// All known runs, oldest first
    pub fn list(&self) -> Vec<RunDescriptor> {
        let mut runs: Vec<_> = self
            .runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        runs.sort_by(|a, b| a.run_id.cmp(&b.run_id));
        runs
    }

    /// Take the table for a run, waiting or failing per the policy
    pub async fn acquire(&self, table: &str) -> Result<TableGuard> {
        let lock = {
            let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(tables.entry(table.to_string()).or_default())
        };

        let guard = match self.policy {
            ConcurrencyPolicy::Queue => {
                if lock.try_lock().is_err() {
                    log::info!("Waiting for the running job on {}", table);
                }
                lock.lock_owned().await
            }
            ConcurrencyPolicy::Reject => lock
                .try_lock_owned()
                .map_err(|_| PipelineError::AlreadyRunning(table.to_string()))?,
        };

        Ok(TableGuard {
            table: table.to_string(),
            _guard: guard,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_reject_policy() {
        let registry = RunRegistry::new(ConcurrencyPolicy::Reject);
        let first = registry.acquire("shipments").await.unwrap();
        assert_eq!(first.table(), "shipments");

        let err = registry.acquire("shipments").await.unwrap_err();
        assert!(matches!(err, PipelineError::AlreadyRunning(ref t) if t == "shipments"));

        // Other tables are independent
        assert!(registry.acquire("orders").await.is_ok());

        drop(first);
        assert!(registry.acquire("shipments").await.is_ok());
    }

    #[tokio::test]
    async fn test_queue_policy_waits() {
        let registry = Arc::new(RunRegistry::new(ConcurrencyPolicy::Queue));
        let first = registry.acquire("shipments").await.unwrap();

        let waiting = tokio::spawn({
            let registry = Arc::clone(&registry);
            async move { registry.acquire("shipments").await.map(|_| ()) }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiting.is_finished());

        drop(first);
        tokio::time::timeout(Duration::from_secs(5), waiting)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_store_and_list() {
        let registry = RunRegistry::default();
        let first = RunDescriptor::start(RunId::generate(), "export", "shipments");
        let second = RunDescriptor::start(RunId::generate(), "enrich", "products");
        registry.store(second.clone());
        registry.store(first.clone());

        assert_eq!(registry.get(&first.run_id), Some(first.clone()));
        assert_eq!(registry.get(&RunId::from("missing")), None);
        assert_eq!(registry.list(), vec![first, second]);
    }

    #[test]
    fn test_parse_policy() {
        assert_eq!("Queue".parse::<ConcurrencyPolicy>().unwrap(), ConcurrencyPolicy::Queue);
        assert_eq!("reject".parse::<ConcurrencyPolicy>().unwrap(), ConcurrencyPolicy::Reject);
        assert!("drop".parse::<ConcurrencyPolicy>().is_err());
    }
}
