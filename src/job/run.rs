//! Run identity and lifecycle

use crate::error::{ErrorKind, PipelineError};
use crate::etl::ExportArtifact;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Unique identifier of one pipeline run
///
/// Format: `<UTC yyyymmddTHHMMSSmmm>-<sequence>-<random>`. The process-wide
/// sequence keeps ids distinct even when two triggers land on the same
/// millisecond; the random suffix keeps them distinct across processes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn generate() -> Self {
        let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let random = uuid::Uuid::new_v4().simple().to_string();
        Self(format!(
            "{}-{:04}-{}",
            Utc::now().format("%Y%m%dT%H%M%S%3f"),
            sequence,
            &random[..8]
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RunId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
        };
        write!(f, "{}", name)
    }
}

/// Why a run failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&PipelineError> for RunError {
    fn from(err: &PipelineError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Observable record of one run
///
/// Starts `Running`; the first transition to `Succeeded` or `Failed` is final
/// and later transitions are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDescriptor {
    pub run_id: RunId,
    pub job: String,
    pub source_table: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ExportArtifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RunError>,
}

impl RunDescriptor {
    pub fn start(run_id: RunId, job: impl Into<String>, source_table: impl Into<String>) -> Self {
        Self {
            run_id,
            job: job.into(),
            source_table: source_table.into(),
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Running,
            artifact: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status != RunStatus::Running
    }

    /// Returns false if the run had already finished
    pub fn succeed(&mut self, artifact: ExportArtifact) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = RunStatus::Succeeded;
        self.artifact = Some(artifact);
        self.finished_at = Some(Utc::now());
        true
    }

    /// Returns false if the run had already finished
    pub fn fail(&mut self, error: RunError) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = RunStatus::Failed;
        self.error = Some(error);
        self.finished_at = Some(Utc::now());
        true
    }
}
