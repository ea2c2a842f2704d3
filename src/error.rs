//! Error taxonomy for pipeline runs
//!
//! Every failure a run can hit is a [`PipelineError`]. The orchestrator turns
//! these into a failed run descriptor carrying the [`ErrorKind`] and message.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

/// Failure to open a connection to the relational source
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectError {
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("source unreachable: {0}")]
    Unreachable(String),

    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid connection string: {0}")]
    InvalidDsn(String),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("read failed: {0}")]
    Read(String),

    #[error("transform failed: {0}")]
    Transform(String),

    #[error("write failed: {0}")]
    Write(String),

    #[error("schema changed mid-run: expected [{expected}], got [{actual}]")]
    SchemaMismatch { expected: String, actual: String },

    #[error("run deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    #[error("run cancelled")]
    Cancelled,

    #[error("a run for '{0}' is already in progress")]
    AlreadyRunning(String),
}

impl PipelineError {
    pub fn read(message: impl std::fmt::Display) -> Self {
        Self::Read(message.to_string())
    }

    pub fn transform(message: impl std::fmt::Display) -> Self {
        Self::Transform(message.to_string())
    }

    pub fn write(message: impl std::fmt::Display) -> Self {
        Self::Write(message.to_string())
    }

    /// The coarse error class reported on a failed run
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connect(_) => ErrorKind::ConnectError,
            Self::Read(_) => ErrorKind::ReadError,
            Self::Transform(_) => ErrorKind::TransformError,
            Self::Write(_) | Self::SchemaMismatch { .. } => ErrorKind::WriteError,
            Self::DeadlineExceeded(_) => ErrorKind::DeadlineExceeded,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::AlreadyRunning(_) => ErrorKind::AlreadyRunning,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    ConnectError,
    ReadError,
    TransformError,
    WriteError,
    DeadlineExceeded,
    Cancelled,
    AlreadyRunning,
    /// The run task panicked
    Aborted,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ConnectError => "ConnectError",
            Self::ReadError => "ReadError",
            Self::TransformError => "TransformError",
            Self::WriteError => "WriteError",
            Self::DeadlineExceeded => "DeadlineExceeded",
            Self::Cancelled => "Cancelled",
            Self::AlreadyRunning => "AlreadyRunning",
            Self::Aborted => "Aborted",
        };
        write!(f, "{}", name)
    }
}
