use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::core::permissions::Capability;

/// Failure of a single external command run through the gateway.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("failed to spawn {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} timed out after {timeout:?} and was killed")]
    TimedOut { program: String, timeout: Duration },

    #[error("{program} exited with status {code:?} and no output: {stderr}")]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    /// Recoverable: output was decoded lossily. Logged, never returned.
    #[error("{program} produced invalid UTF-8; replacement characters substituted")]
    NonUtf8Truncated { program: String },
}

impl ExecutionError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ExecutionError::TimedOut { .. })
    }
}

/// Failure of a user-initiated action. Always returned to the caller.
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("permission required: {0}")]
    PermissionDenied(Capability),

    #[error("action timed out")]
    ExecutionTimedOut,

    #[error("user declined the administrator prompt")]
    UserDeclinedElevation,

    #[error("process {0} is protected and cannot be terminated")]
    Protected(u32),

    #[error("invalid process id: {0}")]
    InvalidPid(u32),

    #[error("cache cleaning failed: {0}")]
    Cleanup(String),

    #[error(transparent)]
    Execution(ExecutionError),
}

impl From<ExecutionError> for ActionError {
    fn from(err: ExecutionError) -> Self {
        match err {
            ExecutionError::TimedOut { .. } => ActionError::ExecutionTimedOut,
            other => ActionError::Execution(other),
        }
    }
}

/// Failure inside the permission gate or its persistence.
#[derive(Error, Debug)]
pub enum PermissionError {
    #[error("invalid automation target: {0:?}")]
    InvalidTarget(String),

    #[error("permission probe failed: {0}")]
    Probe(#[from] ExecutionError),
}

/// Crate-wide error type
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("Sampling failed: {0}")]
    Sampling(String),
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, MonitorError>;

impl MonitorError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        MonitorError::Config(msg.into())
    }

    pub fn sampling<S: Into<String>>(msg: S) -> Self {
        MonitorError::Sampling(msg.into())
    }
}
