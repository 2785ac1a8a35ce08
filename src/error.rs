// Crate-wide error type.

//! Controllers and the scheduler are the only layers allowed to propagate
//! errors outward; executors (Workflow, Network) catch everything and fold
//! it into their result types instead of propagating it.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("unknown kind: {0}")]
    UnknownKind(String),

    #[error("dangling reference: {0}")]
    DanglingReference(String),

    #[error("circular reference detected: {0}")]
    CircularReference(String),

    #[error("dependency resolution failed: {0}")]
    DependencyResolutionFailed(String),

    #[error("state retrieval failed: {0}")]
    StateRetrievalFailed(String),

    #[error("update failed: {0}")]
    UpdateFailed(String),

    #[error("reconciliation failed: {0}")]
    ReconciliationFailed(String),

    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("queue full")]
    QueueFull,

    #[error("cancelled")]
    Cancelled,

    #[error("timeout")]
    Timeout,

    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("step not found: {0}")]
    StepNotFound(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("hook failed: {0}")]
    HookFailed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Transient-vs-permanent classification used by the controller retry
    /// strategy.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Timeout | Error::Conflict(_) | Error::QueueFull | Error::StateRetrievalFailed(_)
        )
    }

    /// `FATAL|CRITICAL|UNRECOVERABLE` message match, or an explicit
    /// `isCritical` carrier — here, variants that can never be retried away.
    pub fn is_critical(&self) -> bool {
        let msg = self.to_string();
        msg.contains("FATAL") || msg.contains("CRITICAL") || msg.contains("UNRECOVERABLE")
    }
}

pub type Result<T> = std::result::Result<T, Error>;
