use thiserror::Error;

use crate::job::JobStatus;

/// Errors surfaced by the direct-access service and its components.
///
/// Variants that map to a documented API error carry the fixed error code
/// returned by [`DaaError::code`], so the boundary layer can translate
/// without matching on variants.
#[derive(Error, Debug)]
pub enum DaaError {
    #[error("Backend {0} not found.")]
    BackendNotFound(String),

    #[error("Job not found. Job ID: {0}.")]
    JobNotFound(String),

    #[error("Job with duplicate id already exists. Job ID: {0}")]
    DuplicateJob(String),

    #[error("Job is not cancellable. Job ID: {0}.")]
    JobNotCancellable(String),

    #[error("Deleting a job in a non-terminal state is not possible. Job ID: {0}.")]
    JobNotTerminal(String),

    #[error("{message}")]
    InvalidInput { message: String, value: String },

    #[error("The maximum number of execution lanes for backend {0} has been reached.")]
    ExecutionLanesLimitReached(String),

    /// Optimistic-concurrency check failed on a job status transition.
    #[error("status is not expected: id={id}, status={actual}, expected={expected}")]
    UnexpectedStatus {
        id: String,
        actual: JobStatus,
        expected: JobStatus,
    },

    #[error("service inactive")]
    ServiceNotAvailable,

    #[error("storage transfer failed: {0}")]
    StorageTransfer(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("worker error: {0}")]
    Worker(String),
}

impl DaaError {
    /// Fixed API error code for this error, if it has one.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            DaaError::BackendNotFound(_) => Some("1216"),
            DaaError::JobNotFound(_) => Some("1291"),
            DaaError::DuplicateJob(_) => Some("1231"),
            DaaError::JobNotCancellable(_) => Some("1306"),
            DaaError::JobNotTerminal(_) => Some("1337"),
            DaaError::InvalidInput { .. } => Some("1337"),
            DaaError::ExecutionLanesLimitReached(_) => Some("1232"),
            _ => None,
        }
    }

    pub fn invalid_input(message: impl Into<String>, value: impl Into<String>) -> Self {
        DaaError::InvalidInput {
            message: message.into(),
            value: value.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DaaError>;
