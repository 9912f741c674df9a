use std::path::PathBuf;

use shared::error::{ErrorCategory, ValidationError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid backend url `{url}`: {reason}")]
    InvalidBackendUrl { url: String, reason: String },
}

impl ConfigError {
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::Validation
    }
}

/// Failure to get a job accepted by the backend.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("malformed accept response: {0}")]
    MalformedAccept(String),
}

/// Terminal outcome of a polling sequence other than success.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("network error while checking task status: {0}")]
    Network(#[source] reqwest::Error),
    #[error("server error: {status} {body}")]
    ServerStatus { status: u16, body: String },
    #[error("unexpected response content type: {}", .0.as_deref().unwrap_or("<none>"))]
    UnexpectedContentType(Option<String>),
    #[error("malformed status payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
    #[error("unexpected task status `{0}`")]
    UnknownStatus(String),
    #[error("task failed: {0}")]
    TaskFailed(String),
    #[error("timed out after {attempts} status checks")]
    TimedOut { attempts: u32 },
    /// The flow moved on to another task id or was reset. Never surfaced.
    #[error("superseded by a newer task")]
    Superseded,
}

#[derive(Debug, Error)]
pub enum FlowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("submission failed: {0}")]
    Submission(#[source] SubmitError),
    #[error("superseded by a newer submission or a reset")]
    Superseded,
    #[error("failed to save archive to '{}': {source}", path.display())]
    Save {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl FlowError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            FlowError::Validation(_) => ErrorCategory::Validation,
            FlowError::Submission(_) | FlowError::Save { .. } => ErrorCategory::Submission,
            FlowError::Superseded => ErrorCategory::Polling,
        }
    }
}

impl From<SubmitError> for FlowError {
    fn from(value: SubmitError) -> Self {
        match value {
            SubmitError::Validation(err) => FlowError::Validation(err),
            other => FlowError::Submission(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("failed to read image '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl SelectionError {
    /// An unreadable file is the user's input problem, like a wrong type.
    pub fn category(&self) -> ErrorCategory {
        match self {
            SelectionError::Validation(err) => err.category(),
            SelectionError::Read { .. } => ErrorCategory::Validation,
        }
    }
}

/// Usage-statistics fetch failures. Shape problems inside a valid JSON
/// document are not errors; they degrade to an empty series.
#[derive(Debug, Error)]
pub enum StatsError {
    #[error("failed to fetch usage statistics: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("usage statistics request returned status {status}")]
    Status { status: u16 },
    #[error("usage statistics response is not JSON: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl StatsError {
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::Telemetry
    }
}
