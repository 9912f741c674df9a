use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a failure should be surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Rejected before any network call; shown inline.
    Validation,
    /// The backend refused a job; shown as a blocking alert.
    Submission,
    /// A running job ended badly; shown as the flow's status.
    Polling,
    /// Access recording or statistics; logged only.
    Telemetry,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no images selected for compression")]
    NoImagesSelected,
    #[error("`{name}` is not an image file")]
    NotAnImage { name: String },
    #[error("no compressed archive available")]
    MissingArchive,
    #[error("a destination email address is required")]
    MissingAddress,
    #[error("`{address}` is not a valid email address")]
    InvalidAddress { address: String },
}

impl ValidationError {
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::Validation
    }
}
