//! Flow states and the views of them handed to front ends.

use shared::domain::{ImageId, TaskId, TaskKind};

/// Where a compression or email flow currently is.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FlowState {
    #[default]
    Idle,
    Submitting,
    AwaitingResult {
        task_id: TaskId,
    },
    Succeeded,
    Failed {
        reason: String,
    },
    TimedOut,
}

impl FlowState {
    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            FlowState::AwaitingResult { task_id } => Some(task_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    FlowChanged {
        kind: TaskKind,
        state: FlowState,
    },
    StatusChanged {
        kind: TaskKind,
        message: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FlowSnapshot {
    pub state: FlowState,
    pub status_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSummary {
    pub id: ImageId,
    pub name: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub filename: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub images: Vec<ImageSummary>,
    pub total_bytes: u64,
    pub compression: FlowSnapshot,
    pub email: FlowSnapshot,
    pub archive: Option<ArchiveSummary>,
    pub email_confirmation: Option<String>,
}
