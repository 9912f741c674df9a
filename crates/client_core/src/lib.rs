//! Client core for the image compression backend: image selection, job
//! submission, task-status polling, and the session that ties the
//! compression and email flows together.

pub mod backend;
pub mod disposition;
pub mod error;
pub mod flow;
pub mod poller;
pub mod selection;
pub mod session;
pub mod telemetry;
pub mod types;

pub use backend::BackendClient;
pub use error::{ConfigError, FlowError, PollError, SelectionError, StatsError, SubmitError};
pub use flow::{
    ArchiveSummary, FlowSnapshot, FlowState, ImageSummary, SessionEvent, SessionSnapshot,
};
pub use poller::{PollSettings, TaskPoller};
pub use selection::{ImageSelection, SelectedImage};
pub use session::{CompressorSession, SessionOptions};
pub use telemetry::spawn_access_record;
pub use types::{Archive, TaskPayload, DEFAULT_ARCHIVE_NAME};

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;
