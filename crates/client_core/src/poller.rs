//! Task-status polling shared by the compression and email flows.

use std::time::Duration;

use reqwest::{
    header::{HeaderName, CONTENT_DISPOSITION, CONTENT_TYPE},
    StatusCode,
};
use shared::{
    domain::{TaskId, TaskKind, TaskStatus},
    protocol::{TaskStatusBody, ARCHIVE_CONTENT_TYPE, JSON_CONTENT_TYPE},
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
    backend::BackendClient,
    disposition::archive_filename,
    error::PollError,
    types::{Archive, TaskPayload},
};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
const DEFAULT_MAX_ATTEMPTS: u32 = 60;

/// Retry cadence. The effective timeout is `interval * max_attempts`; there
/// is no wall-clock deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

enum Step {
    Pending,
    Done(TaskPayload),
}

#[derive(Debug, Clone)]
pub struct TaskPoller {
    backend: BackendClient,
    settings: PollSettings,
    default_archive_name: String,
}

impl TaskPoller {
    pub fn new(
        backend: BackendClient,
        settings: PollSettings,
        default_archive_name: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            settings,
            default_archive_name: default_archive_name.into(),
        }
    }

    /// Polls `task_id` until it finishes, fails, or runs out of attempts.
    ///
    /// `active` is the owning flow's current task id. Whenever it stops
    /// naming `task_id` (before a request, after a response, or during the
    /// wait between attempts) the sequence ends with
    /// [`PollError::Superseded`] and whatever the backend said is discarded.
    /// `on_status` receives a progress line after every non-terminal reply.
    pub async fn poll<F>(
        &self,
        kind: TaskKind,
        task_id: &TaskId,
        mut active: watch::Receiver<Option<TaskId>>,
        mut on_status: F,
    ) -> Result<TaskPayload, PollError>
    where
        F: FnMut(String),
    {
        let max_attempts = self.settings.max_attempts;
        let mut attempts = 0;
        info!(%task_id, %kind, max_attempts, "poll: starting");

        loop {
            ensure_active(&active, kind, task_id)?;
            if attempts >= max_attempts {
                warn!(%task_id, %kind, attempts, "poll: attempt ceiling reached");
                return Err(PollError::TimedOut { attempts });
            }
            attempts += 1;

            debug!(%task_id, %kind, attempt = attempts, "poll: checking status");
            let step = self.check_once(task_id).await;
            ensure_active(&active, kind, task_id)?;

            match step {
                Ok(Step::Pending) => {
                    on_status(format!(
                        "processing... (attempt {attempts}/{max_attempts})"
                    ));
                    self.wait_for_retry(&mut active, kind, task_id).await?;
                }
                Ok(Step::Done(payload)) => {
                    info!(%task_id, %kind, attempts, "poll: task completed");
                    return Ok(payload);
                }
                Err(err) => {
                    warn!(%task_id, %kind, attempts, error = %err, "poll: task failed");
                    return Err(err);
                }
            }
        }
    }

    async fn check_once(&self, task_id: &TaskId) -> Result<Step, PollError> {
        let response = self
            .backend
            .task_status(task_id)
            .await
            .map_err(PollError::Network)?;

        let status = response.status();
        let header = |name: HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        let content_type = header(CONTENT_TYPE);
        let disposition = header(CONTENT_DISPOSITION);

        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(PollError::ServerStatus {
                status: status.as_u16(),
                body,
            });
        }

        let media_type = content_type.as_deref().map(str::to_ascii_lowercase);
        match media_type.as_deref() {
            Some(media) if media.contains(ARCHIVE_CONTENT_TYPE) => {
                let bytes = response.bytes().await.map_err(PollError::Network)?;
                let filename = archive_filename(disposition.as_deref(), &self.default_archive_name);
                debug!(%task_id, %filename, len = bytes.len(), "poll: archive received");
                Ok(Step::Done(TaskPayload::Archive(Archive::new(
                    filename,
                    bytes.to_vec(),
                ))))
            }
            Some(media) if media.contains(JSON_CONTENT_TYPE) => {
                let bytes = response.bytes().await.map_err(PollError::Network)?;
                let body = TaskStatusBody::parse(&bytes)?;
                match body.wire_status() {
                    Some(TaskStatus::Pending | TaskStatus::Processing) => Ok(Step::Pending),
                    Some(TaskStatus::Completed) => {
                        Ok(Step::Done(TaskPayload::Result(body.into_payload())))
                    }
                    Some(TaskStatus::Error) => Err(PollError::TaskFailed(
                        body.error.unwrap_or_else(|| "unknown error".to_string()),
                    )),
                    None => Err(PollError::UnknownStatus(
                        body.status.unwrap_or_else(|| "<missing>".to_string()),
                    )),
                }
            }
            _ => Err(PollError::UnexpectedContentType(content_type)),
        }
    }

    async fn wait_for_retry(
        &self,
        active: &mut watch::Receiver<Option<TaskId>>,
        kind: TaskKind,
        task_id: &TaskId,
    ) -> Result<(), PollError> {
        let sleep = tokio::time::sleep(self.settings.interval);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return Ok(()),
                changed = active.changed() => {
                    if changed.is_err() {
                        debug!(%task_id, %kind, "poll: flow dropped, stopping");
                        return Err(PollError::Superseded);
                    }
                    ensure_active(active, kind, task_id)?;
                }
            }
        }
    }
}

fn ensure_active(
    active: &watch::Receiver<Option<TaskId>>,
    kind: TaskKind,
    task_id: &TaskId,
) -> Result<(), PollError> {
    if active.borrow().as_ref() == Some(task_id) {
        return Ok(());
    }
    debug!(%task_id, %kind, "poll: task superseded, dropping sequence");
    Err(PollError::Superseded)
}

#[cfg(test)]
#[path = "tests/poller_tests.rs"]
mod tests;
