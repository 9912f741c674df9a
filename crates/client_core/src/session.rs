use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use shared::{
    domain::{ImageId, TaskId, TaskKind},
    error::ValidationError,
    validation::validate_email_address,
};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::{
    backend::BackendClient,
    error::{FlowError, PollError, SelectionError, SubmitError},
    flow::{ArchiveSummary, FlowSnapshot, FlowState, ImageSummary, SessionEvent, SessionSnapshot},
    poller::{PollSettings, TaskPoller},
    selection::{ImageSelection, SelectedImage},
    types::{Archive, TaskPayload, DEFAULT_ARCHIVE_NAME},
};

const EVENT_CAPACITY: usize = 256;
const DEFAULT_EMAIL_CONFIRMATION: &str = "email sent";

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub poll: PollSettings,
    pub default_archive_name: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            poll: PollSettings::default(),
            default_archive_name: DEFAULT_ARCHIVE_NAME.to_string(),
        }
    }
}

#[derive(Default)]
struct FlowSlot {
    state: FlowState,
    status_message: Option<String>,
    /// Bumped by every submission and invalidation; a submission whose
    /// epoch no longer matches when its reply lands is stale.
    epoch: u64,
}

impl FlowSlot {
    /// Task ids may be reused by the backend, so both must match.
    fn is_current(&self, epoch: u64, task_id: &TaskId) -> bool {
        self.epoch == epoch && self.state.task_id() == Some(task_id)
    }
}

#[derive(Default)]
struct SessionState {
    selection: ImageSelection,
    archive: Option<Archive>,
    email_confirmation: Option<String>,
    compression: FlowSlot,
    email: FlowSlot,
}

impl SessionState {
    fn slot(&self, kind: TaskKind) -> &FlowSlot {
        match kind {
            TaskKind::Compression => &self.compression,
            TaskKind::Email => &self.email,
        }
    }

    fn slot_mut(&mut self, kind: TaskKind) -> &mut FlowSlot {
        match kind {
            TaskKind::Compression => &mut self.compression,
            TaskKind::Email => &mut self.email,
        }
    }
}

/// One user's compression session: the image selection, both flows, the
/// live archive, and the active task id of each flow.
///
/// All operations take `&self`; a front end can run `compress` on a spawned
/// task and call `reset` or `compress` again while it is polling. The state
/// lock is never held across an await.
pub struct CompressorSession {
    backend: BackendClient,
    poller: TaskPoller,
    inner: Mutex<SessionState>,
    compression_task: watch::Sender<Option<TaskId>>,
    email_task: watch::Sender<Option<TaskId>>,
    events: broadcast::Sender<SessionEvent>,
}

impl CompressorSession {
    pub fn new(backend: BackendClient, options: SessionOptions) -> Arc<Self> {
        let poller = TaskPoller::new(backend.clone(), options.poll, options.default_archive_name);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            backend,
            poller,
            inner: Mutex::new(SessionState::default()),
            compression_task: watch::channel(None).0,
            email_task: watch::channel(None).0,
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let st = self.state();
        let flow = |slot: &FlowSlot| FlowSnapshot {
            state: slot.state.clone(),
            status_message: slot.status_message.clone(),
        };
        SessionSnapshot {
            images: st
                .selection
                .iter()
                .map(|image| ImageSummary {
                    id: image.id,
                    name: image.name.clone(),
                    size: image.size,
                })
                .collect(),
            total_bytes: st.selection.total_bytes(),
            compression: flow(&st.compression),
            email: flow(&st.email),
            archive: st.archive.as_ref().map(|archive| ArchiveSummary {
                filename: archive.filename.clone(),
                size: archive.len() as u64,
            }),
            email_confirmation: st.email_confirmation.clone(),
        }
    }

    pub fn flow_state(&self, kind: TaskKind) -> FlowState {
        self.state().slot(kind).state.clone()
    }

    pub fn active_task(&self, kind: TaskKind) -> Option<TaskId> {
        self.task_slot(kind).borrow().clone()
    }

    pub fn archive(&self) -> Option<Archive> {
        self.state().archive.clone()
    }

    pub fn email_confirmation(&self) -> Option<String> {
        self.state().email_confirmation.clone()
    }

    /// Adds images to the selection. Any archive, email result, or running
    /// task belongs to the old selection and is discarded.
    pub fn add_images(&self, images: Vec<SelectedImage>) -> Vec<ImageId> {
        let mut st = self.state();
        let ids = st.selection.extend(images);
        self.discard_results(&mut st);
        info!(added = ids.len(), total = st.selection.len(), "selection: images added");
        ids
    }

    /// Reads every path before touching the selection; one bad file adds
    /// nothing.
    pub async fn load_images<P: AsRef<Path>>(
        &self,
        paths: &[P],
    ) -> Result<Vec<ImageId>, SelectionError> {
        let mut images = Vec::with_capacity(paths.len());
        for path in paths {
            images.push(SelectedImage::from_path(path.as_ref()).await?);
        }
        Ok(self.add_images(images))
    }

    pub fn remove_image(&self, id: ImageId) -> bool {
        let removed = self.state().selection.remove(id).is_some();
        debug!(%id, removed, "selection: remove image");
        removed
    }

    /// Returns to a clean idle session. Safe to call at any time, including
    /// when already idle.
    pub fn reset(&self) {
        let mut st = self.state();
        st.selection.reset();
        self.discard_results(&mut st);
        info!("session: reset");
    }

    /// Submits the current selection and polls until the archive is ready.
    ///
    /// Validation and submission problems come back as `Err` and leave the
    /// flow idle. Once the backend has accepted the job, failures are flow
    /// outcomes: the returned state is `Failed` or `TimedOut`.
    pub async fn compress(&self) -> Result<FlowState, FlowError> {
        let kind = TaskKind::Compression;
        let (epoch, images) = {
            let mut st = self.state();
            if st.selection.is_empty() {
                return Err(ValidationError::NoImagesSelected.into());
            }
            st.archive = None;
            st.email_confirmation = None;
            self.invalidate(&mut st, TaskKind::Email);
            let epoch = self.begin_submission(&mut st, kind, "preparing compression...");
            (epoch, st.selection.iter().cloned().collect::<Vec<_>>())
        };

        info!(images = images.len(), "compress: submitting");
        let submitted = self.backend.submit_compression(&images).await;
        let task_id = self.accept_submission(
            kind,
            epoch,
            submitted,
            "compression accepted, waiting for the result...",
        )?;
        let outcome = self.poll(kind, epoch, &task_id).await;
        self.finish(kind, epoch, &task_id, outcome, |st, payload| match payload {
            TaskPayload::Archive(archive) => {
                let message = format!("compression complete: {}", archive.filename);
                st.archive = Some(archive);
                Ok(message)
            }
            TaskPayload::Result(_) => Err("compression completed without an archive".to_string()),
        })
    }

    /// Mails the current archive to `address` through the backend.
    pub async fn send_email(&self, address: &str) -> Result<FlowState, FlowError> {
        let kind = TaskKind::Email;
        let (epoch, archive) = {
            let mut st = self.state();
            let archive = match (&st.compression.state, &st.archive) {
                (FlowState::Succeeded, Some(archive)) => archive.clone(),
                _ => return Err(ValidationError::MissingArchive.into()),
            };
            validate_email_address(address)?;
            st.email_confirmation = None;
            let epoch = self.begin_submission(&mut st, kind, "preparing email...");
            (epoch, archive)
        };

        info!(filename = %archive.filename, "email: submitting");
        let submitted = self.backend.submit_email(&archive, address.trim()).await;
        let task_id = self.accept_submission(
            kind,
            epoch,
            submitted,
            "email accepted, waiting for delivery...",
        )?;
        let outcome = self.poll(kind, epoch, &task_id).await;
        self.finish(kind, epoch, &task_id, outcome, |st, payload| match payload {
            TaskPayload::Result(result) => {
                let message = result
                    .get("message")
                    .and_then(|value| value.as_str())
                    .unwrap_or(DEFAULT_EMAIL_CONFIRMATION)
                    .to_string();
                st.email_confirmation = Some(message.clone());
                Ok(message)
            }
            TaskPayload::Archive(_) => {
                Err("email task answered with an archive instead of a confirmation".to_string())
            }
        })
    }

    /// Writes the archive to `dest`, or into `dest` under the archive's own
    /// name when `dest` is a directory.
    pub async fn save_archive(&self, dest: impl AsRef<Path>) -> Result<PathBuf, FlowError> {
        let archive = self.archive().ok_or(ValidationError::MissingArchive)?;
        let dest = dest.as_ref();
        let path = match tokio::fs::metadata(dest).await {
            Ok(meta) if meta.is_dir() => dest.join(archive.safe_filename()),
            _ => dest.to_path_buf(),
        };
        tokio::fs::write(&path, &archive.bytes)
            .await
            .map_err(|source| FlowError::Save {
                path: path.clone(),
                source,
            })?;
        info!(path = %path.display(), bytes = archive.len(), "download: archive saved");
        Ok(path)
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn task_slot(&self, kind: TaskKind) -> &watch::Sender<Option<TaskId>> {
        match kind {
            TaskKind::Compression => &self.compression_task,
            TaskKind::Email => &self.email_task,
        }
    }

    fn set_flow(&self, st: &mut SessionState, kind: TaskKind, state: FlowState) {
        let slot = st.slot_mut(kind);
        if slot.state == state {
            return;
        }
        slot.state = state.clone();
        let _ = self.events.send(SessionEvent::FlowChanged { kind, state });
    }

    fn set_status(&self, st: &mut SessionState, kind: TaskKind, message: Option<String>) {
        let slot = st.slot_mut(kind);
        if slot.status_message == message {
            return;
        }
        slot.status_message = message.clone();
        let _ = self.events.send(SessionEvent::StatusChanged { kind, message });
    }

    fn clear_active_task(&self, kind: TaskKind) {
        self.task_slot(kind)
            .send_if_modified(|current| current.take().is_some());
    }

    /// Cancels whatever `kind` is doing and returns it to idle.
    fn invalidate(&self, st: &mut SessionState, kind: TaskKind) {
        st.slot_mut(kind).epoch += 1;
        self.clear_active_task(kind);
        self.set_flow(st, kind, FlowState::Idle);
        self.set_status(st, kind, None);
    }

    fn discard_results(&self, st: &mut SessionState) {
        st.archive = None;
        st.email_confirmation = None;
        self.invalidate(st, TaskKind::Compression);
        self.invalidate(st, TaskKind::Email);
    }

    fn begin_submission(&self, st: &mut SessionState, kind: TaskKind, status: &str) -> u64 {
        let slot = st.slot_mut(kind);
        slot.epoch += 1;
        let epoch = slot.epoch;
        self.clear_active_task(kind);
        self.set_flow(st, kind, FlowState::Submitting);
        self.set_status(st, kind, Some(status.to_string()));
        epoch
    }

    fn accept_submission(
        &self,
        kind: TaskKind,
        epoch: u64,
        submitted: Result<TaskId, SubmitError>,
        status: &str,
    ) -> Result<TaskId, FlowError> {
        let mut st = self.state();
        if st.slot(kind).epoch != epoch {
            debug!(%kind, "flow: submission reply arrived after the flow moved on, discarding");
            return Err(FlowError::Superseded);
        }

        match submitted {
            Ok(task_id) => {
                info!(%kind, %task_id, "flow: submission accepted");
                self.set_flow(
                    &mut st,
                    kind,
                    FlowState::AwaitingResult {
                        task_id: task_id.clone(),
                    },
                );
                self.set_status(&mut st, kind, Some(status.to_string()));
                self.task_slot(kind).send_replace(Some(task_id.clone()));
                Ok(task_id)
            }
            Err(err) => {
                warn!(%kind, error = %err, "flow: submission failed");
                self.clear_active_task(kind);
                self.set_flow(&mut st, kind, FlowState::Idle);
                self.set_status(&mut st, kind, None);
                Err(err.into())
            }
        }
    }

    async fn poll(
        &self,
        kind: TaskKind,
        epoch: u64,
        task_id: &TaskId,
    ) -> Result<TaskPayload, PollError> {
        let active = self.task_slot(kind).subscribe();
        self.poller
            .poll(kind, task_id, active, |message| {
                let mut st = self.state();
                if st.slot(kind).is_current(epoch, task_id) {
                    self.set_status(&mut st, kind, Some(message));
                }
            })
            .await
    }

    fn finish<F>(
        &self,
        kind: TaskKind,
        epoch: u64,
        task_id: &TaskId,
        outcome: Result<TaskPayload, PollError>,
        apply: F,
    ) -> Result<FlowState, FlowError>
    where
        F: FnOnce(&mut SessionState, TaskPayload) -> Result<String, String>,
    {
        if matches!(outcome, Err(PollError::Superseded)) {
            return Err(FlowError::Superseded);
        }
        let mut st = self.state();
        if !st.slot(kind).is_current(epoch, task_id) {
            debug!(%kind, %task_id, "flow: poll outcome for a stale task, discarding");
            return Err(FlowError::Superseded);
        }
        self.clear_active_task(kind);

        let (state, status) = match outcome {
            Ok(payload) => match apply(&mut st, payload) {
                Ok(message) => (FlowState::Succeeded, message),
                Err(reason) => (
                    FlowState::Failed {
                        reason: reason.clone(),
                    },
                    format!("{kind} failed: {reason}"),
                ),
            },
            Err(PollError::TimedOut { attempts }) => (
                FlowState::TimedOut,
                format!("{kind} timed out after {attempts} status checks; please try again later"),
            ),
            Err(err) => (
                FlowState::Failed {
                    reason: err.to_string(),
                },
                format!("{kind} failed: {err}"),
            ),
        };

        info!(%kind, %task_id, state = ?state, "flow: finished");
        self.set_flow(&mut st, kind, state.clone());
        self.set_status(&mut st, kind, Some(status));
        Ok(state)
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
