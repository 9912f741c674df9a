//! Terminal rendering of session status lines.

use client_core::SessionEvent;
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::debug;

pub fn render(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::StatusChanged {
            kind,
            message: Some(message),
        } => Some(format!("[{kind}] {message}")),
        _ => None,
    }
}

/// Prints status lines until the session is dropped, draining whatever is
/// still buffered.
pub fn spawn_printer(events: broadcast::Receiver<SessionEvent>) -> JoinHandle<()> {
    tokio::spawn(forward_lines(events, |line| println!("{line}")))
}

async fn forward_lines(
    mut events: broadcast::Receiver<SessionEvent>,
    mut emit: impl FnMut(String),
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if let Some(line) = render(&event) {
                    emit(line);
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "progress: lagged behind session events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
