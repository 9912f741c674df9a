//! Scripted in-process backend used by the HTTP-facing tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    extract::{Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use crate::{backend::BackendClient, poller::PollSettings, session::SessionOptions};

#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Json(StatusCode, Value),
    Archive {
        disposition: Option<String>,
        body: Vec<u8>,
    },
    Raw {
        status: StatusCode,
        content_type: &'static str,
        body: String,
    },
}

impl Reply {
    pub fn accepted(task_id: &str) -> Self {
        Reply::Json(
            StatusCode::ACCEPTED,
            json!({"message": "accepted", "task_id": task_id}),
        )
    }

    pub fn status(status: &str) -> Self {
        Reply::Json(StatusCode::OK, json!({ "status": status }))
    }

    pub fn archive(disposition: Option<&str>, body: &[u8]) -> Self {
        Reply::Archive {
            disposition: disposition.map(str::to_string),
            body: body.to_vec(),
        }
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        match self {
            Reply::Json(status, body) => (status, Json(body)).into_response(),
            Reply::Archive { disposition, body } => {
                let mut response =
                    (StatusCode::OK, [(header::CONTENT_TYPE, "application/zip")], body)
                        .into_response();
                if let Some(disposition) = disposition {
                    response.headers_mut().insert(
                        header::CONTENT_DISPOSITION,
                        HeaderValue::from_str(&disposition).expect("disposition header"),
                    );
                }
                response
            }
            Reply::Raw {
                status,
                content_type,
                body,
            } => (status, [(header::CONTENT_TYPE, content_type)], body).into_response(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UploadedField {
    pub name: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Default)]
pub(crate) struct FakeBackend {
    compress_replies: Arc<Mutex<VecDeque<Reply>>>,
    email_replies: Arc<Mutex<VecDeque<Reply>>>,
    compress_delay: Arc<Mutex<Option<Duration>>>,
    status_replies: Arc<Mutex<HashMap<String, VecDeque<Reply>>>>,
    status_hits: Arc<Mutex<HashMap<String, u32>>>,
    pub compress_uploads: Arc<Mutex<Vec<Vec<UploadedField>>>>,
    pub email_uploads: Arc<Mutex<Vec<Vec<UploadedField>>>>,
    stats_reply: Arc<Mutex<Option<Reply>>>,
    pub access_records: Arc<Mutex<u32>>,
}

impl FakeBackend {
    pub fn queue_compress(&self, reply: Reply) {
        self.compress_replies.lock().expect("lock").push_back(reply);
    }

    /// Holds every `/compress-images` reply back by `delay`.
    pub fn delay_compress(&self, delay: Duration) {
        *self.compress_delay.lock().expect("lock") = Some(delay);
    }

    pub fn queue_email(&self, reply: Reply) {
        self.email_replies.lock().expect("lock").push_back(reply);
    }

    /// Replies for one task id, served in order. Once they run out the task
    /// reports `pending` forever.
    pub fn queue_status(&self, task_id: &str, replies: impl IntoIterator<Item = Reply>) {
        self.status_replies
            .lock()
            .expect("lock")
            .entry(task_id.to_string())
            .or_default()
            .extend(replies);
    }

    pub fn set_stats(&self, reply: Reply) {
        *self.stats_reply.lock().expect("lock") = Some(reply);
    }

    pub fn status_hits(&self, task_id: &str) -> u32 {
        self.status_hits
            .lock()
            .expect("lock")
            .get(task_id)
            .copied()
            .unwrap_or(0)
    }
}

async fn collect_fields(mut multipart: Multipart) -> Vec<UploadedField> {
    let mut fields = Vec::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
        fields.push(UploadedField {
            name,
            file_name,
            content_type,
            bytes,
        });
    }
    fields
}

fn unscripted() -> Reply {
    Reply::Json(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({"error": "no reply scripted"}),
    )
}

async fn compress_images(State(backend): State<FakeBackend>, multipart: Multipart) -> Reply {
    let fields = collect_fields(multipart).await;
    backend.compress_uploads.lock().expect("lock").push(fields);
    let delay = *backend.compress_delay.lock().expect("lock");
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    backend
        .compress_replies
        .lock()
        .expect("lock")
        .pop_front()
        .unwrap_or_else(unscripted)
}

async fn send_zip_email(State(backend): State<FakeBackend>, multipart: Multipart) -> Reply {
    let fields = collect_fields(multipart).await;
    backend.email_uploads.lock().expect("lock").push(fields);
    backend
        .email_replies
        .lock()
        .expect("lock")
        .pop_front()
        .unwrap_or_else(unscripted)
}

async fn task_status(State(backend): State<FakeBackend>, Path(task_id): Path<String>) -> Reply {
    *backend
        .status_hits
        .lock()
        .expect("lock")
        .entry(task_id.clone())
        .or_default() += 1;
    backend
        .status_replies
        .lock()
        .expect("lock")
        .get_mut(&task_id)
        .and_then(VecDeque::pop_front)
        .unwrap_or_else(|| Reply::status("pending"))
}

async fn record_access(State(backend): State<FakeBackend>) -> Reply {
    *backend.access_records.lock().expect("lock") += 1;
    Reply::Json(StatusCode::OK, json!({"message": "recorded"}))
}

async fn daily_stats(State(backend): State<FakeBackend>) -> Reply {
    backend
        .stats_reply
        .lock()
        .expect("lock")
        .clone()
        .unwrap_or_else(|| Reply::Json(StatusCode::OK, json!([])))
}

pub(crate) async fn spawn_backend() -> (String, FakeBackend) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let backend = FakeBackend::default();
    let app = Router::new()
        .route("/compress-images", post(compress_images))
        .route("/send-zip-email", post(send_zip_email))
        .route("/task-status/:task_id", get(task_status))
        .route("/record-access", post(record_access))
        .route("/daily-stats", get(daily_stats))
        .with_state(backend.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), backend)
}

/// A base URL nothing is listening on.
pub(crate) async fn dead_backend_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{addr}")
}

pub(crate) fn client(url: &str) -> BackendClient {
    BackendClient::new(url).expect("backend client")
}

pub(crate) fn fast_poll(max_attempts: u32) -> PollSettings {
    PollSettings {
        interval: Duration::from_millis(10),
        max_attempts,
    }
}

pub(crate) fn fast_options(max_attempts: u32) -> SessionOptions {
    SessionOptions {
        poll: fast_poll(max_attempts),
        default_archive_name: "default.zip".to_string(),
    }
}

/// Checks `condition` every 10ms for up to 5s.
pub(crate) async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 5s");
}
