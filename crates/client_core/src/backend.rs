use reqwest::{
    multipart::{Form, Part},
    Client, Response, StatusCode,
};
use shared::{
    domain::TaskId,
    error::ValidationError,
    protocol::{
        normalize_daily_stats, DailyStat, ErrorBody, TaskAccepted, ARCHIVE_CONTENT_TYPE,
        EMAIL_ADDRESS_FIELD, IMAGES_FIELD, ZIP_FILE_FIELD,
    },
};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    error::{ConfigError, StatsError, SubmitError},
    selection::SelectedImage,
    types::Archive,
};

/// HTTP access to the compression backend. Every endpoint hangs off one base
/// URL.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: Client,
    base_url: Url,
}

impl BackendClient {
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Self::with_http_client(Client::new(), base_url)
    }

    pub fn with_http_client(http: Client, base_url: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidBackendUrl {
            url: base_url.to_string(),
            reason,
        };
        let parsed = Url::parse(base_url.trim()).map_err(|e| invalid(e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme `{}`", parsed.scheme())));
        }
        if parsed.cannot_be_a_base() {
            return Err(invalid("url cannot carry a path".to_string()));
        }
        Ok(Self {
            http,
            base_url: parsed,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// `POST /compress-images`, one `images` part per selected image.
    pub async fn submit_compression(
        &self,
        images: &[SelectedImage],
    ) -> Result<TaskId, SubmitError> {
        if images.is_empty() {
            return Err(ValidationError::NoImagesSelected.into());
        }

        let mut form = Form::new();
        for image in images {
            let part = Part::bytes(image.payload.clone())
                .file_name(image.name.clone())
                .mime_str(&image.mime_type)?;
            form = form.part(IMAGES_FIELD, part);
        }

        debug!(images = images.len(), "backend: posting compression job");
        let response = self
            .http
            .post(self.endpoint(&["compress-images"]))
            .multipart(form)
            .send()
            .await?;
        accept(response).await
    }

    /// `POST /send-zip-email` with the archive and the destination address.
    pub async fn submit_email(
        &self,
        archive: &Archive,
        address: &str,
    ) -> Result<TaskId, SubmitError> {
        let part = Part::bytes(archive.bytes.clone())
            .file_name(archive.filename.clone())
            .mime_str(ARCHIVE_CONTENT_TYPE)?;
        let form = Form::new()
            .part(ZIP_FILE_FIELD, part)
            .text(EMAIL_ADDRESS_FIELD, address.to_string());

        debug!(filename = %archive.filename, "backend: posting email job");
        let response = self
            .http
            .post(self.endpoint(&["send-zip-email"]))
            .multipart(form)
            .send()
            .await?;
        accept(response).await
    }

    /// `GET /task-status/{task_id}`. The response is interpreted by the poller.
    pub async fn task_status(&self, task_id: &TaskId) -> reqwest::Result<Response> {
        self.http
            .get(self.endpoint(&["task-status", task_id.as_str()]))
            .send()
            .await
    }

    pub async fn record_access(&self) -> reqwest::Result<()> {
        self.http
            .post(self.endpoint(&["record-access"]))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// `GET /daily-stats`, normalised. A JSON document of the wrong shape is
    /// an empty series rather than an error.
    pub async fn daily_stats(&self) -> Result<Vec<DailyStat>, StatsError> {
        let response = self.http.get(self.endpoint(&["daily-stats"])).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "stats: fetch rejected");
            return Err(StatsError::Status {
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await?;
        let doc: serde_json::Value = serde_json::from_slice(&bytes)?;
        let stats = normalize_daily_stats(doc);
        info!(days = stats.len(), "stats: fetched daily usage");
        Ok(stats)
    }
}

async fn accept(response: Response) -> Result<TaskId, SubmitError> {
    let status = response.status();
    if status != StatusCode::ACCEPTED {
        let fallback = status
            .canonical_reason()
            .unwrap_or("unexpected status")
            .to_string();
        let message = match response.json::<ErrorBody>().await {
            Ok(ErrorBody { error: Some(error) }) => error,
            _ => fallback,
        };
        return Err(SubmitError::Rejected {
            status: status.as_u16(),
            message,
        });
    }

    let accepted: TaskAccepted = response
        .json()
        .await
        .map_err(|e| SubmitError::MalformedAccept(e.to_string()))?;
    if accepted.task_id.as_str().is_empty() {
        return Err(SubmitError::MalformedAccept("empty task_id".to_string()));
    }
    Ok(accepted.task_id)
}
