//! Wire types for the compression backend's HTTP contract.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{TaskId, TaskStatus};

/// Multipart field carrying each image on `POST /compress-images`.
pub const IMAGES_FIELD: &str = "images";
/// Multipart field carrying the archive on `POST /send-zip-email`.
pub const ZIP_FILE_FIELD: &str = "zip_file";
pub const EMAIL_ADDRESS_FIELD: &str = "email_address";

pub const ARCHIVE_CONTENT_TYPE: &str = "application/zip";
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Body of a `202 Accepted` reply to either submission endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAccepted {
    pub task_id: TaskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Error body the backend sends alongside non-2xx replies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}

/// JSON reply from `GET /task-status/{task_id}`.
///
/// The raw document is retained because a `completed` reply without a
/// `result` field carries its payload at the top level.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskStatusBody {
    pub status: Option<String>,
    pub result: Option<Value>,
    pub error: Option<String>,
    raw: Value,
}

impl TaskStatusBody {
    pub fn parse(bytes: &[u8]) -> serde_json::Result<Self> {
        let raw: Value = serde_json::from_slice(bytes)?;
        Ok(Self::from_value(raw))
    }

    pub fn from_value(raw: Value) -> Self {
        let status = raw
            .get("status")
            .and_then(Value::as_str)
            .map(str::to_string);
        let result = raw.get("result").filter(|v| !v.is_null()).cloned();
        let error = raw
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_string);
        Self {
            status,
            result,
            error,
            raw,
        }
    }

    pub fn wire_status(&self) -> Option<TaskStatus> {
        self.status.as_deref().and_then(TaskStatus::from_wire)
    }

    /// The `result` field, or the whole document when it is absent.
    pub fn into_payload(self) -> Value {
        self.result.unwrap_or(self.raw)
    }
}

/// One day of usage from `GET /daily-stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStat {
    pub date: String,
    pub count: u64,
}

impl DailyStat {
    /// `2024-05-17` becomes `5/17`; anything unparseable is returned as-is.
    pub fn short_label(&self) -> String {
        match NaiveDate::parse_from_str(&self.date, "%Y-%m-%d") {
            Ok(day) => format!("{}/{}", day.month(), day.day()),
            Err(_) => self.date.clone(),
        }
    }
}

/// Accepts both `{date, count}` and the older `{visit_date, visit_count}`
/// naming. Entries lacking a date string or a numeric count are dropped; a
/// document that is not an array yields nothing.
pub fn normalize_daily_stats(doc: Value) -> Vec<DailyStat> {
    let Value::Array(items) = doc else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let date = item
                .get("visit_date")
                .and_then(Value::as_str)
                .or_else(|| item.get("date").and_then(Value::as_str))?;
            let count = item
                .get("visit_count")
                .and_then(Value::as_u64)
                .or_else(|| item.get("count").and_then(Value::as_u64))?;
            Some(DailyStat {
                date: date.to_string(),
                count,
            })
        })
        .collect()
}
