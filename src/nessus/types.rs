//! Nessus REST payloads

use serde::{Deserialize, Serialize};

use crate::core::{ExportFormat, RunHandle, ScanStatus, TemplateId};

/// Export status value meaning the file can be downloaded
pub const EXPORT_READY: &str = "ready";

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct LaunchResponse {
    pub scan_uuid: String,
}

/// Subset of `GET /scans/{id}` needed to follow a run
#[derive(Debug, Deserialize)]
pub struct ScanDetails {
    pub info: ScanInfo,
    #[serde(default)]
    pub history: Option<Vec<HistoryEntry>>,
}

#[derive(Debug, Deserialize)]
pub struct ScanInfo {
    pub status: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryEntry {
    pub history_id: i64,
    pub uuid: String,
    pub status: String,
}

impl ScanDetails {
    /// Status of `run` if the history lists it, else of the latest run
    pub fn status_for(&self, run: Option<&RunHandle>) -> ScanStatus {
        let scoped = run.and_then(|run| {
            self.history
                .as_deref()
                .unwrap_or_default()
                .iter()
                .find(|entry| entry.uuid == run.scan_uuid)
        });

        match scoped {
            Some(entry) => ScanStatus::new(entry.status.clone()),
            None => ScanStatus::new(self.info.status.clone()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ExportRequestBody {
    pub format: ExportFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<TemplateId>,
}

#[derive(Debug, Deserialize)]
pub struct ExportResponse {
    pub file: i64,
}

#[derive(Debug, Deserialize)]
pub struct ExportStatusResponse {
    pub status: String,
}

impl ExportStatusResponse {
    pub fn is_ready(&self) -> bool {
        self.status.eq_ignore_ascii_case(EXPORT_READY)
    }
}

/// Error body returned with non-2xx responses
#[derive(Debug, Deserialize)]
pub struct ApiError {
    pub error: String,
}

/// Best human-readable message from an error response body
pub fn error_message(body: &str) -> String {
    match serde_json::from_str::<ApiError>(body) {
        Ok(api_error) => api_error.error,
        Err(_) => {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "no response body".to_string()
            } else {
                trimmed.chars().take(200).collect()
            }
        }
    }
}
