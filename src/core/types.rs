//! Value types exchanged with the scanning service

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ExportError;

/// Status label that ends the scan wait
pub const COMPLETED_LABEL: &str = "completed";

/// Login identity and secret
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Authenticated session token
///
/// Deliberately not `Clone`: the session manager owns the only copy and
/// hands out shared references for the lifetime of the login.
pub struct Session {
    token: String,
}

impl Session {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").field("token", &"<redacted>").finish()
    }
}

/// Identifier of a scan configured on the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScanId(pub i64);

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Report template used to render an export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateId(pub i64);

/// Identifier of an export job (the service's file id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExportId(pub i64);

impl fmt::Display for ExportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Execution instance returned when a scan is launched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunHandle {
    pub scan_uuid: String,
}

impl RunHandle {
    pub fn new(scan_uuid: impl Into<String>) -> Self {
        Self {
            scan_uuid: scan_uuid.into(),
        }
    }
}

/// Snapshot of a scan's state, fetched fresh on every poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStatus {
    pub label: String,
}

impl ScanStatus {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into() }
    }

    /// Terminal check; the service is not consistent about label casing
    pub fn is_completed(&self) -> bool {
        self.label.eq_ignore_ascii_case(COMPLETED_LABEL)
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// Export formats accepted by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Nessus,
    #[default]
    Csv,
    Html,
    Pdf,
    Db,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 5] = [
        ExportFormat::Nessus,
        ExportFormat::Csv,
        ExportFormat::Html,
        ExportFormat::Pdf,
        ExportFormat::Db,
    ];

    /// Name used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Nessus => "nessus",
            ExportFormat::Csv => "csv",
            ExportFormat::Html => "html",
            ExportFormat::Pdf => "pdf",
            ExportFormat::Db => "db",
        }
    }

    pub fn file_extension(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExportFormat::ALL
            .iter()
            .copied()
            .find(|format| format.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ExportError::ParseError(format!("Unknown export format: {}", s)))
    }
}

/// The exported report, retrieved once readiness was confirmed
#[derive(Debug, Clone)]
pub struct ExportArtifact {
    pub scan_id: ScanId,
    pub export_id: ExportId,
    pub format: ExportFormat,
    pub bytes: Bytes,
    pub retrieved_at: DateTime<Utc>,
}

impl ExportArtifact {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }
}
