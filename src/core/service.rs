// Scanning service seam
// The orchestrator only ever talks to the remote side through this trait

use async_trait::async_trait;
use bytes::Bytes;

use super::types::{
    Credentials, ExportFormat, ExportId, RunHandle, ScanId, ScanStatus, Session, TemplateId,
};
use crate::error::ExportResult;

/// Operations consumed from the remote scanning service
///
/// Implementations must report hard request failures as errors; the
/// workflow never retries a failed call.
#[async_trait]
pub trait ScanService: Send + Sync {
    /// Open an authenticated session
    async fn authenticate(&self, credentials: &Credentials) -> ExportResult<Session>;

    /// End a session; callers treat failure as non-fatal
    async fn end_session(&self, session: &Session) -> ExportResult<()>;

    /// Launch a configured scan
    async fn launch_scan(&self, session: &Session, scan: ScanId) -> ExportResult<RunHandle>;

    /// Fetch the current status of a scan
    ///
    /// When `run` is given and the service can scope by it, the status of
    /// that execution is reported instead of the most recent one.
    async fn fetch_scan_status(
        &self,
        session: &Session,
        scan: ScanId,
        run: Option<&RunHandle>,
    ) -> ExportResult<ScanStatus>;

    /// Ask the service to render the scan's results
    async fn request_export(
        &self,
        session: &Session,
        scan: ScanId,
        template: Option<TemplateId>,
        format: ExportFormat,
    ) -> ExportResult<ExportId>;

    /// Whether the export can be downloaded yet
    async fn fetch_export_ready(
        &self,
        session: &Session,
        scan: ScanId,
        export: ExportId,
    ) -> ExportResult<bool>;

    /// Download the rendered export
    async fn fetch_export_artifact(
        &self,
        session: &Session,
        scan: ScanId,
        export: ExportId,
    ) -> ExportResult<Bytes>;

    /// Get service name
    fn name(&self) -> &str;
}
