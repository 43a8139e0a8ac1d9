//! Export workflow: login, scan, export, download, logout

pub mod orchestrator;
pub mod stage;

use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::{Credentials, ExportArtifact, ExportFormat, ScanId, ScanService, TemplateId};
use crate::error::ExportResult;
use crate::poll::Poller;
use crate::session::SessionManager;

pub use orchestrator::ScanOrchestrator;
pub use stage::WorkflowStage;

/// What to export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportJob {
    pub scan_id: ScanId,
    pub template_id: Option<TemplateId>,
    pub format: ExportFormat,
}

impl ExportJob {
    pub fn new(scan_id: ScanId, template_id: Option<TemplateId>, format: ExportFormat) -> Self {
        Self {
            scan_id,
            template_id,
            format,
        }
    }
}

/// Run the complete workflow and return the exported report
///
/// Once login succeeds the session is ended exactly once, whether the scan
/// and export steps succeed or fail. A failed login returns immediately and
/// nothing else is called.
pub async fn run_export_workflow(
    service: Arc<dyn ScanService>,
    credentials: &Credentials,
    job: &ExportJob,
    poller: &Poller,
) -> ExportResult<ExportArtifact> {
    let guard = SessionManager::new(Arc::clone(&service)).login(credentials).await?;

    let result = {
        let mut orchestrator =
            ScanOrchestrator::new(&*service, guard.session(), poller, job.scan_id);
        orchestrator.run(job).await
    };

    guard.logout().await;

    if let Ok(artifact) = &result {
        info!(
            "Retrieved {} export of scan {} ({} bytes)",
            artifact.format,
            artifact.scan_id,
            artifact.len()
        );
    }
    result
}
