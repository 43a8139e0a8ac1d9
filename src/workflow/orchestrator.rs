//! Scan lifecycle orchestration
//!
//! Drives one scan run through execution and export on an already
//! authenticated session. Steps run strictly in sequence.

use chrono::Utc;
use log::{debug, info};

use super::stage::WorkflowStage;
use super::ExportJob;
use crate::core::{
    ExportArtifact, ExportFormat, ExportId, RunHandle, ScanId, ScanService, ScanStatus, Session,
    TemplateId,
};
use crate::error::{ExportError, ExportResult};
use crate::poll::Poller;

/// Orchestrates a single scan run against a live session
pub struct ScanOrchestrator<'a> {
    service: &'a dyn ScanService,
    session: &'a Session,
    poller: &'a Poller,
    scan_id: ScanId,
    stage: WorkflowStage,
    run: Option<RunHandle>,
    export: Option<(ExportId, ExportFormat)>,
}

impl<'a> ScanOrchestrator<'a> {
    pub fn new(
        service: &'a dyn ScanService,
        session: &'a Session,
        poller: &'a Poller,
        scan_id: ScanId,
    ) -> Self {
        Self {
            service,
            session,
            poller,
            scan_id,
            stage: WorkflowStage::NotStarted,
            run: None,
            export: None,
        }
    }

    pub fn stage(&self) -> WorkflowStage {
        self.stage
    }

    pub fn scan_id(&self) -> ScanId {
        self.scan_id
    }

    /// Execution instance returned by the launch, if any
    pub fn run_handle(&self) -> Option<&RunHandle> {
        self.run.as_ref()
    }

    pub fn export_id(&self) -> Option<ExportId> {
        self.export.map(|(id, _)| id)
    }

    /// Launch the scan
    pub async fn start_scan(&mut self) -> ExportResult<RunHandle> {
        self.stage.require(WorkflowStage::NotStarted, "start_scan")?;

        let handle = self.service.launch_scan(self.session, self.scan_id).await?;
        info!("Scan {} launched (run {})", self.scan_id, handle.scan_uuid);

        self.run = Some(handle.clone());
        self.stage.advance()?;
        Ok(handle)
    }

    /// Poll the scan status until it reads "completed" in any casing
    ///
    /// The status is scoped to the run returned by `start_scan` when the
    /// service can tell runs apart; otherwise it reflects the most recent run.
    pub async fn await_scan_completion(&mut self) -> ExportResult<ScanStatus> {
        self.stage.require(WorkflowStage::Running, "await_scan_completion")?;

        let service = self.service;
        let session = self.session;
        let scan_id = self.scan_id;
        let run = self.run.as_ref();

        let status = self
            .poller
            .poll_until(
                "scan completion",
                move || service.fetch_scan_status(session, scan_id, run),
                ScanStatus::is_completed,
                |status, attempt| info!("Scan is {} (check {})", status, attempt),
            )
            .await?;

        info!("Scan completed");
        self.stage.advance()?;
        Ok(status)
    }

    /// Ask the service to export the completed scan
    pub async fn request_export(
        &mut self,
        template: Option<TemplateId>,
        format: ExportFormat,
    ) -> ExportResult<ExportId> {
        self.stage.require(WorkflowStage::Completed, "request_export")?;

        let export_id = self
            .service
            .request_export(self.session, self.scan_id, template, format)
            .await?;
        info!("Export {} requested as {}", export_id, format);

        self.export = Some((export_id, format));
        self.stage.advance()?;
        Ok(export_id)
    }

    /// Poll until the export can be downloaded
    pub async fn await_export_readiness(&mut self) -> ExportResult<()> {
        self.stage.require(WorkflowStage::ExportRequested, "await_export_readiness")?;
        let (export_id, _) = self.requested_export()?;

        let service = self.service;
        let session = self.session;
        let scan_id = self.scan_id;

        self.poller
            .poll_until(
                "export readiness",
                move || service.fetch_export_ready(session, scan_id, export_id),
                |ready| *ready,
                |_, attempt| info!("Scan export ongoing... (check {})", attempt),
            )
            .await?;

        info!("Scan export finished");
        self.stage.advance()?;
        Ok(())
    }

    /// Download the export; single shot, readiness is already confirmed
    pub async fn retrieve_artifact(&mut self) -> ExportResult<ExportArtifact> {
        self.stage.require(WorkflowStage::ExportReady, "retrieve_artifact")?;
        let (export_id, format) = self.requested_export()?;

        let bytes = self
            .service
            .fetch_export_artifact(self.session, self.scan_id, export_id)
            .await?;
        debug!("Downloaded {} bytes for export {}", bytes.len(), export_id);

        self.stage.advance()?;
        Ok(ExportArtifact {
            scan_id: self.scan_id,
            export_id,
            format,
            bytes,
            retrieved_at: Utc::now(),
        })
    }

    /// Run every step in order
    pub async fn run(&mut self, job: &ExportJob) -> ExportResult<ExportArtifact> {
        if job.scan_id != self.scan_id {
            return Err(ExportError::InvalidState(format!(
                "Job targets scan {} but orchestrator drives scan {}",
                job.scan_id, self.scan_id
            )));
        }

        self.start_scan().await?;
        self.await_scan_completion().await?;
        self.request_export(job.template_id, job.format).await?;
        self.await_export_readiness().await?;
        self.retrieve_artifact().await
    }

    fn requested_export(&self) -> ExportResult<(ExportId, ExportFormat)> {
        self.export
            .ok_or_else(|| ExportError::InvalidState("No export has been requested".to_string()))
    }
}
