//! Scripted in-memory scanning service
//!
//! Each polled operation replays a queue of scripted responses. The last
//! queued response repeats once the queue is down to one entry, so a script
//! of `running, completed` keeps answering `completed`. Every call is
//! recorded for later inspection.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::service::ScanService;
use super::types::{
    Credentials, ExportFormat, ExportId, RunHandle, ScanId, ScanStatus, Session, TemplateId,
};
use crate::error::{ExportError, ExportResult};

/// A call observed by the mock, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Authenticate { username: String },
    EndSession { token: String },
    LaunchScan(ScanId),
    FetchScanStatus { scan: ScanId, run: Option<String> },
    RequestExport { scan: ScanId, template: Option<TemplateId>, format: ExportFormat },
    FetchExportReady { scan: ScanId, export: ExportId },
    FetchExportArtifact { scan: ScanId, export: ExportId },
}

pub struct MockScanService {
    token: String,
    scan_uuid: String,
    export_id: ExportId,
    login_failure: Option<String>,
    logout_failure: Option<String>,
    launch_failure: Option<String>,
    export_failure: Option<String>,
    statuses: Mutex<VecDeque<Result<String, String>>>,
    readiness: Mutex<VecDeque<Result<bool, String>>>,
    artifact: Result<Bytes, String>,
    calls: Mutex<Vec<MockCall>>,
}

impl Default for MockScanService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockScanService {
    pub fn new() -> Self {
        Self {
            token: "mock-token".to_string(),
            scan_uuid: "mock-scan-uuid".to_string(),
            export_id: ExportId(1),
            login_failure: None,
            logout_failure: None,
            launch_failure: None,
            export_failure: None,
            statuses: Mutex::new(VecDeque::new()),
            readiness: Mutex::new(VecDeque::new()),
            artifact: Ok(Bytes::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue a scan status label
    pub fn status(self, label: &str) -> Self {
        lock(&self.statuses).push_back(Ok(label.to_string()));
        self
    }

    /// Queue a failing scan status fetch
    pub fn status_error(self, message: &str) -> Self {
        lock(&self.statuses).push_back(Err(message.to_string()));
        self
    }

    /// Queue an export readiness answer
    pub fn ready(self, ready: bool) -> Self {
        lock(&self.readiness).push_back(Ok(ready));
        self
    }

    /// Queue a failing export readiness fetch
    pub fn ready_error(self, message: &str) -> Self {
        lock(&self.readiness).push_back(Err(message.to_string()));
        self
    }

    pub fn artifact(mut self, bytes: &'static [u8]) -> Self {
        self.artifact = Ok(Bytes::from_static(bytes));
        self
    }

    pub fn artifact_error(mut self, message: &str) -> Self {
        self.artifact = Err(message.to_string());
        self
    }

    pub fn export_id(mut self, export_id: i64) -> Self {
        self.export_id = ExportId(export_id);
        self
    }

    pub fn failing_login(mut self, message: &str) -> Self {
        self.login_failure = Some(message.to_string());
        self
    }

    pub fn failing_logout(mut self, message: &str) -> Self {
        self.logout_failure = Some(message.to_string());
        self
    }

    pub fn failing_launch(mut self, message: &str) -> Self {
        self.launch_failure = Some(message.to_string());
        self
    }

    pub fn failing_export(mut self, message: &str) -> Self {
        self.export_failure = Some(message.to_string());
        self
    }

    /// Snapshot of every call made so far
    pub fn calls(&self) -> Vec<MockCall> {
        lock(&self.calls).clone()
    }

    /// Number of recorded calls matching `predicate`
    pub fn count<F>(&self, predicate: F) -> usize
    where
        F: Fn(&MockCall) -> bool,
    {
        lock(&self.calls).iter().filter(|call| predicate(call)).count()
    }

    /// Index of the first recorded call matching `predicate`
    pub fn position<F>(&self, predicate: F) -> Option<usize>
    where
        F: Fn(&MockCall) -> bool,
    {
        lock(&self.calls).iter().position(predicate)
    }

    pub fn logout_count(&self) -> usize {
        self.count(|call| matches!(call, MockCall::EndSession { .. }))
    }

    fn record(&self, call: MockCall) {
        lock(&self.calls).push(call);
    }

    fn check_session(&self, session: &Session) -> ExportResult<()> {
        if session.token() != self.token {
            return Err(ExportError::RemoteError("Invalid session token".to_string()));
        }
        let ended = lock(&self.calls)
            .iter()
            .any(|call| matches!(call, MockCall::EndSession { .. }));
        if ended {
            return Err(ExportError::RemoteError("Session already ended".to_string()));
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn next_scripted<T: Clone>(queue: &Mutex<VecDeque<Result<T, String>>>, fallback: T) -> Result<T, String> {
    let mut queue = lock(queue);
    if queue.len() > 1 {
        queue.pop_front().unwrap_or(Ok(fallback))
    } else {
        queue.front().cloned().unwrap_or(Ok(fallback))
    }
}

#[async_trait]
impl ScanService for MockScanService {
    async fn authenticate(&self, credentials: &Credentials) -> ExportResult<Session> {
        self.record(MockCall::Authenticate {
            username: credentials.username.clone(),
        });
        match &self.login_failure {
            Some(message) => Err(ExportError::AuthenticationError(message.clone())),
            None => Ok(Session::new(self.token.clone())),
        }
    }

    async fn end_session(&self, session: &Session) -> ExportResult<()> {
        self.record(MockCall::EndSession {
            token: session.token().to_string(),
        });
        match &self.logout_failure {
            Some(message) => Err(ExportError::LogoutError(message.clone())),
            None => Ok(()),
        }
    }

    async fn launch_scan(&self, session: &Session, scan: ScanId) -> ExportResult<RunHandle> {
        self.record(MockCall::LaunchScan(scan));
        self.check_session(session)?;
        match &self.launch_failure {
            Some(message) => Err(ExportError::RemoteError(message.clone())),
            None => Ok(RunHandle::new(self.scan_uuid.clone())),
        }
    }

    async fn fetch_scan_status(
        &self,
        session: &Session,
        scan: ScanId,
        run: Option<&RunHandle>,
    ) -> ExportResult<ScanStatus> {
        self.record(MockCall::FetchScanStatus {
            scan,
            run: run.map(|handle| handle.scan_uuid.clone()),
        });
        self.check_session(session)?;
        next_scripted(&self.statuses, "completed".to_string())
            .map(ScanStatus::new)
            .map_err(ExportError::RemoteError)
    }

    async fn request_export(
        &self,
        session: &Session,
        scan: ScanId,
        template: Option<TemplateId>,
        format: ExportFormat,
    ) -> ExportResult<ExportId> {
        self.record(MockCall::RequestExport {
            scan,
            template,
            format,
        });
        self.check_session(session)?;
        match &self.export_failure {
            Some(message) => Err(ExportError::RemoteError(message.clone())),
            None => Ok(self.export_id),
        }
    }

    async fn fetch_export_ready(
        &self,
        session: &Session,
        scan: ScanId,
        export: ExportId,
    ) -> ExportResult<bool> {
        self.record(MockCall::FetchExportReady { scan, export });
        self.check_session(session)?;
        next_scripted(&self.readiness, true).map_err(ExportError::RemoteError)
    }

    async fn fetch_export_artifact(
        &self,
        session: &Session,
        scan: ScanId,
        export: ExportId,
    ) -> ExportResult<Bytes> {
        self.record(MockCall::FetchExportArtifact { scan, export });
        self.check_session(session)?;
        self.artifact.clone().map_err(ExportError::RemoteError)
    }

    fn name(&self) -> &str {
        "Mock Service"
    }
}
