//! nessie-export - run a Nessus scan and download its report
//!
//! Logs in, launches a configured scan, polls until it completes, requests
//! an export, polls until the export is ready, downloads it and logs out.

pub mod config;
pub mod core;
pub mod error;
pub mod nessus;
pub mod output;
pub mod poll;
pub mod session;
pub mod workflow;

// Re-export commonly used types
pub use crate::config::{AppConfig, ServiceConfig, WorkflowConfig};
pub use crate::core::{
    Credentials, ExportArtifact, ExportFormat, ExportId, RunHandle, ScanId, ScanService,
    ScanStatus, Session, TemplateId,
};
pub use crate::error::{ExportError, ExportResult};
pub use crate::nessus::NessusClient;
pub use crate::poll::{Poller, DEFAULT_POLL_INTERVAL};
pub use crate::session::{SessionGuard, SessionManager};
pub use crate::workflow::{run_export_workflow, ExportJob, ScanOrchestrator, WorkflowStage};

pub type Result<T> = std::result::Result<T, ExportError>;
