// Core module - Service seam and the values that cross it
pub mod mock;
pub mod service;
pub mod types;

pub use mock::{MockCall, MockScanService};
pub use service::ScanService;
pub use types::{
    Credentials,
    ExportArtifact,
    ExportFormat,
    ExportId,
    RunHandle,
    ScanId,
    ScanStatus,
    Session,
    TemplateId,
    COMPLETED_LABEL,
};
