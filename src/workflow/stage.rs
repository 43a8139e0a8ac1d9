//! Per-run state machine
//!
//! `NotStarted -> Running -> Completed -> ExportRequested -> ExportReady -> Retrieved`
//!
//! Every transition is one-way. The orchestrator checks the current stage
//! before each remote call, so an export can never be requested before the
//! scan completed and an artifact never fetched before the export is ready.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ExportError, ExportResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WorkflowStage {
    NotStarted,
    Running,
    Completed,
    ExportRequested,
    ExportReady,
    Retrieved,
}

impl WorkflowStage {
    /// Stage reached by a successful step from this one
    pub fn next(self) -> Option<WorkflowStage> {
        match self {
            WorkflowStage::NotStarted => Some(WorkflowStage::Running),
            WorkflowStage::Running => Some(WorkflowStage::Completed),
            WorkflowStage::Completed => Some(WorkflowStage::ExportRequested),
            WorkflowStage::ExportRequested => Some(WorkflowStage::ExportReady),
            WorkflowStage::ExportReady => Some(WorkflowStage::Retrieved),
            WorkflowStage::Retrieved => None,
        }
    }

    /// Fail unless the workflow is exactly at `required`
    pub fn require(self, required: WorkflowStage, operation: &str) -> ExportResult<()> {
        if self == required {
            Ok(())
        } else {
            Err(ExportError::InvalidState(format!(
                "{} requires stage {} but workflow is at {}",
                operation, required, self
            )))
        }
    }

    /// Move one step forward
    pub fn advance(&mut self) -> ExportResult<()> {
        let next = self.next().ok_or_else(|| {
            ExportError::InvalidState(format!("No stage follows {}", self))
        })?;
        *self = next;
        Ok(())
    }

    pub fn is_terminal(self) -> bool {
        self == WorkflowStage::Retrieved
    }
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowStage::NotStarted => "not started",
            WorkflowStage::Running => "running",
            WorkflowStage::Completed => "completed",
            WorkflowStage::ExportRequested => "export requested",
            WorkflowStage::ExportReady => "export ready",
            WorkflowStage::Retrieved => "retrieved",
        };
        f.write_str(name)
    }
}
