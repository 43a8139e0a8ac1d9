//! Error handling for the export workflow
//!
//! Every fatal condition aborts the remaining workflow steps and reaches the
//! caller as a single `ExportError`. Logout failures are the exception: they
//! are reported through the log and never escalated.

use thiserror::Error;

/// Main error type for workflow operations
#[derive(Debug, Error)]
pub enum ExportError {
    /// The service connection could not be constructed
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Login was rejected or never reached the service
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// Any other request or transport failure
    #[error("Remote error: {0}")]
    RemoteError(String),

    /// Ending the session failed; only ever logged
    #[error("Logout failed: {0}")]
    LogoutError(String),

    /// A workflow step was invoked before its precondition held
    #[error("Invalid workflow state: {0}")]
    InvalidState(String),

    #[error("Timed out: {0}")]
    TimeoutError(String),

    #[error("Workflow cancelled")]
    Cancelled,

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type alias for workflow operations
pub type ExportResult<T> = Result<T, ExportError>;

impl ExportError {
    /// Short label used in log lines and CLI output
    pub fn kind(&self) -> &'static str {
        match self {
            ExportError::ConfigError(_) => "configuration",
            ExportError::AuthenticationError(_) => "authentication",
            ExportError::RemoteError(_) => "remote",
            ExportError::LogoutError(_) => "logout",
            ExportError::InvalidState(_) => "state",
            ExportError::TimeoutError(_) => "timeout",
            ExportError::Cancelled => "cancelled",
            ExportError::ParseError(_) => "parse",
            ExportError::IoError(_) => "io",
        }
    }

    /// Whether this error aborts the workflow
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ExportError::LogoutError(_))
    }

    /// Process exit code reported by the command line entry point
    pub fn exit_code(&self) -> i32 {
        match self {
            ExportError::ConfigError(_) | ExportError::ParseError(_) => 2,
            ExportError::AuthenticationError(_) => 3,
            ExportError::RemoteError(_) | ExportError::LogoutError(_) => 4,
            ExportError::TimeoutError(_) => 5,
            ExportError::InvalidState(_) => 6,
            ExportError::IoError(_) => 74,
            ExportError::Cancelled => 130,
        }
    }
}

impl From<reqwest::Error> for ExportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            ExportError::ConfigError(e.to_string())
        } else if e.is_timeout() {
            ExportError::TimeoutError(e.to_string())
        } else {
            ExportError::RemoteError(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ExportError {
    fn from(e: serde_json::Error) -> Self {
        ExportError::ParseError(e.to_string())
    }
}

impl From<toml::de::Error> for ExportError {
    fn from(e: toml::de::Error) -> Self {
        ExportError::ConfigError(format!("Failed to parse TOML: {}", e))
    }
}

impl From<tokio::time::error::Elapsed> for ExportError {
    fn from(e: tokio::time::error::Elapsed) -> Self {
        ExportError::TimeoutError(e.to_string())
    }
}
