//! Error types for the dashboard client
//!
//! Uses thiserror for ergonomic error definitions.
//! Polling errors stop at the refresh boundary; only user-triggered
//! actions hand them back to the caller.

use thiserror::Error;

/// Custom Result type using our Error
pub type Result<T> = std::result::Result<T, DashboardError>;

/// Dashboard client errors
#[derive(Error, Debug)]
pub enum DashboardError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Request rejected, timed out, or answered with a non-2xx status
    #[error("Network error: {0}")]
    Network(String),

    /// Backend answered but the envelope reports failure or lacks data
    #[error("Envelope error: {0}")]
    Envelope(String),

    /// Output sink could not be written
    #[error("Render error: {0}")]
    Render(String),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A start/stop request is already in flight
    #[error("Control busy: {0} request already in flight")]
    ControlBusy(String),

    /// Bad user input for an action
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl DashboardError {
    /// Short category name used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            DashboardError::Config(_) => "config",
            DashboardError::Network(_) => "network",
            DashboardError::Envelope(_) => "envelope",
            DashboardError::Render(_) => "render",
            DashboardError::Json(_) => "json",
            DashboardError::ControlBusy(_) => "control_busy",
            DashboardError::InvalidInput(_) => "invalid_input",
        }
    }
}

impl From<reqwest::Error> for DashboardError {
    fn from(err: reqwest::Error) -> Self {
        DashboardError::Network(err.to_string())
    }
}

impl From<std::io::Error> for DashboardError {
    fn from(err: std::io::Error) -> Self {
        DashboardError::Render(err.to_string())
    }
}
