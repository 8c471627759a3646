//! Error types for the driver boundary

use std::time::Duration;

use thiserror::Error;

/// Failure reported by a browser driver call.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DriverError {
    /// Call did not complete within its bound
    #[error("driver call '{operation}' timed out after {}ms", .after.as_millis())]
    Timeout { operation: String, after: Duration },

    /// Handle no longer refers to a live element
    #[error("stale element handle: {0}")]
    StaleHandle(String),

    /// Selector could not be parsed by the driver
    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    /// Page navigation failed
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// Transport or protocol level error
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Driver does not implement the capability
    #[error("unsupported driver operation: {0}")]
    Unsupported(String),

    /// Call was cancelled by the caller
    #[error("driver call cancelled")]
    Cancelled,
}

impl DriverError {
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Check if the call may succeed when repeated
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DriverError::Timeout { .. } | DriverError::Protocol(_) | DriverError::StaleHandle(_)
        )
    }
}
