//! Error types for locator system

use resilience_core_types::DriverError;
use thiserror::Error;

use crate::types::StrategyAttempt;

/// Locator error enumeration
#[derive(Debug, Error, Clone)]
pub enum LocatorError {
    /// Element not found with any strategy
    #[error("Element not found for selector: {selector} ({} strategies tried)", .attempts.len())]
    ElementNotFound {
        selector: String,
        attempts: Vec<StrategyAttempt>,
    },

    /// Invalid selector descriptor
    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// Strategy execution failed
    #[error("Strategy '{strategy}' failed: {reason}")]
    StrategyFailed { strategy: String, reason: String },

    /// Driver communication error
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// Lookup cancelled by the caller
    #[error("Lookup cancelled")]
    Cancelled,
}

impl LocatorError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            LocatorError::ElementNotFound { .. } => true,
            LocatorError::Driver(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// Get error severity (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            LocatorError::Driver(_) => 2,
            LocatorError::ElementNotFound { .. } | LocatorError::StrategyFailed { .. } => 1,
            LocatorError::InvalidDescriptor(_) | LocatorError::Cancelled => 0,
        }
    }

    /// Per-strategy trace, when the error came from an exhausted lookup
    pub fn attempts(&self) -> &[StrategyAttempt] {
        match self {
            LocatorError::ElementNotFound { attempts, .. } => attempts,
            _ => &[],
        }
    }
}
