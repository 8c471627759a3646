//! Error types for the recovery layer

use action_locator::LocatorError;
use adaptive_timing::TimingError;
use resilience_core_types::DriverError;
use thiserror::Error;

/// Failure of a single recovery strategy or of the recovery pass as a whole
#[derive(Debug, Error)]
pub enum RecoveryError {
    /// Strategy could not run at all
    #[error("Recovery strategy '{strategy}' failed: {reason}")]
    Strategy { strategy: String, reason: String },

    /// Context lacked a field the strategy needs
    #[error("Invalid recovery context: {0}")]
    InvalidContext(String),

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Locator error: {0}")]
    Locator(#[from] LocatorError),

    #[error("Timing error: {0}")]
    Timing(#[from] TimingError),

    /// Recovery interrupted by the caller
    #[error("Recovery cancelled")]
    Cancelled,
}

impl RecoveryError {
    pub fn strategy(strategy: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Strategy {
            strategy: strategy.into(),
            reason: reason.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            RecoveryError::Cancelled
                | RecoveryError::Locator(LocatorError::Cancelled)
                | RecoveryError::Timing(TimingError::Cancelled)
                | RecoveryError::Driver(DriverError::Cancelled)
        )
    }
}

pub type Result<T> = std::result::Result<T, RecoveryError>;
