use std::time::Duration;

use resilience_core_types::DriverError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TimingError {
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("page did not settle within {}ms (last mutation rate {last_rate:.1}/s)", .after.as_millis())]
    StabilityTimeout { after: Duration, last_rate: f64 },

    #[error("wait cancelled")]
    Cancelled,
}

impl TimingError {
    pub fn is_retryable(&self) -> bool {
        match self {
            TimingError::Driver(err) => err.is_retryable(),
            TimingError::StabilityTimeout { .. } => true,
            TimingError::Cancelled => false,
        }
    }
}
