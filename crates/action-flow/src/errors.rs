//! Retry controller error types

use resilience_recovery::ErrorKind;
use thiserror::Error;

use crate::types::FailureReport;

/// Caller-visible failure of a retried operation
///
/// Every variant carries the [`FailureReport`]: attempts made, recovery passes run, whether the
/// circuit breaker engaged, the last classification and the per-attempt trace.
#[derive(Debug, Error)]
pub enum FlowError<E>
where
    E: std::error::Error + 'static,
{
    /// All attempts failed
    #[error("Operation '{operation}' failed after {} attempts: {last_error}", .report.attempts)]
    Exhausted {
        operation: String,
        #[source]
        last_error: E,
        report: FailureReport,
    },

    /// Recovery found the (target, action) circuit open
    #[error("Operation '{operation}' stopped: circuit open for {target}")]
    CircuitOpen {
        operation: String,
        target: String,
        #[source]
        last_error: E,
        report: FailureReport,
    },

    /// Failure class that is never retried
    #[error("Operation '{operation}' hit a non-recoverable {kind} error: {last_error}")]
    NonRecoverable {
        operation: String,
        kind: ErrorKind,
        #[source]
        last_error: E,
        report: FailureReport,
    },

    /// Cancelled through the operation's token
    #[error("Operation '{operation}' cancelled after {} attempts", .report.attempts)]
    Cancelled {
        operation: String,
        last_error: Option<E>,
        report: FailureReport,
    },
}

impl<E> FlowError<E>
where
    E: std::error::Error + 'static,
{
    pub fn report(&self) -> &FailureReport {
        match self {
            FlowError::Exhausted { report, .. }
            | FlowError::CircuitOpen { report, .. }
            | FlowError::NonRecoverable { report, .. }
            | FlowError::Cancelled { report, .. } => report,
        }
    }

    pub fn last_error(&self) -> Option<&E> {
        match self {
            FlowError::Exhausted { last_error, .. }
            | FlowError::CircuitOpen { last_error, .. }
            | FlowError::NonRecoverable { last_error, .. } => Some(last_error),
            FlowError::Cancelled { last_error, .. } => last_error.as_ref(),
        }
    }

    pub fn into_last_error(self) -> Option<E> {
        match self {
            FlowError::Exhausted { last_error, .. }
            | FlowError::CircuitOpen { last_error, .. }
            | FlowError::NonRecoverable { last_error, .. } => Some(last_error),
            FlowError::Cancelled { last_error, .. } => last_error,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.report().attempts
    }

    pub fn circuit_breaker_engaged(&self) -> bool {
        self.report().circuit_breaker_engaged
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FlowError::Cancelled { .. })
    }

    /// Check if the caller may reasonably try the whole operation again later
    pub fn is_retryable(&self) -> bool {
        matches!(self, FlowError::Exhausted { .. } | FlowError::CircuitOpen { .. })
    }
}
