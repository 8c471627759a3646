//! Error classification and recovery
//!
//! - `classifier`: raw failure + context → typed, confidence-scored classification
//! - `executor`: per-kind recovery strategies run in history-adjusted priority order
//! - `backoff` / `circuit`: retry delay math and the sliding-window circuit breaker
//! - `diagnostics`: sanitized reports kept in a rolling window
//! - `handler`: the classify → recover → report pipeline

pub mod backoff;
pub mod circuit;
pub mod classifier;
pub mod diagnostics;
pub mod errors;
pub mod executor;
pub mod handler;
pub mod strategies;
pub mod types;

pub use backoff::RetryPolicy;
pub use circuit::{CircuitBreaker, CircuitSettings, CircuitState};
pub use classifier::{ClassifierSettings, ClassifierStats, ErrorClassifier, PatternGroup, PatternSet};
pub use diagnostics::{
    sanitize, DiagnosticReport, DiagnosticsSettings, DiagnosticsStore, Recommendation,
    RecommendationPriority,
};
pub use errors::RecoveryError;
pub use executor::{
    BuiltinDeps, RecoveryExecutor, RecoveryReport, RecoverySettings, StrategyRegistry,
    StrategyRun, EXHAUSTED_REASON,
};
pub use handler::{ErrorHandler, HandledError};
pub use strategies::RecoveryStrategy;
pub use types::*;
