//! Retry controller for resilient browser operations
//!
//! Wraps a fallible async operation with classification, recovery between attempts, exponential
//! backoff with jitter, and a per-(target, action) circuit breaker. Failures surface as a typed
//! [`FlowError`] carrying the last error and a per-attempt trace.

pub mod controller;
pub mod errors;
pub mod observer;
pub mod types;

pub use controller::{RetryController, DEFAULT_STATS_CAPACITY};
pub use errors::FlowError;
pub use observer::{RetryObserver, TracingObserver};
pub use types::{
    AttemptContext, AttemptRecord, FailureReport, OperationContext, OperationStats, RetryNotice,
};
