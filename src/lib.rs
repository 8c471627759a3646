//! Resilience engine for browser automation
//!
//! Wires the classifier, recovery executor, retry controller, self-healing locator, adaptive
//! timing and the visual/semantic matchers together from one [`ResilienceConfig`]. Each
//! component also lives in its own crate and can be used on its own.

pub mod engine;
pub mod errors;
pub mod settings;

pub use engine::ResilienceEngine;
pub use errors::EngineError;

pub use action_flow::{FlowError, OperationContext, RetryController, RetryNotice, RetryObserver};
pub use action_locator::{LocatedElement, LocatorError, SelectorDescriptor, SelfHealingLocator};
pub use adaptive_timing::{ActionKind, AdaptiveTimingController};
pub use resilience_config::{load_config, ResilienceConfig};
pub use resilience_core_types::{BrowserDriver, DriverError};
pub use resilience_event_bus::EngineEvent;
pub use resilience_recovery::{
    DiagnosticReport, ErrorClassification, ErrorHandler, ErrorKind, Failure, HandledError,
    RecoveryContext, RetryPolicy,
};
