//! Adaptive timing controller.
//!
//! Predicts how long to wait before declaring an action failed:
//! `timeout = baseline(kind) × network × complexity × history × context`, clamped to the configured
//! bounds. Network and page measurements are cached so a burst of lookups does not hammer the
//! driver, and observed outcomes feed back into the history multiplier.

pub mod config;
pub mod controller;
pub mod errors;
pub mod history;
pub mod multipliers;
pub mod stability;
pub mod types;

pub use config::TimingSettings;
pub use controller::AdaptiveTimingController;
pub use errors::TimingError;
pub use history::{HistorySummary, TimingHistory, TimingSample};
pub use stability::{wait_for_stability, StabilityReport, StabilitySettings};
pub use types::*;
