//! Shared primitives for the resilience engine crates.
//!
//! - `driver`: the browser driver boundary every strategy talks to
//! - `call`: timeout bounds around individual driver calls
//! - `history`: success/attempt counters used to re-rank strategies
//! - `errors`: driver-level failures

pub mod call;
pub mod driver;
pub mod errors;
pub mod history;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use call::bounded;
pub use driver::*;
pub use errors::DriverError;
pub use history::{OutcomeHistory, OutcomeStats, RankedEntry, StrategyStatsSnapshot};

use std::fmt;

use uuid::Uuid;

/// Identifier attached to every handled error and its diagnostic report.
#[derive(Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ErrorId(pub String);

impl ErrorId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ErrorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ErrorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
