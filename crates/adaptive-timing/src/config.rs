use std::time::Duration;

/// Timing controller configuration.
#[derive(Clone, Debug)]
pub struct TimingSettings {
    pub min_timeout: Duration,
    pub max_timeout: Duration,
    /// How long a network sample stays valid.
    pub network_refresh: Duration,
    /// Minimum spacing between two page-complexity reads.
    pub complexity_min_interval: Duration,
    /// Samples kept per action kind.
    pub history_max_entries: usize,
    /// Samples needed before history affects the timeout.
    pub history_min_samples: usize,
    pub history_retention: chrono::Duration,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            min_timeout: Duration::from_millis(1_000),
            max_timeout: Duration::from_millis(60_000),
            network_refresh: Duration::from_millis(30_000),
            complexity_min_interval: Duration::from_millis(5_000),
            history_max_entries: 100,
            history_min_samples: 3,
            history_retention: chrono::Duration::days(30),
        }
    }
}

impl TimingSettings {
    /// Bound applied to the controller's own driver calls.
    pub fn driver_call_timeout(&self) -> Duration {
        self.min_timeout
    }
}
