use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResilienceConfig {
    pub retry: RetrySettings,
    pub classifier: ClassifierSettings,
    pub recovery: RecoverySettings,
    pub circuit_breaker: CircuitBreakerSettings,
    pub locator: LocatorSettings,
    pub visual: VisualSettings,
    pub semantic: SemanticSettings,
    pub timing: TimingSettings,
    pub history: HistorySettings,
    pub diagnostics: DiagnosticsSettings,
    pub events: EventSettings,
    /// Where each overridden value came from, keyed by dotted path
    #[serde(skip)]
    pub provenance: BTreeMap<String, ConfigSource>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
    pub jitter_fraction: f64,
}

impl RetrySettings {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClassifierSettings {
    /// Classifications below this confidence are reported as low-confidence in diagnostics
    pub confidence_threshold: f64,
    /// Starting confidence; unmatched failures keep exactly this value
    pub base_confidence: f64,
    /// Recent classifications retained for recurrence detection
    pub history_window: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecoverySettings {
    /// Fixed delay used by wait-and-retry
    pub wait_delay_ms: u64,
    pub timeout_multiplier: f64,
    pub default_timeout_ms: u64,
    pub max_timeout_ms: u64,
    /// Mutations per second below which the DOM counts as settled
    pub stability_threshold: f64,
    pub stability_settle_ms: u64,
    pub stability_timeout_ms: u64,
    pub stability_poll_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: usize,
    pub window_ms: u64,
    /// Failure timestamps retained per (target, action) key
    pub ring_capacity: usize,
}

impl CircuitBreakerSettings {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LocatorSettings {
    /// Minimum text similarity accepted by the fuzzy strategy
    pub fuzzy_threshold: f64,
    /// Successful heals kept per selector
    pub healing_log_size: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VisualSettings {
    pub similarity_threshold: f64,
    pub max_candidates: usize,
    pub cache_size: usize,
    pub cache_ttl_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SemanticSettings {
    pub similarity_threshold: f64,
    pub cache_size: usize,
    pub cache_ttl_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimingSettings {
    pub min_timeout_ms: u64,
    pub max_timeout_ms: u64,
    pub network_refresh_ms: u64,
    pub complexity_min_interval_ms: u64,
    /// Samples kept per action kind
    pub history_max_entries: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HistorySettings {
    pub retention_days: u32,
    pub min_samples: u64,
    /// Maximum priority shift learned history may apply
    pub max_shift: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiagnosticsSettings {
    pub max_reports: usize,
    /// Same-kind errors within the recent window that trigger a recurrence recommendation
    pub recurrence_threshold: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EventSettings {
    pub channel_capacity: usize,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    Builtin,
    File,
    Env,
    Options,
}

impl ResilienceConfig {
    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let retry = &self.retry;
        if retry.max_attempts == 0 {
            return Err(ConfigError::invalid_value("retry.max_attempts", "must be >= 1"));
        }
        if retry.base_delay_ms > retry.max_delay_ms {
            return Err(ConfigError::invalid_value(
                "retry.base_delay_ms",
                "must not exceed retry.max_delay_ms",
            ));
        }
        if !(retry.backoff_factor >= 1.0) {
            return Err(ConfigError::invalid_value("retry.backoff_factor", "must be >= 1.0"));
        }
        check_unit("retry.jitter_fraction", retry.jitter_fraction)?;
        check_unit("classifier.confidence_threshold", self.classifier.confidence_threshold)?;
        check_unit("classifier.base_confidence", self.classifier.base_confidence)?;
        check_unit("visual.similarity_threshold", self.visual.similarity_threshold)?;
        check_unit("semantic.similarity_threshold", self.semantic.similarity_threshold)?;
        check_unit("locator.fuzzy_threshold", self.locator.fuzzy_threshold)?;
        if self.recovery.timeout_multiplier < 1.0 {
            return Err(ConfigError::invalid_value(
                "recovery.timeout_multiplier",
                "must be >= 1.0",
            ));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::invalid_value(
                "circuit_breaker.failure_threshold",
                "must be >= 1",
            ));
        }
        if self.circuit_breaker.window_ms == 0 {
            return Err(ConfigError::invalid_value("circuit_breaker.window_ms", "must be > 0"));
        }
        if self.circuit_breaker.ring_capacity < self.circuit_breaker.failure_threshold {
            return Err(ConfigError::invalid_value(
                "circuit_breaker.ring_capacity",
                "must hold at least failure_threshold entries",
            ));
        }
        if self.timing.min_timeout_ms > self.timing.max_timeout_ms {
            return Err(ConfigError::invalid_value(
                "timing.min_timeout_ms",
                "must not exceed timing.max_timeout_ms",
            ));
        }
        for (path, size) in [
            ("visual.cache_size", self.visual.cache_size),
            ("semantic.cache_size", self.semantic.cache_size),
            ("diagnostics.max_reports", self.diagnostics.max_reports),
            ("timing.history_max_entries", self.timing.history_max_entries),
            ("events.channel_capacity", self.events.channel_capacity),
        ] {
            if size == 0 {
                return Err(ConfigError::invalid_value(path, "must be > 0"));
            }
        }
        Ok(())
    }
}

fn check_unit(path: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid_value(path, "must be within [0, 1]"))
    }
}
