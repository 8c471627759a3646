//! Flat recognized-options map (`maxRetryAttempts`, `baseRetryDelay`, ...)

use std::collections::HashMap;

use serde_json::Value;

use crate::errors::ConfigError;
use crate::loader::apply_override;
use crate::model::{ConfigSource, ResilienceConfig};

/// Option name → dotted config paths it sets
const RECOGNIZED: &[(&str, &[&str])] = &[
    ("maxRetryAttempts", &["retry.max_attempts"]),
    ("baseRetryDelay", &["retry.base_delay_ms"]),
    ("maxRetryDelay", &["retry.max_delay_ms"]),
    ("backoffFactor", &["retry.backoff_factor"]),
    ("jitterFraction", &["retry.jitter_fraction"]),
    ("confidenceThreshold", &["classifier.confidence_threshold"]),
    ("visualSimilarityThreshold", &["visual.similarity_threshold"]),
    ("semanticSimilarityThreshold", &["semantic.similarity_threshold"]),
    ("maxVisualCandidates", &["visual.max_candidates"]),
    ("circuitBreakerThreshold", &["circuit_breaker.failure_threshold"]),
    ("circuitBreakerWindow", &["circuit_breaker.window_ms"]),
    ("cacheSize", &["visual.cache_size", "semantic.cache_size"]),
    ("visualCacheSize", &["visual.cache_size"]),
    ("semanticCacheSize", &["semantic.cache_size"]),
    ("historyRetentionDays", &["history.retention_days"]),
    ("maxDiagnosticReports", &["diagnostics.max_reports"]),
    ("minTimeout", &["timing.min_timeout_ms"]),
    ("maxTimeout", &["timing.max_timeout_ms"]),
    ("waitDelay", &["recovery.wait_delay_ms"]),
];

pub fn recognized_options() -> impl Iterator<Item = &'static str> {
    RECOGNIZED.iter().map(|(name, _)| *name)
}

impl ResilienceConfig {
    /// Apply a flat options map; unknown keys are rejected before anything changes
    pub fn apply_options(&mut self, options: &HashMap<String, Value>) -> Result<(), ConfigError> {
        let mut resolved = Vec::with_capacity(options.len());
        for (key, value) in options {
            let paths = RECOGNIZED
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, paths)| *paths)
                .ok_or_else(|| ConfigError::UnknownOption(key.clone()))?;
            resolved.push((paths, value));
        }

        let mut candidate = self.clone();
        for (paths, value) in resolved {
            for path in paths {
                apply_override(&mut candidate, path, value, ConfigSource::Options)?;
            }
        }
        candidate.validate()?;
        *self = candidate;
        Ok(())
    }

    pub fn from_options(options: &HashMap<String, Value>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_options(options)?;
        Ok(config)
    }
}
