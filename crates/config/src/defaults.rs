use std::collections::BTreeMap;

use crate::model::{
    CircuitBreakerSettings, ClassifierSettings, DiagnosticsSettings, EventSettings,
    HistorySettings, LocatorSettings, RecoverySettings, ResilienceConfig, RetrySettings,
    SemanticSettings, TimingSettings, VisualSettings,
};

pub fn default_config() -> ResilienceConfig {
    ResilienceConfig {
        retry: RetrySettings::default(),
        classifier: ClassifierSettings::default(),
        recovery: RecoverySettings::default(),
        circuit_breaker: CircuitBreakerSettings::default(),
        locator: LocatorSettings::default(),
        visual: VisualSettings::default(),
        semantic: SemanticSettings::default(),
        timing: TimingSettings::default(),
        history: HistorySettings::default(),
        diagnostics: DiagnosticsSettings::default(),
        events: EventSettings::default(),
        provenance: BTreeMap::new(),
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        default_config()
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_factor: 2.0,
            jitter_fraction: 0.1,
        }
    }
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            base_confidence: 0.5,
            history_window: 100,
        }
    }
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            wait_delay_ms: 1_000,
            timeout_multiplier: 1.5,
            default_timeout_ms: 30_000,
            max_timeout_ms: 120_000,
            stability_threshold: 5.0,
            stability_settle_ms: 500,
            stability_timeout_ms: 10_000,
            stability_poll_ms: 100,
        }
    }
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            window_ms: 10 * 60 * 1_000,
            ring_capacity: 32,
        }
    }
}

impl Default for LocatorSettings {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.6,
            healing_log_size: 20,
        }
    }
}

impl Default for VisualSettings {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.8,
            max_candidates: 5,
            cache_size: 100,
            cache_ttl_ms: 30_000,
        }
    }
}

impl Default for SemanticSettings {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.6,
            cache_size: 500,
            cache_ttl_ms: 60_000,
        }
    }
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            min_timeout_ms: 1_000,
            max_timeout_ms: 60_000,
            network_refresh_ms: 30_000,
            complexity_min_interval_ms: 5_000,
            history_max_entries: 100,
        }
    }
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            retention_days: 30,
            min_samples: 3,
            max_shift: 1.5,
        }
    }
}

impl Default for DiagnosticsSettings {
    fn default() -> Self {
        Self {
            max_reports: 1_000,
            recurrence_threshold: 3,
        }
    }
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}
