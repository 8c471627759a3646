//! Mapping from the flat configuration model onto per-component settings

use std::time::Duration;

use action_locator::LocatorSettings;
use adaptive_timing::{StabilitySettings, TimingSettings};
use matcher_semantic::SemanticMatchSettings;
use matcher_visual::VisualMatchSettings;
use resilience_config::ResilienceConfig;
use resilience_recovery::{
    CircuitSettings, ClassifierSettings, DiagnosticsSettings, RecoverySettings, RetryPolicy,
};

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

pub fn retry_policy(config: &ResilienceConfig) -> RetryPolicy {
    let retry = &config.retry;
    RetryPolicy::new(retry.max_attempts, retry.base_delay(), retry.max_delay())
        .with_factor(retry.backoff_factor)
        .with_jitter(retry.jitter_fraction)
}

pub fn classifier_settings(config: &ResilienceConfig) -> ClassifierSettings {
    ClassifierSettings {
        base_confidence: config.classifier.base_confidence,
        history_window: config.classifier.history_window,
    }
}

pub fn diagnostics_settings(config: &ResilienceConfig) -> DiagnosticsSettings {
    DiagnosticsSettings {
        max_reports: config.diagnostics.max_reports,
        confidence_threshold: config.classifier.confidence_threshold,
        recurrence_threshold: config.diagnostics.recurrence_threshold,
    }
}

pub fn recovery_settings(config: &ResilienceConfig) -> RecoverySettings {
    let recovery = &config.recovery;
    RecoverySettings {
        wait_delay: ms(recovery.wait_delay_ms),
        timeout_multiplier: recovery.timeout_multiplier,
        default_timeout: ms(recovery.default_timeout_ms),
        max_timeout: ms(recovery.max_timeout_ms),
        stability: StabilitySettings {
            threshold: recovery.stability_threshold,
            settle: ms(recovery.stability_settle_ms),
            timeout: ms(recovery.stability_timeout_ms),
            poll: ms(recovery.stability_poll_ms),
        },
        driver_call_timeout: ms(recovery.default_timeout_ms),
    }
}

pub fn circuit_settings(config: &ResilienceConfig) -> CircuitSettings {
    let breaker = &config.circuit_breaker;
    CircuitSettings {
        failure_threshold: breaker.failure_threshold,
        window: breaker.window(),
        ring_capacity: breaker.ring_capacity,
    }
}

pub fn locator_settings(config: &ResilienceConfig) -> LocatorSettings {
    LocatorSettings {
        fuzzy_threshold: config.locator.fuzzy_threshold,
        healing_log_size: config.locator.healing_log_size,
        ..Default::default()
    }
}

pub fn visual_settings(config: &ResilienceConfig) -> VisualMatchSettings {
    let visual = &config.visual;
    VisualMatchSettings {
        similarity_threshold: visual.similarity_threshold,
        max_candidates: visual.max_candidates,
        cache_size: visual.cache_size,
        cache_ttl: ms(visual.cache_ttl_ms),
    }
}

pub fn semantic_settings(config: &ResilienceConfig) -> SemanticMatchSettings {
    let semantic = &config.semantic;
    SemanticMatchSettings {
        similarity_threshold: semantic.similarity_threshold,
        cache_size: semantic.cache_size,
        cache_ttl: ms(semantic.cache_ttl_ms),
    }
}

pub fn timing_settings(config: &ResilienceConfig) -> TimingSettings {
    let timing = &config.timing;
    TimingSettings {
        min_timeout: ms(timing.min_timeout_ms),
        max_timeout: ms(timing.max_timeout_ms),
        network_refresh: ms(timing.network_refresh_ms),
        complexity_min_interval: ms(timing.complexity_min_interval_ms),
        history_max_entries: timing.history_max_entries,
        history_min_samples: config.history.min_samples as usize,
        history_retention: history_retention(config),
    }
}

pub fn history_retention(config: &ResilienceConfig) -> chrono::Duration {
    chrono::Duration::days(i64::from(config.history.retention_days))
}
