use std::collections::HashMap;
use std::env;

use serde_json::json;
use serial_test::serial;

use crate::defaults::default_config;
use crate::loader::{load_config, load_config_with_options, LoadOptions};
use crate::model::ConfigSource;
use crate::options::recognized_options;
use crate::ConfigError;

#[test]
fn defaults_are_sane() {
    let config = default_config();
    assert_eq!(config.retry.max_attempts, 5);
    assert_eq!(config.retry.base_delay_ms, 1_000);
    assert_eq!(config.retry.backoff_factor, 2.0);
    assert_eq!(config.circuit_breaker.failure_threshold, 5);
    assert_eq!(config.circuit_breaker.window_ms, 600_000);
    assert_eq!(config.diagnostics.max_reports, 1_000);
    config.validate().unwrap();
}

#[test]
#[serial]
fn yaml_file_overrides_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("resilience.yaml");
    std::fs::write(
        &file_path,
        r#"retry:
  max_attempts: 3
  base_delay_ms: 250
visual:
  similarity_threshold: 0.75
"#,
    )
    .unwrap();

    let config = load_config(Some(&file_path)).unwrap();
    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(config.retry.base_delay_ms, 250);
    assert_eq!(config.retry.max_delay_ms, 30_000);
    assert_eq!(config.visual.similarity_threshold, 0.75);
    assert_eq!(
        config.provenance.get("retry.max_attempts"),
        Some(&ConfigSource::File)
    );
}

#[test]
#[serial]
fn env_overrides_win_over_file() {
    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("resilience.yaml");
    std::fs::write(&file_path, "retry:\n  max_attempts: 3\n").unwrap();

    env::set_var("RESILIENCE__RETRY__MAX_ATTEMPTS", "7");
    let result = load_config_with_options(&LoadOptions::with_path(&file_path));
    env::remove_var("RESILIENCE__RETRY__MAX_ATTEMPTS");

    let config = result.unwrap();
    assert_eq!(config.retry.max_attempts, 7);
    assert_eq!(
        config.provenance.get("retry.max_attempts"),
        Some(&ConfigSource::Env)
    );
}

#[test]
#[serial]
fn unknown_path_is_rejected() {
    env::set_var("RESILIENCE__RETRY__NOT_A_FIELD", "1");
    let result = load_config(None);
    env::remove_var("RESILIENCE__RETRY__NOT_A_FIELD");
    assert!(matches!(result, Err(ConfigError::UnsupportedPath(_))));
}

#[test]
#[serial]
fn invalid_values_fail_validation() {
    env::set_var("RESILIENCE_OVERRIDE_JSON", r#"{"retry": {"jitter_fraction": 1.5}}"#);
    let result = load_config(None);
    env::remove_var("RESILIENCE_OVERRIDE_JSON");
    assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
}

#[test]
fn options_map_sets_camel_case_keys() {
    let mut options = HashMap::new();
    options.insert("maxRetryAttempts".to_string(), json!(2));
    options.insert("baseRetryDelay".to_string(), json!(10));
    options.insert("cacheSize".to_string(), json!(42));
    options.insert("circuitBreakerWindow".to_string(), json!(60_000));

    let mut config = default_config();
    config.apply_options(&options).unwrap();
    assert_eq!(config.retry.max_attempts, 2);
    assert_eq!(config.retry.base_delay_ms, 10);
    assert_eq!(config.visual.cache_size, 42);
    assert_eq!(config.semantic.cache_size, 42);
    assert_eq!(config.circuit_breaker.window_ms, 60_000);
    assert_eq!(
        config.provenance.get("visual.cache_size"),
        Some(&ConfigSource::Options)
    );
}

#[test]
fn options_map_rejects_unknown_keys_without_partial_update() {
    let mut options = HashMap::new();
    options.insert("maxRetryAttempts".to_string(), json!(2));
    options.insert("retryForever".to_string(), json!(true));

    let mut config = default_config();
    let err = config.apply_options(&options).unwrap_err();
    assert!(matches!(err, ConfigError::UnknownOption(key) if key == "retryForever"));
    assert_eq!(config.retry.max_attempts, 5);
}

#[test]
fn options_map_type_mismatch_is_reported() {
    let mut options = HashMap::new();
    options.insert("maxRetryAttempts".to_string(), json!("lots"));
    let err = crate::ResilienceConfig::from_options(&options).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { path, .. } if path == "retry.max_attempts"));
}

#[test]
fn recognized_options_cover_the_documented_surface() {
    let names = recognized_options().collect::<Vec<_>>();
    for expected in [
        "maxRetryAttempts",
        "baseRetryDelay",
        "maxRetryDelay",
        "backoffFactor",
        "jitterFraction",
        "confidenceThreshold",
        "visualSimilarityThreshold",
        "circuitBreakerThreshold",
        "circuitBreakerWindow",
        "cacheSize",
        "historyRetentionDays",
    ] {
        assert!(names.contains(&expected), "missing {expected}");
    }
}
