use std::sync::Arc;

use resilience_core_types::fake::{element, FakeDriver};
use resilience_engine::*;
use resilience_recovery::ContextMap;
use serde_json::json;
use serial_test::serial;
use tempfile::TempDir;

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct ClickError(String);

fn checkout_page() -> FakeDriver {
    let mut hidden = element("old", "button");
    hidden.visible = false;
    FakeDriver::new()
        .with_element(hidden)
        .with_element(element("new", "button"))
        .map_css(".submit-button", "old")
        .map_css("#submit", "new")
}

fn engine(fake: FakeDriver) -> ResilienceEngine {
    ResilienceEngine::new(ResilienceConfig::default(), Arc::new(fake)).unwrap()
}

#[tokio::test]
async fn locate_heals_to_visible_alternative() {
    let engine = engine(checkout_page());
    let mut rx = engine.subscribe();
    let descriptor = SelectorDescriptor::new(".submit-button").with_alternatives(["#submit"]);

    let found = engine.locate(&descriptor).await.unwrap();
    assert_eq!(found.handle.0, "new");
    assert_eq!(found.strategy.name(), "alternative-selector");

    let mut saw_found = false;
    while let Ok(event) = rx.try_recv() {
        if let EngineEvent::ElementFound { selector, .. } = event {
            assert_eq!(selector, ".submit-button");
            saw_found = true;
        }
    }
    assert!(saw_found);
}

#[tokio::test(start_paused = true)]
async fn execute_retries_click_with_healed_selector() {
    let engine = engine(checkout_page());
    let descriptor = SelectorDescriptor::new(".submit-button").with_alternatives(["#submit"]);
    let op = OperationContext::new("click-submit").with_descriptor(descriptor);
    let mut attempts = 0;

    let clicked = engine
        .execute(op, |ctx| {
            attempts += 1;
            let selector = ctx.selector().unwrap_or_default().to_string();
            async move {
                if selector == "#submit" {
                    Ok(selector)
                } else {
                    Err(ClickError(format!(
                        "Element not found for selector: {selector}"
                    )))
                }
            }
        })
        .await
        .unwrap();

    assert_eq!(clicked, "#submit");
    assert_eq!(attempts, 2);
    let stats = engine.controller().stats("click-submit").unwrap();
    assert_eq!(stats.recoveries, 1);
    assert!(!engine.history().is_empty());
}

#[tokio::test]
async fn report_is_sanitized_and_retrievable() {
    let engine = engine(FakeDriver::new());
    let context = json!({"url": "https://admin.test", "token": "abc", "user": "ada"})
        .as_object()
        .cloned()
        .unwrap_or_else(ContextMap::new);

    let report = engine.report(&Failure::new("403 Forbidden"), &context);
    assert_eq!(report.classification.kind, ErrorKind::PermissionDenied);
    assert_eq!(report.context, json!({"url": "https://admin.test", "user": "ada"}));

    let stored = engine.diagnostics().get(&report.error_id.0).unwrap();
    assert_eq!(stored, report);
}

#[test]
fn invalid_config_is_rejected() {
    let mut config = ResilienceConfig::default();
    config.retry.max_attempts = 0;
    let result = ResilienceEngine::new(config, Arc::new(FakeDriver::new()));
    assert!(matches!(result, Err(EngineError::Config(_))));
}

#[test]
#[serial]
fn from_path_layers_file_and_env() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("resilience.yaml");
    std::fs::write(&path, "retry:\n  max_attempts: 3\nvisual:\n  similarity_threshold: 0.9\n").unwrap();

    std::env::set_var("RESILIENCE__CIRCUIT_BREAKER__FAILURE_THRESHOLD", "4");
    let result = ResilienceEngine::from_path(Some(&path), Arc::new(FakeDriver::new()));
    std::env::remove_var("RESILIENCE__CIRCUIT_BREAKER__FAILURE_THRESHOLD");

    let engine = result.unwrap();
    assert_eq!(engine.config().retry.max_attempts, 3);
    assert_eq!(engine.config().visual.similarity_threshold, 0.9);
    assert_eq!(engine.breaker().settings().failure_threshold, 4);
    assert_eq!(engine.controller().policy().max_attempts, 3);
}
