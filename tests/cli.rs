use assert_cmd::Command;
use serde_json::Value;
use tempfile::TempDir;

fn resilience() -> Command {
    let mut cmd = Command::cargo_bin("resilience").unwrap();
    cmd.env_remove("RESILIENCE_OVERRIDE_JSON");
    cmd
}

fn json_stdout(cmd: &mut Command) -> Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).unwrap()
}

#[test]
fn classify_prints_classification_and_report() {
    let value = json_stdout(resilience().args([
        "--output",
        "json",
        "classify",
        "Element not found for selector: .submit-button",
        "--context",
        r#"{"selector": ".submit-button", "password": "x"}"#,
    ]));

    assert_eq!(value["classification"]["kind"], "element-not-found");
    assert!(value["classification"]["confidence"].as_f64().unwrap() >= 0.8);
    assert_eq!(value["report"]["context"]["selector"], ".submit-button");
    assert!(value["report"]["context"].get("password").is_none());
}

#[test]
fn classify_rejects_non_object_context() {
    resilience()
        .args(["classify", "boom", "--context", "[1]"])
        .assert()
        .failure();
}

#[test]
fn backoff_prints_schedule() {
    let value = json_stdout(resilience().args([
        "-o", "json", "backoff", "--attempts", "4", "--jitter", "0",
    ]));
    let nominal = value
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["nominal_ms"].as_u64().unwrap())
        .collect::<Vec<_>>();
    assert_eq!(nominal, vec![1_000, 2_000, 4_000]);
}

#[test]
fn config_reflects_file_and_env_overlays() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("resilience.yaml");
    std::fs::write(&path, "retry:\n  max_attempts: 3\n  base_delay_ms: 250\n").unwrap();

    let value = json_stdout(
        resilience()
            .env("RESILIENCE__RETRY__MAX_ATTEMPTS", "8")
            .arg("--config")
            .arg(&path)
            .args(["-o", "json", "config", "--section", "retry"]),
    );
    assert_eq!(value["max_attempts"], 8);
    assert_eq!(value["base_delay_ms"], 250);
}

#[test]
fn config_lists_recognized_options() {
    let value = json_stdout(resilience().args(["-o", "json", "config", "--options"]));
    let keys = value.as_array().unwrap();
    assert!(keys.iter().any(|k| k == "maxRetryAttempts"));
    assert!(keys.iter().any(|k| k == "circuitBreakerWindow"));
}
