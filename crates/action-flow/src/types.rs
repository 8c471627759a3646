//! Retry controller types

use std::time::Duration;

use action_locator::SelectorDescriptor;
use chrono::{DateTime, Utc};
use resilience_recovery::{ContextMap, ErrorClassification, ErrorKind, RecoveryAction, RetryPolicy};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Named operation wrapped by the retry controller
///
/// `values` is the shared context recovery strategies read and mutate between attempts (keys
/// such as `selector`, `alternatives`, `url`, `action`, `timeout`).
#[derive(Debug, Clone)]
pub struct OperationContext {
    /// Operation name, used for stats and events
    pub name: String,

    /// Shared context handed to every attempt and to recovery
    pub values: ContextMap,

    /// Element the operation targets, if any
    pub descriptor: Option<SelectorDescriptor>,

    /// Cancellation for the whole retry loop
    pub cancel: CancellationToken,

    /// Overrides the controller's policy for this operation
    pub policy: Option<RetryPolicy>,
}

impl OperationContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: ContextMap::new(),
            descriptor: None,
            cancel: CancellationToken::new(),
            policy: None,
        }
    }

    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn with_values(mut self, values: ContextMap) -> Self {
        self.values.extend(values);
        self
    }

    /// Target URL; keys the circuit breaker together with `action`
    pub fn with_target(self, url: impl Into<String>) -> Self {
        self.with_value("url", Value::String(url.into()))
    }

    pub fn with_action(self, action: impl Into<String>) -> Self {
        self.with_value("action", Value::String(action.into()))
    }

    /// Element descriptor; its primary selector and alternatives are mirrored into the context
    pub fn with_descriptor(mut self, descriptor: SelectorDescriptor) -> Self {
        self.values
            .insert("selector".into(), Value::String(descriptor.primary.clone()));
        if !descriptor.css.is_empty() {
            self.values.insert(
                "alternatives".into(),
                Value::Array(
                    descriptor
                        .css
                        .iter()
                        .cloned()
                        .map(Value::String)
                        .collect(),
                ),
            );
        }
        self.descriptor = Some(descriptor);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = Some(policy);
        self
    }
}

/// What an attempt sees: its number and the context as left by previous recoveries
#[derive(Debug, Clone)]
pub struct AttemptContext {
    /// 1-based
    pub attempt: u32,
    pub values: ContextMap,
    pub cancel: CancellationToken,
}

impl AttemptContext {
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn selector(&self) -> Option<&str> {
        self.str_field("selector")
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.values
            .get("timeout")
            .and_then(Value::as_u64)
            .map(Duration::from_millis)
    }
}

/// One entry of the per-attempt trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub success: bool,
    pub error: Option<String>,
    pub kind: Option<ErrorKind>,
    pub recovery_strategy: Option<String>,
    pub recovery_action: Option<RecoveryAction>,
    pub recovered: bool,
    /// Backoff slept after this attempt
    #[serde(with = "duration_ms")]
    pub delay: Duration,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
}

impl AttemptRecord {
    pub(crate) fn succeeded(attempt: u32, duration: Duration) -> Self {
        Self {
            attempt,
            success: true,
            error: None,
            kind: None,
            recovery_strategy: None,
            recovery_action: None,
            recovered: false,
            delay: Duration::ZERO,
            duration,
        }
    }

    pub(crate) fn failed(attempt: u32, error: String, duration: Duration) -> Self {
        Self {
            attempt,
            success: false,
            error: Some(error),
            kind: None,
            recovery_strategy: None,
            recovery_action: None,
            recovered: false,
            delay: Duration::ZERO,
            duration,
        }
    }
}

/// Summary attached to every [`FlowError`](crate::FlowError)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    pub attempts: u32,
    pub recovery_attempts: u32,
    pub circuit_breaker_engaged: bool,
    pub classification: Option<ErrorClassification>,
    pub trace: Vec<AttemptRecord>,
}

/// Sent to observers once per scheduled retry
#[derive(Debug, Clone, PartialEq)]
pub struct RetryNotice {
    pub operation: String,
    /// Attempt that just failed
    pub attempt: u32,
    pub max_attempts: u32,
    pub delay: Duration,
    pub recovered: bool,
    pub error: String,
    pub kind: ErrorKind,
}

/// Per-operation counters kept by the controller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationStats {
    pub calls: u64,
    pub successes: u64,
    pub failures: u64,
    pub retries: u64,
    pub recoveries: u64,
    pub circuit_breaks: u64,
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
}

impl OperationStats {
    pub fn success_rate(&self) -> f64 {
        if self.calls == 0 {
            return 0.0;
        }
        self.successes as f64 / self.calls as f64
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
