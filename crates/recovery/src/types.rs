//! Core types for classification and recovery

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use action_locator::SelectorDescriptor;
use resilience_core_types::OutcomeStats;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::backoff::RetryPolicy;

/// Free-form context attached to a failure (`selector`, `action`, `url`, `timeout`, ...)
pub type ContextMap = serde_json::Map<String, Value>;

/// Closed set of failure kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    ElementNotFound,
    Timeout,
    NetworkError,
    PermissionDenied,
    PageError,
    DataError,
    ResourceError,
    Unknown,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 8] = [
        ErrorKind::ElementNotFound,
        ErrorKind::Timeout,
        ErrorKind::NetworkError,
        ErrorKind::PermissionDenied,
        ErrorKind::PageError,
        ErrorKind::DataError,
        ErrorKind::ResourceError,
        ErrorKind::Unknown,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ElementNotFound => "element-not-found",
            ErrorKind::Timeout => "timeout",
            ErrorKind::NetworkError => "network-error",
            ErrorKind::PermissionDenied => "permission-denied",
            ErrorKind::PageError => "page-error",
            ErrorKind::DataError => "data-error",
            ErrorKind::ResourceError => "resource-error",
            ErrorKind::Unknown => "unknown",
        }
    }

    pub const fn category(self) -> ErrorCategory {
        match self {
            ErrorKind::ElementNotFound => ErrorCategory::Element,
            ErrorKind::Timeout => ErrorCategory::Timing,
            ErrorKind::NetworkError => ErrorCategory::Network,
            ErrorKind::PermissionDenied => ErrorCategory::Security,
            ErrorKind::PageError => ErrorCategory::Browser,
            ErrorKind::DataError => ErrorCategory::Data,
            ErrorKind::ResourceError => ErrorCategory::System,
            ErrorKind::Unknown => ErrorCategory::Unknown,
        }
    }

    pub const fn severity(self) -> Severity {
        match self {
            ErrorKind::NetworkError
            | ErrorKind::PermissionDenied
            | ErrorKind::PageError
            | ErrorKind::ResourceError => Severity::High,
            ErrorKind::ElementNotFound | ErrorKind::Timeout | ErrorKind::DataError => {
                Severity::Medium
            }
            ErrorKind::Unknown => Severity::Low,
        }
    }

    /// Security failures are never retried
    pub const fn recoverable(self) -> bool {
        !matches!(self.category(), ErrorCategory::Security)
    }

    pub fn common_causes(self) -> &'static [&'static str] {
        match self {
            ErrorKind::ElementNotFound => &[
                "Selector no longer matches after a page redesign",
                "Element rendered late by client-side code",
                "Element hidden behind an overlay or collapsed section",
            ],
            ErrorKind::Timeout => &[
                "Slow network or overloaded server",
                "Page still running scripts or pending requests",
                "Timeout too short for the current page complexity",
            ],
            ErrorKind::NetworkError => &[
                "Connection refused or reset by the server",
                "DNS resolution failure",
                "Client is offline or behind a failing proxy",
            ],
            ErrorKind::PermissionDenied => &[
                "Session expired or credentials revoked",
                "Account lacks access to the resource",
                "Browser permission prompt denied",
            ],
            ErrorKind::PageError => &[
                "Uncaught script error on the page",
                "Navigation interrupted or frame detached",
                "Browser target crashed or closed",
            ],
            ErrorKind::DataError => &[
                "Unexpected response shape",
                "Value could not be parsed into the expected type",
            ],
            ErrorKind::ResourceError => &[
                "Process ran out of memory",
                "Too many open files or tabs",
                "Disk full",
            ],
            ErrorKind::Unknown => &["Unrecognised failure"],
        }
    }

    pub fn suggested_actions(self) -> &'static [&'static str] {
        match self {
            ErrorKind::ElementNotFound => &[
                "Wait for the element and retry",
                "Try alternative selectors",
                "Locate the element by visual or semantic similarity",
            ],
            ErrorKind::Timeout => &["Increase the timeout", "Wait for the page to settle"],
            ErrorKind::NetworkError => &[
                "Retry with exponential backoff",
                "Stop retrying once the circuit breaker trips",
            ],
            ErrorKind::PermissionDenied => &["Re-authenticate", "Escalate to an operator"],
            ErrorKind::PageError => &["Reload the page", "Restart the browser"],
            ErrorKind::DataError => &[
                "Coerce the value into the expected type",
                "Fall back to a default value",
            ],
            ErrorKind::ResourceError => &["Free resources and retry", "Restart the browser"],
            ErrorKind::Unknown => &["Wait and retry", "Inspect the raw failure"],
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        ErrorKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| format!("unknown error kind '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    Element,
    Timing,
    Network,
    Security,
    Browser,
    Data,
    System,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Typed, confidence-scored diagnosis of one failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorClassification {
    pub kind: ErrorKind,
    pub category: ErrorCategory,
    pub severity: Severity,
    pub recoverable: bool,
    pub confidence: f64,
    pub common_causes: Vec<String>,
    pub suggested_actions: Vec<String>,
    /// Pattern that produced the match, if any
    pub matched_pattern: Option<String>,
}

impl ErrorClassification {
    pub fn new(kind: ErrorKind, confidence: f64) -> Self {
        Self {
            kind,
            category: kind.category(),
            severity: kind.severity(),
            recoverable: kind.recoverable(),
            confidence: confidence.clamp(0.0, 1.0),
            common_causes: kind.common_causes().iter().map(|s| s.to_string()).collect(),
            suggested_actions: kind
                .suggested_actions()
                .iter()
                .map(|s| s.to_string())
                .collect(),
            matched_pattern: None,
        }
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.matched_pattern = Some(pattern.into());
        self
    }
}

/// Raw failure as seen by the classifier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub message: String,
    pub stack: Option<String>,
    pub code: Option<String>,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Message from `Display`, stack from the `source()` chain
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut chain = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            chain.push(format!("caused by: {cause}"));
            source = cause.source();
        }
        Self {
            message: err.to_string(),
            stack: (!chain.is_empty()).then(|| chain.join("\n")),
            code: None,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "[{}] {}", code, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// What a recovery outcome asks the caller to do next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecoveryAction {
    Retry,
    UseAlternative,
    IncreaseTimeout,
    RefreshPage,
    RestartBrowser,
    VisualMatch,
    TransformData,
    CircuitBreak,
    Escalate,
}

impl RecoveryAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            RecoveryAction::Retry => "retry",
            RecoveryAction::UseAlternative => "use-alternative",
            RecoveryAction::IncreaseTimeout => "increase-timeout",
            RecoveryAction::RefreshPage => "refresh-page",
            RecoveryAction::RestartBrowser => "restart-browser",
            RecoveryAction::VisualMatch => "visual-match",
            RecoveryAction::TransformData => "transform-data",
            RecoveryAction::CircuitBreak => "circuit-break",
            RecoveryAction::Escalate => "escalate",
        }
    }
}

impl fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Explicit change a strategy wants applied to the shared context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextMutation {
    pub set: BTreeMap<String, Value>,
    pub remove: Vec<String>,
}

impl ContextMutation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: Value) -> Self {
        self.set.insert(key.into(), value);
        self
    }

    pub fn remove(mut self, key: impl Into<String>) -> Self {
        self.remove.push(key.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.remove.is_empty()
    }

    pub fn apply(&self, target: &mut ContextMap) {
        for key in &self.remove {
            target.remove(key);
        }
        for (key, value) in &self.set {
            target.insert(key.clone(), value.clone());
        }
    }
}

/// Result of one recovery strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryOutcome {
    pub success: bool,
    pub action: RecoveryAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mutation: Option<ContextMutation>,
}

impl RecoveryOutcome {
    pub fn success(action: RecoveryAction) -> Self {
        Self {
            success: true,
            action,
            data: None,
            reason: None,
            mutation: None,
        }
    }

    pub fn failure(action: RecoveryAction, reason: impl Into<String>) -> Self {
        Self {
            success: false,
            action,
            data: None,
            reason: Some(reason.into()),
            mutation: None,
        }
    }

    pub fn escalate(reason: impl Into<String>) -> Self {
        Self::failure(RecoveryAction::Escalate, reason)
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_mutation(mut self, mutation: ContextMutation) -> Self {
        self.mutation = (!mutation.is_empty()).then_some(mutation);
        self
    }

    pub fn is_circuit_break(&self) -> bool {
        self.action == RecoveryAction::CircuitBreak
    }
}

/// Immutable view handed to every recovery strategy
#[derive(Debug, Clone, Default)]
pub struct RecoveryContext {
    pub values: ContextMap,
    pub descriptor: Option<SelectorDescriptor>,
    /// Outcome counters for this context signature, keyed by strategy name
    pub history: HashMap<String, OutcomeStats>,
    /// 1-based attempt that just failed
    pub attempt: u32,
    pub cancel: CancellationToken,
    /// Backoff policy of the running operation; strategies fall back to their own when unset
    pub policy: Option<RetryPolicy>,
}

impl RecoveryContext {
    pub fn new(values: ContextMap) -> Self {
        Self {
            values,
            attempt: 1,
            ..Default::default()
        }
    }

    pub fn with_descriptor(mut self, descriptor: SelectorDescriptor) -> Self {
        self.descriptor = Some(descriptor);
        self
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt.max(1);
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

    pub fn with_history(mut self, history: HashMap<String, OutcomeStats>) -> Self {
        self.history = history;
        self
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .and_then(Value::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    /// Current selector: context value first, then the descriptor's primary
    pub fn selector(&self) -> Option<&str> {
        self.str_field("selector").or_else(|| {
            self.descriptor
                .as_ref()
                .map(|d| d.primary.as_str())
                .filter(|s| !s.trim().is_empty())
        })
    }

    pub fn action(&self) -> Option<&str> {
        self.str_field("action")
    }

    pub fn url(&self) -> Option<&str> {
        self.str_field("url")
    }

    pub fn timeout_ms(&self) -> Option<u64> {
        self.values.get("timeout").and_then(Value::as_u64)
    }

    /// Descriptor alternatives followed by `alternatives` from the context map, deduplicated
    pub fn alternatives(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let from_descriptor = self.descriptor.iter().flat_map(|d| d.css.iter().cloned());
        let from_values = string_list(self.values.get("alternatives"));
        for selector in from_descriptor.chain(from_values) {
            if !selector.trim().is_empty() && !out.contains(&selector) {
                out.push(selector);
            }
        }
        out
    }

    /// Selectors already tried, including the current one
    pub fn used_selectors(&self) -> Vec<String> {
        let mut used = string_list(self.values.get("used_selectors")).collect::<Vec<_>>();
        if let Some(current) = self.selector() {
            if !used.iter().any(|s| s == current) {
                used.push(current.to_string());
            }
        }
        used
    }

    /// Circuit breaker key: (url, action or `-`); untracked without a url
    pub fn circuit_key(&self) -> Option<(&str, &str)> {
        self.url().map(|url| (url, self.action().unwrap_or("-")))
    }

    /// Key the executor ranks strategies under
    pub fn signature(&self, kind: ErrorKind) -> String {
        format!("{}:{}", kind.as_str(), self.action().unwrap_or("-"))
    }

    /// Descriptor for locator-backed strategies, synthesised from the map when absent
    pub fn descriptor_or_selector(&self) -> Option<SelectorDescriptor> {
        if let Some(descriptor) = &self.descriptor {
            let mut descriptor = descriptor.clone();
            if let Some(selector) = self.str_field("selector") {
                descriptor.primary = selector.to_string();
            }
            return Some(descriptor);
        }
        self.selector()
            .map(|selector| SelectorDescriptor::new(selector).with_alternatives(self.alternatives()))
    }
}

fn string_list(value: Option<&Value>) -> impl Iterator<Item = String> + '_ {
    value
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|v| v.as_str().map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> ContextMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_kind_metadata() {
        assert_eq!(ErrorKind::PermissionDenied.category(), ErrorCategory::Security);
        assert!(!ErrorKind::PermissionDenied.recoverable());
        assert!(ErrorKind::ElementNotFound.recoverable());
        assert_eq!("network_error".parse::<ErrorKind>().unwrap(), ErrorKind::NetworkError);
        assert_eq!(
            serde_json::to_value(ErrorKind::ElementNotFound).unwrap(),
            json!("element-not-found")
        );
    }

    #[test]
    fn test_outcome_serializes_compactly() {
        let outcome = RecoveryOutcome::success(RecoveryAction::UseAlternative)
            .with_data(json!({"selector": "#submit"}));
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({"success": true, "action": "use-alternative", "data": {"selector": "#submit"}})
        );
    }

    #[test]
    fn test_mutation_apply() {
        let mut values = map(json!({"selector": ".a", "stale": 1}));
        ContextMutation::new()
            .set("selector", json!("#b"))
            .remove("stale")
            .apply(&mut values);
        assert_eq!(Value::Object(values), json!({"selector": "#b"}));
    }

    #[test]
    fn test_alternatives_merge_and_used_selectors() {
        let ctx = RecoveryContext::new(map(json!({
            "selector": ".submit-button",
            "alternatives": ["#submit", "button[type=submit]"],
            "used_selectors": ["#submit"],
        })))
        .with_descriptor(SelectorDescriptor::new(".submit-button").with_alternatives(["#submit"]));

        assert_eq!(ctx.alternatives(), vec!["#submit", "button[type=submit]"]);
        assert_eq!(ctx.used_selectors(), vec!["#submit", ".submit-button"]);
        assert_eq!(ctx.signature(ErrorKind::Timeout), "timeout:-");
    }

    #[test]
    fn test_failure_from_error_chain() {
        #[derive(Debug)]
        struct Outer(std::io::Error);
        impl fmt::Display for Outer {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("request failed")
            }
        }
        impl std::error::Error for Outer {
            fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
                Some(&self.0)
            }
        }

        let err = Outer(std::io::Error::new(std::io::ErrorKind::Other, "connection reset"));
        let failure = Failure::from_error(&err);
        assert_eq!(failure.message, "request failed");
        assert_eq!(failure.stack.as_deref(), Some("caused by: connection reset"));
    }
}
