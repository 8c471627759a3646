//! Diagnostic reports for handled errors
//!
//! Reports keep a sanitized copy of the failure context: credential-like keys are dropped at any
//! depth before anything is stored or exported. The store is a rolling window; the oldest report
//! falls out once the cap is reached.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use resilience_core_types::ErrorId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::executor::RecoveryReport;
use crate::types::{ErrorClassification, ErrorKind, Failure, RecoveryAction};

/// Keys (normalized: lowercase, no `_`/`-`) removed from diagnostic context
const FORBIDDEN_KEYS: &[&str] = &[
    "password",
    "passwd",
    "token",
    "apikey",
    "secret",
    "authorization",
    "cookie",
];

fn is_forbidden(key: &str) -> bool {
    let normalized = key
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .collect::<String>()
        .to_ascii_lowercase();
    FORBIDDEN_KEYS
        .iter()
        .any(|forbidden| normalized.contains(forbidden))
}

/// Copy of `value` with credential-like keys removed recursively
pub fn sanitize(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(sanitize_map(map)),
        Value::Array(items) => Value::Array(items.iter().map(sanitize).collect()),
        other => other.clone(),
    }
}

pub fn sanitize_map(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .filter(|(key, _)| !is_forbidden(key))
        .map(|(key, value)| (key.clone(), sanitize(value)))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationPriority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub priority: RecommendationPriority,
    pub message: String,
}

impl Recommendation {
    fn new(priority: RecommendationPriority, message: impl Into<String>) -> Self {
        Self {
            priority,
            message: message.into(),
        }
    }
}

/// Condensed recovery result carried by a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoverySummary {
    pub recovered: bool,
    pub action: RecoveryAction,
    pub strategy: Option<String>,
    pub reason: Option<String>,
    pub strategies_tried: Vec<String>,
}

impl From<&RecoveryReport> for RecoverySummary {
    fn from(report: &RecoveryReport) -> Self {
        Self {
            recovered: report.outcome.success,
            action: report.outcome.action,
            strategy: report.strategy.clone(),
            reason: report.outcome.reason.clone(),
            strategies_tried: report.runs.iter().map(|run| run.strategy.clone()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub error_id: ErrorId,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub code: Option<String>,
    pub classification: ErrorClassification,
    pub context: Value,
    pub possible_causes: Vec<String>,
    pub suggested_actions: Vec<String>,
    pub recommendations: Vec<Recommendation>,
    pub recovery: Option<RecoverySummary>,
}

#[derive(Debug, Clone)]
pub struct DiagnosticsSettings {
    pub max_reports: usize,
    /// Classifications below this confidence get a low-confidence recommendation
    pub confidence_threshold: f64,
    /// Same-kind errors in the classifier's recent window that count as recurring
    pub recurrence_threshold: usize,
}

impl Default for DiagnosticsSettings {
    fn default() -> Self {
        Self {
            max_reports: 1_000,
            confidence_threshold: 0.7,
            recurrence_threshold: 3,
        }
    }
}

/// Inputs for one report
pub struct ReportInput<'a> {
    pub failure: &'a Failure,
    pub classification: &'a ErrorClassification,
    pub context: &'a Map<String, Value>,
    pub recovery: Option<&'a RecoveryReport>,
    /// Occurrences of the same kind in the recent window, including this one
    pub recent_same_kind: usize,
}

/// Prioritised follow-ups for an operator
pub fn recommendations(
    input: &ReportInput<'_>,
    settings: &DiagnosticsSettings,
) -> Vec<Recommendation> {
    let classification = input.classification;
    let kind = classification.kind;
    let mut out = Vec::new();

    if !classification.recoverable {
        out.push(Recommendation::new(
            RecommendationPriority::High,
            format!("{kind} cannot be recovered automatically; escalate to an operator"),
        ));
    } else if let Some(report) = input.recovery.filter(|r| !r.recovered()) {
        let message = if report.circuit_broken() {
            "Circuit breaker engaged; pause traffic to this target before retrying".to_string()
        } else {
            format!(
                "Automatic recovery failed after {} strategies; manual intervention required",
                report.runs.len()
            )
        };
        out.push(Recommendation::new(RecommendationPriority::High, message));
    }

    if input.recent_same_kind >= settings.recurrence_threshold.max(1) {
        out.push(Recommendation::new(
            RecommendationPriority::High,
            format!(
                "{kind} occurred {} times recently; investigate the root cause",
                input.recent_same_kind
            ),
        ));
    }

    if classification.confidence < settings.confidence_threshold {
        out.push(Recommendation::new(
            RecommendationPriority::Medium,
            format!(
                "Classification confidence {:.2} is low; inspect the raw failure",
                classification.confidence
            ),
        ));
    }

    let hint = match kind {
        ErrorKind::ElementNotFound => Some("Record alternative selectors or a visual fingerprint for this element"),
        ErrorKind::Timeout => Some("Review timeouts for this action against observed durations"),
        ErrorKind::NetworkError => Some("Check connectivity and the health of the target service"),
        ErrorKind::PageError => Some("Check the page console for script errors"),
        ErrorKind::DataError => Some("Validate the data shape expected by the automation"),
        ErrorKind::ResourceError => Some("Reduce concurrent sessions or raise resource limits"),
        ErrorKind::PermissionDenied | ErrorKind::Unknown => None,
    };
    if let Some(hint) = hint {
        out.push(Recommendation::new(RecommendationPriority::Low, hint));
    }

    out.sort_by_key(|r| r.priority);
    out
}

pub fn build_report(input: &ReportInput<'_>, settings: &DiagnosticsSettings) -> DiagnosticReport {
    DiagnosticReport {
        error_id: ErrorId::new(),
        timestamp: Utc::now(),
        message: input.failure.message.clone(),
        code: input.failure.code.clone(),
        classification: input.classification.clone(),
        context: Value::Object(sanitize_map(input.context)),
        possible_causes: input.classification.common_causes.clone(),
        suggested_actions: input.classification.suggested_actions.clone(),
        recommendations: recommendations(input, settings),
        recovery: input.recovery.map(RecoverySummary::from),
    }
}

/// Rolling window of reports, retrievable by id
pub struct DiagnosticsStore {
    reports: RwLock<VecDeque<DiagnosticReport>>,
    capacity: usize,
}

impl Default for DiagnosticsStore {
    fn default() -> Self {
        Self::new(DiagnosticsSettings::default().max_reports)
    }
}

impl DiagnosticsStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            reports: RwLock::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&self, report: DiagnosticReport) {
        let mut reports = self.reports.write();
        reports.push_back(report);
        while reports.len() > self.capacity {
            reports.pop_front();
        }
    }

    pub fn get(&self, id: &str) -> Option<DiagnosticReport> {
        self.reports
            .read()
            .iter()
            .rev()
            .find(|report| report.error_id.0 == id)
            .cloned()
    }

    /// Newest first
    pub fn recent(&self, limit: usize) -> Vec<DiagnosticReport> {
        self.reports.read().iter().rev().take(limit).cloned().collect()
    }

    /// Oldest first
    pub fn export(&self) -> Vec<DiagnosticReport> {
        self.reports.read().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.reports.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.read().is_empty()
    }

    pub fn clear(&self) {
        self.reports.write().clear();
    }
}
