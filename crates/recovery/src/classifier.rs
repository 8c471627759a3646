//! Error classifier
//!
//! A failure's message and stack are matched against an ordered list of pattern groups, one per
//! error kind; the first group with a hit wins. `unknown` has no group and is only the fallback.
//!
//! Confidence starts at the base (0.5). A text pattern hit adds 0.3, and each corroborating signal
//! adds 0.1: a `selector` in the context (element), an `action` alongside that selector
//! (element), a `url` (network), a `timeout` (timeout), or an error code matching the same group.
//! A failure whose text matches nothing but whose code does is classified on the code alone,
//! without the 0.3 hit.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::types::{ContextMap, ErrorClassification, ErrorKind, Failure};

const PATTERN_HIT_BONUS: f64 = 0.3;
const CORROBORATION_BONUS: f64 = 0.1;

/// Patterns for one error kind
#[derive(Debug, Clone)]
pub struct PatternGroup {
    pub kind: ErrorKind,
    pub patterns: Vec<Regex>,
    pub code_patterns: Vec<Regex>,
}

impl PatternGroup {
    pub fn new(kind: ErrorKind, patterns: Vec<Regex>, code_patterns: Vec<Regex>) -> Self {
        Self {
            kind,
            patterns,
            code_patterns,
        }
    }

    fn text_match(&self, text: &str) -> Option<&Regex> {
        self.patterns.iter().find(|pattern| pattern.is_match(text))
    }

    fn code_match(&self, code: Option<&str>) -> bool {
        code.map(str::trim)
            .filter(|code| !code.is_empty())
            .is_some_and(|code| self.code_patterns.iter().any(|p| p.is_match(code)))
    }
}

/// Ordered pattern groups; immutable once built
#[derive(Debug, Clone)]
pub struct PatternSet {
    groups: Vec<PatternGroup>,
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(&format!("(?i){p}")).unwrap())
        .collect()
}

static BUILTIN: Lazy<PatternSet> = Lazy::new(|| {
    PatternSet::new(vec![
        PatternGroup::new(
            ErrorKind::ElementNotFound,
            compile(&[
                r"element not found",
                r"no such element",
                r"unable to locate (an )?element",
                r"(could not|failed to|cannot) find element",
                r"no node found for selector",
                r"(selector|element) .*(did not match|not found)",
                r"stale element",
                r"element is not attached",
                r"element (is )?not (visible|interactable|clickable)",
            ]),
            compile(&[
                r"^(element_not_found|no_such_element|stale_element_reference|element_not_interactable)$",
            ]),
        ),
        PatternGroup::new(
            ErrorKind::Timeout,
            compile(&[
                r"\btime(d)? ?out\b",
                r"timeout( of)? \d+ ?ms exceeded",
                r"deadline exceeded",
                r"took too long",
            ]),
            compile(&[r"^(etimedout|esockettimedout|timeout|timeout_?error)$"]),
        ),
        PatternGroup::new(
            ErrorKind::NetworkError,
            compile(&[
                r"net::err_",
                r"network (error|request failed|is unreachable)",
                r"connection (refused|reset|closed|aborted)",
                r"\b(econnrefused|econnreset|enotfound|eai_again)\b",
                r"failed to fetch",
                r"socket hang up",
                r"dns (lookup|resolution) failed",
                r"bad gateway|service unavailable",
            ]),
            compile(&[
                r"^(econnrefused|econnreset|enotfound|eai_again|epipe|err_network)$",
                r"^net::err_\w+$",
                r"^5\d\d$",
            ]),
        ),
        PatternGroup::new(
            ErrorKind::PermissionDenied,
            compile(&[
                r"permission denied",
                r"access denied",
                r"\bforbidden\b",
                r"\bunauthori[sz]ed\b",
                r"not allowed",
                r"insufficient privileges",
                r"authentication (failed|required)",
                r"\b(eacces|eperm)\b",
            ]),
            compile(&[r"^(eacces|eperm|401|403|permission_denied|unauthorized|forbidden)$"]),
        ),
        PatternGroup::new(
            ErrorKind::PageError,
            compile(&[
                r"page crashed",
                r"target (closed|crashed)",
                r"execution context was destroyed",
                r"frame (was )?detached",
                r"navigation (failed|was interrupted|interrupted)",
                r"uncaught (exception|\w*error)",
                r"session closed",
                r"err_aborted",
            ]),
            compile(&[r"^(err_aborted|target_closed|page_crashed|javascript_error)$"]),
        ),
        PatternGroup::new(
            ErrorKind::DataError,
            compile(&[
                r"unexpected token",
                r"(parse|parsing|deserializ\w*|serializ\w*) error",
                r"invalid (json|data|format|value|type)",
                r"cannot read propert(y|ies) of (undefined|null)",
                r"type mismatch",
                r"expected .+ (but )?(got|found)",
            ]),
            compile(&[r"^(err_invalid_arg_type|err_invalid_arg_value|invalid_data|parse_error)$"]),
        ),
        PatternGroup::new(
            ErrorKind::ResourceError,
            compile(&[
                r"out of memory",
                r"heap limit",
                r"too many open files",
                r"no space left",
                r"resource (exhausted|temporarily unavailable)",
                r"quota exceeded",
                r"\b(enomem|emfile|enospc)\b",
            ]),
            compile(&[r"^(enomem|emfile|enospc|err_insufficient_resources)$"]),
        ),
    ])
});

impl PatternSet {
    /// Build from ordered groups; groups for `unknown` are dropped
    pub fn new(groups: Vec<PatternGroup>) -> Self {
        Self {
            groups: groups
                .into_iter()
                .filter(|group| group.kind != ErrorKind::Unknown)
                .collect(),
        }
    }

    pub fn builtin() -> Self {
        BUILTIN.clone()
    }

    pub fn groups(&self) -> &[PatternGroup] {
        &self.groups
    }
}

impl Default for PatternSet {
    fn default() -> Self {
        Self::builtin()
    }
}

#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    pub base_confidence: f64,
    /// Recent classifications retained for recurrence checks
    pub history_window: usize,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            base_confidence: 0.5,
            history_window: 100,
        }
    }
}

/// Per-kind counters exported for diagnostics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassifierStats {
    pub total: u64,
    pub by_kind: BTreeMap<ErrorKind, u64>,
    pub recent: Vec<RecentError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentError {
    pub kind: ErrorKind,
    pub at: DateTime<Utc>,
}

pub struct ErrorClassifier {
    patterns: PatternSet,
    settings: ClassifierSettings,
    counts: DashMap<ErrorKind, u64>,
    recent: Mutex<VecDeque<RecentError>>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new(PatternSet::builtin(), ClassifierSettings::default())
    }
}

impl ErrorClassifier {
    pub fn new(patterns: PatternSet, settings: ClassifierSettings) -> Self {
        Self {
            patterns,
            settings,
            counts: DashMap::new(),
            recent: Mutex::new(VecDeque::new()),
        }
    }

    pub fn settings(&self) -> &ClassifierSettings {
        &self.settings
    }

    /// Classify a failure and count it
    pub fn classify(&self, failure: &Failure, context: &ContextMap) -> ErrorClassification {
        let classification = self.evaluate(failure, context);
        self.count(classification.kind);
        debug!(
            "classified '{}' as {} ({:.2})",
            failure.message, classification.kind, classification.confidence
        );
        classification
    }

    /// Classify without touching the counters
    pub fn evaluate(&self, failure: &Failure, context: &ContextMap) -> ErrorClassification {
        let base = self.settings.base_confidence;
        let code = failure.code.as_deref();
        let texts = [Some(failure.message.as_str()), failure.stack.as_deref()];

        for group in self.patterns.groups() {
            let hit = texts
                .iter()
                .flatten()
                .find_map(|text| group.text_match(text));
            if let Some(pattern) = hit {
                let confidence = base
                    + PATTERN_HIT_BONUS
                    + corroboration(group.kind, context)
                    + code_bonus(group, code);
                return ErrorClassification::new(group.kind, confidence.min(1.0))
                    .with_pattern(pattern.as_str().trim_start_matches("(?i)"));
            }
        }

        if let Some(group) = self.patterns.groups().iter().find(|g| g.code_match(code)) {
            let confidence = base + CORROBORATION_BONUS + corroboration(group.kind, context);
            return ErrorClassification::new(group.kind, confidence.min(1.0));
        }

        ErrorClassification::new(ErrorKind::Unknown, base)
    }

    fn count(&self, kind: ErrorKind) {
        *self.counts.entry(kind).or_insert(0) += 1;
        let mut recent = self.recent.lock();
        recent.push_back(RecentError {
            kind,
            at: Utc::now(),
        });
        while recent.len() > self.settings.history_window.max(1) {
            recent.pop_front();
        }
    }

    /// Occurrences of `kind` inside the recent window
    pub fn recent_count(&self, kind: ErrorKind) -> usize {
        self.recent.lock().iter().filter(|e| e.kind == kind).count()
    }

    pub fn stats(&self) -> ClassifierStats {
        let by_kind = self
            .counts
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect::<BTreeMap<_, _>>();
        ClassifierStats {
            total: by_kind.values().sum(),
            by_kind,
            recent: self.recent.lock().iter().cloned().collect(),
        }
    }

    pub fn reset_stats(&self) {
        self.counts.clear();
        self.recent.lock().clear();
    }
}

fn present(context: &ContextMap, key: &str) -> bool {
    match context.get(key) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
    }
}

fn corroboration(kind: ErrorKind, context: &ContextMap) -> f64 {
    let signals = match kind {
        ErrorKind::ElementNotFound => {
            let selector = present(context, "selector");
            usize::from(selector) + usize::from(selector && present(context, "action"))
        }
        ErrorKind::NetworkError => usize::from(present(context, "url")),
        ErrorKind::Timeout => usize::from(present(context, "timeout")),
        _ => 0,
    };
    signals as f64 * CORROBORATION_BONUS
}

fn code_bonus(group: &PatternGroup, code: Option<&str>) -> f64 {
    if group.code_match(code) {
        CORROBORATION_BONUS
    } else {
        0.0
    }
}
