use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::types::ActionKind;

/// One observed action outcome.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimingSample {
    pub duration: Duration,
    pub success: bool,
    pub at: DateTime<Utc>,
}

/// Aggregate over the retained samples of one kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistorySummary {
    pub samples: usize,
    pub success_rate: f64,
    pub mean_duration_ms: f64,
}

/// Per action-kind outcome history with a size cap and a retention window.
pub struct TimingHistory {
    samples: DashMap<ActionKind, VecDeque<TimingSample>>,
    max_entries: usize,
    retention: chrono::Duration,
}

impl TimingHistory {
    pub fn new(max_entries: usize, retention: chrono::Duration) -> Self {
        Self {
            samples: DashMap::new(),
            max_entries: max_entries.max(1),
            retention,
        }
    }

    pub fn record(&self, kind: ActionKind, duration: Duration, success: bool) {
        self.record_at(kind, duration, success, Utc::now());
    }

    pub fn record_at(&self, kind: ActionKind, duration: Duration, success: bool, at: DateTime<Utc>) {
        let cutoff = at - self.retention;
        let mut entry = self.samples.entry(kind).or_default();
        entry.push_back(TimingSample {
            duration,
            success,
            at,
        });
        while entry.front().is_some_and(|s| s.at < cutoff) {
            entry.pop_front();
        }
        while entry.len() > self.max_entries {
            entry.pop_front();
        }
    }

    pub fn summary(&self, kind: ActionKind) -> Option<HistorySummary> {
        let entry = self.samples.get(&kind)?;
        if entry.is_empty() {
            return None;
        }
        let samples = entry.len();
        let successes = entry.iter().filter(|s| s.success).count();
        let total_ms: f64 = entry.iter().map(|s| s.duration.as_secs_f64() * 1_000.0).sum();
        Some(HistorySummary {
            samples,
            success_rate: successes as f64 / samples as f64,
            mean_duration_ms: total_ms / samples as f64,
        })
    }

    /// Drop samples older than the retention window; returns how many were removed.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.retention;
        let mut removed = 0;
        for mut entry in self.samples.iter_mut() {
            let before = entry.len();
            entry.retain(|s| s.at >= cutoff);
            removed += before - entry.len();
        }
        self.samples.retain(|_, samples| !samples.is_empty());
        removed
    }

    pub fn len(&self, kind: ActionKind) -> usize {
        self.samples.get(&kind).map(|e| e.len()).unwrap_or(0)
    }

    pub fn clear(&self) {
        self.samples.clear();
    }
}
