//! Strategy outcome history
//!
//! Both the locator and the recovery executor keep per (key, strategy) counters and use them to
//! perturb a static priority order. The perturbation is bounded: a strategy can move at most
//! `max_shift` priority units in either direction, and only after `min_samples` attempts, so a
//! handful of lucky or unlucky runs cannot permanently reorder the chain.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

const DEFAULT_MIN_SAMPLES: u64 = 3;
const DEFAULT_MAX_SHIFT: f64 = 1.5;
/// Attempts needed before the success rate carries its full weight
const FULL_CONFIDENCE_SAMPLES: f64 = 10.0;

/// Counters for one (key, strategy) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeStats {
    pub attempts: u64,
    pub successes: u64,
    pub last_success: Option<DateTime<Utc>>,
    pub last_attempt: DateTime<Utc>,
}

impl OutcomeStats {
    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.successes as f64 / self.attempts as f64
        }
    }
}

/// One entry of a ranked strategy list
#[derive(Debug, Clone)]
pub struct RankedEntry<T> {
    pub item: T,
    pub name: String,
    pub base_priority: u32,
    pub adjusted_priority: f64,
}

/// Flattened statistics row for export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyStatsSnapshot {
    pub key: String,
    pub strategy: String,
    pub attempts: u64,
    pub successes: u64,
    pub success_rate: f64,
    pub last_success: Option<DateTime<Utc>>,
}

/// Concurrent outcome store, indexed by key and then by strategy name
pub struct OutcomeHistory {
    entries: DashMap<String, HashMap<String, OutcomeStats>>,
    min_samples: u64,
    max_shift: f64,
}

impl Default for OutcomeHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl OutcomeHistory {
    pub fn new() -> Self {
        Self::with_weighting(DEFAULT_MIN_SAMPLES, DEFAULT_MAX_SHIFT)
    }

    pub fn with_weighting(min_samples: u64, max_shift: f64) -> Self {
        Self {
            entries: DashMap::new(),
            min_samples,
            max_shift: max_shift.max(0.0),
        }
    }

    pub fn record(&self, key: &str, strategy: &str, success: bool) -> OutcomeStats {
        self.record_at(key, strategy, success, Utc::now())
    }

    pub fn record_at(
        &self,
        key: &str,
        strategy: &str,
        success: bool,
        at: DateTime<Utc>,
    ) -> OutcomeStats {
        let mut strategies = self.entries.entry(key.to_string()).or_default();
        let stats = strategies
            .entry(strategy.to_string())
            .or_insert_with(|| OutcomeStats {
                attempts: 0,
                successes: 0,
                last_success: None,
                last_attempt: at,
            });
        stats.attempts += 1;
        stats.last_attempt = at;
        if success {
            stats.successes += 1;
            stats.last_success = Some(at);
        }
        stats.clone()
    }

    pub fn stats(&self, key: &str, strategy: &str) -> Option<OutcomeStats> {
        self.entries
            .get(key)
            .and_then(|strategies| strategies.get(strategy).cloned())
    }

    /// Static priority shifted by the observed success rate
    pub fn adjusted_priority(&self, key: &str, strategy: &str, base_priority: u32) -> f64 {
        self.shifted(self.stats(key, strategy).as_ref(), base_priority)
    }

    fn shifted(&self, stats: Option<&OutcomeStats>, base_priority: u32) -> f64 {
        let base = base_priority as f64;
        let Some(stats) = stats else {
            return base;
        };
        if stats.attempts < self.min_samples {
            return base;
        }
        let confidence = (stats.attempts as f64 / FULL_CONFIDENCE_SAMPLES).min(1.0);
        let centered = (stats.success_rate() - 0.5) * 2.0;
        base - self.max_shift * centered * confidence
    }

    /// Order `items` (item, name, base priority) by adjusted priority, ties by base priority
    pub fn rank<T>(&self, key: &str, items: Vec<(T, String, u32)>) -> Vec<RankedEntry<T>> {
        let known = self.snapshot_for(key);
        let mut ranked = items
            .into_iter()
            .map(|(item, name, base_priority)| {
                let adjusted_priority = self.shifted(known.get(&name), base_priority);
                RankedEntry {
                    item,
                    name,
                    base_priority,
                    adjusted_priority,
                }
            })
            .collect::<Vec<_>>();
        ranked.sort_by(|a, b| {
            a.adjusted_priority
                .partial_cmp(&b.adjusted_priority)
                .unwrap_or(Ordering::Equal)
                .then(a.base_priority.cmp(&b.base_priority))
        });
        ranked
    }

    /// Read-only copy of every strategy's counters for one key
    pub fn snapshot_for(&self, key: &str) -> HashMap<String, OutcomeStats> {
        self.entries
            .get(key)
            .map(|strategies| strategies.clone())
            .unwrap_or_default()
    }

    pub fn export(&self) -> Vec<StrategyStatsSnapshot> {
        let mut rows = self
            .entries
            .iter()
            .flat_map(|entry| {
                let key = entry.key().clone();
                entry
                    .value()
                    .iter()
                    .map(|(strategy, stats)| StrategyStatsSnapshot {
                        key: key.clone(),
                        strategy: strategy.clone(),
                        attempts: stats.attempts,
                        successes: stats.successes,
                        success_rate: stats.success_rate(),
                        last_success: stats.last_success,
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        rows.sort_by(|a, b| a.key.cmp(&b.key).then(a.strategy.cmp(&b.strategy)));
        rows
    }

    /// Drop entries whose last attempt is older than `cutoff`; returns how many were removed
    pub fn prune_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, strategies| {
            let before = strategies.len();
            strategies.retain(|_, stats| stats.last_attempt >= cutoff);
            removed += before - strategies.len();
            !strategies.is_empty()
        });
        removed
    }

    /// Number of (key, strategy) pairs tracked
    pub fn len(&self) -> usize {
        self.entries.iter().map(|entry| entry.value().len()).sum()
    }

    /// Number of distinct keys tracked
    pub fn keys(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn names(ranked: &[RankedEntry<&'static str>]) -> Vec<&'static str> {
        ranked.iter().map(|entry| entry.item).collect()
    }

    #[test]
    fn test_small_sample_keeps_static_order() {
        let history = OutcomeHistory::new();
        history.record("sel", "fuzzy", true);
        history.record("sel", "fuzzy", true);

        let ranked = history.rank(
            "sel",
            vec![("css", "css".to_string(), 1), ("fuzzy", "fuzzy".to_string(), 7)],
        );
        assert_eq!(names(&ranked), vec!["css", "fuzzy"]);
    }

    #[test]
    fn test_reliable_strategy_moves_up_one_slot_at_most() {
        let history = OutcomeHistory::new();
        for _ in 0..20 {
            history.record("sel", "xpath", true);
            history.record("sel", "css", false);
        }

        let ranked = history.rank(
            "sel",
            vec![
                ("css", "css".to_string(), 1),
                ("alt", "alt".to_string(), 2),
                ("xpath", "xpath".to_string(), 3),
            ],
        );
        // css drifts to 2.5, xpath to 1.5, alt stays at 2.0
        assert_eq!(names(&ranked), vec!["xpath", "alt", "css"]);
        assert!(ranked.iter().all(|e| (e.adjusted_priority - e.base_priority as f64).abs() <= 1.5));
    }

    #[test]
    fn test_prune_and_export() {
        let history = OutcomeHistory::new();
        let old = Utc::now() - Duration::days(40);
        history.record_at("a", "css", true, old);
        history.record("b", "css", false);

        assert_eq!(history.prune_older_than(Utc::now() - Duration::days(30)), 1);
        let rows = history.export();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key, "b");
        assert_eq!(rows[0].success_rate, 0.0);
    }

    #[test]
    fn test_snapshot_is_scoped_to_one_key() {
        let history = OutcomeHistory::new();
        history.record("#login", "css", true);
        history.record("#login", "xpath", false);
        history.record("#logout", "css", false);

        let login = history.snapshot_for("#login");
        assert_eq!(login.len(), 2);
        assert_eq!(login["css"].successes, 1);
        assert_eq!(login["xpath"].attempts, 1);
        assert!(history.snapshot_for("#missing").is_empty());
        assert_eq!(history.len(), 3);
        assert_eq!(history.keys(), 2);
    }

    #[test]
    fn test_prune_drops_emptied_keys() {
        let history = OutcomeHistory::new();
        let old = Utc::now() - Duration::days(40);
        history.record_at("a", "css", true, old);
        history.record_at("a", "xpath", true, old);
        history.record_at("b", "css", true, old);
        history.record("b", "fuzzy", true);

        assert_eq!(history.prune_older_than(Utc::now() - Duration::days(30)), 3);
        assert_eq!(history.keys(), 1);
        assert!(history.stats("a", "css").is_none());
        assert_eq!(history.snapshot_for("b").len(), 1);
    }
}
