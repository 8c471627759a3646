//! Sliding-window circuit breaker keyed by (target, action)
//!
//! Each key keeps a bounded ring of recent failure timestamps. The circuit is open while at least
//! `failure_threshold` of them fall inside the trailing window. Nothing here gates a first
//! attempt; callers only consult it after a failure. Keys whose newest failure has left the
//! window are swept on every record, so the map only holds targets that failed recently.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitSettings {
    pub failure_threshold: usize,
    pub window: Duration,
    pub ring_capacity: usize,
}

impl Default for CircuitSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            window: Duration::from_secs(600),
            ring_capacity: 20,
        }
    }
}

/// Point-in-time view of one key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitState {
    pub target: String,
    pub action: String,
    pub recent_failures: usize,
    pub open: bool,
    pub last_failure: Option<DateTime<Utc>>,
}

pub struct CircuitBreaker {
    settings: CircuitSettings,
    failures: DashMap<(String, String), VecDeque<DateTime<Utc>>>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitSettings::default())
    }
}

impl CircuitBreaker {
    pub fn new(settings: CircuitSettings) -> Self {
        Self {
            settings,
            failures: DashMap::new(),
        }
    }

    pub fn settings(&self) -> &CircuitSettings {
        &self.settings
    }

    pub fn record_failure(&self, target: &str, action: &str) -> bool {
        self.record_failure_at(target, action, Utc::now())
    }

    /// Record one failure; returns whether the circuit is open afterwards
    pub fn record_failure_at(&self, target: &str, action: &str, at: DateTime<Utc>) -> bool {
        self.prune(at);
        let capacity = self.settings.ring_capacity.max(self.settings.failure_threshold).max(1);
        let mut ring = self
            .failures
            .entry((target.to_string(), action.to_string()))
            .or_default();
        ring.push_back(at);
        while ring.len() > capacity {
            ring.pop_front();
        }
        let open = self.count_in_window(&ring, at) >= self.settings.failure_threshold;
        if open {
            warn!(
                "circuit open for {} / {} ({} failures in {}s)",
                target,
                action,
                ring.len(),
                self.settings.window.as_secs()
            );
        }
        open
    }

    pub fn is_open(&self, target: &str, action: &str) -> bool {
        self.is_open_at(target, action, Utc::now())
    }

    pub fn is_open_at(&self, target: &str, action: &str, now: DateTime<Utc>) -> bool {
        self.failures
            .get(&(target.to_string(), action.to_string()))
            .is_some_and(|ring| self.count_in_window(&ring, now) >= self.settings.failure_threshold)
    }

    pub fn state_at(&self, target: &str, action: &str, now: DateTime<Utc>) -> CircuitState {
        let ring = self.failures.get(&(target.to_string(), action.to_string()));
        let recent_failures = ring
            .as_ref()
            .map(|ring| self.count_in_window(ring, now))
            .unwrap_or(0);
        CircuitState {
            target: target.to_string(),
            action: action.to_string(),
            recent_failures,
            open: recent_failures >= self.settings.failure_threshold,
            last_failure: ring.and_then(|ring| ring.back().copied()),
        }
    }

    /// Drop keys with no failure inside the window ending at `now`; returns how many went
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.window();
        let before = self.failures.len();
        self.failures
            .retain(|_, ring| ring.back().is_some_and(|last| *last > cutoff));
        before.saturating_sub(self.failures.len())
    }

    /// Number of (target, action) keys currently tracked
    pub fn tracked(&self) -> usize {
        self.failures.len()
    }

    pub fn reset(&self, target: &str, action: &str) {
        self.failures.remove(&(target.to_string(), action.to_string()));
    }

    pub fn clear(&self) {
        self.failures.clear();
    }

    fn window(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.settings.window)
            .unwrap_or_else(|_| chrono::Duration::days(365))
    }

    fn count_in_window(&self, ring: &VecDeque<DateTime<Utc>>, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.window();
        ring.iter().filter(|at| **at > cutoff && **at <= now).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_trips_at_threshold_within_window() {
        let breaker = CircuitBreaker::default();
        let now = Utc::now();
        for i in 0..4 {
            assert!(!breaker.record_failure_at("https://api.test", "fetch", now - ChronoDuration::minutes(i)));
        }
        assert!(!breaker.is_open_at("https://api.test", "fetch", now));
        assert!(breaker.record_failure_at("https://api.test", "fetch", now));
        assert!(breaker.is_open_at("https://api.test", "fetch", now));
        // different action is an independent key
        assert!(!breaker.is_open_at("https://api.test", "submit", now));
    }

    #[test]
    fn test_old_failures_do_not_trip() {
        let breaker = CircuitBreaker::default();
        let now = Utc::now();
        for i in 0..8 {
            breaker.record_failure_at("https://api.test", "fetch", now - ChronoDuration::minutes(11 + i));
        }
        assert!(!breaker.is_open_at("https://api.test", "fetch", now));
        let state = breaker.state_at("https://api.test", "fetch", now);
        assert_eq!(state.recent_failures, 0);
        assert!(state.last_failure.is_some());
    }

    #[test]
    fn test_window_slides_closed() {
        let breaker = CircuitBreaker::default();
        let start = Utc::now();
        for _ in 0..5 {
            breaker.record_failure_at("t", "a", start);
        }
        assert!(breaker.is_open_at("t", "a", start + ChronoDuration::minutes(9)));
        assert!(!breaker.is_open_at("t", "a", start + ChronoDuration::minutes(11)));
    }

    #[test]
    fn test_stale_keys_are_evicted_on_record() {
        let breaker = CircuitBreaker::default();
        let now = Utc::now();
        for host in ["https://a.test", "https://b.test", "https://c.test"] {
            breaker.record_failure_at(host, "fetch", now - ChronoDuration::minutes(30));
        }
        assert_eq!(breaker.tracked(), 3);

        breaker.record_failure_at("https://d.test", "fetch", now);
        assert_eq!(breaker.tracked(), 1);
        assert_eq!(breaker.state_at("https://d.test", "fetch", now).recent_failures, 1);
        assert!(breaker.state_at("https://a.test", "fetch", now).last_failure.is_none());
    }

    #[test]
    fn test_prune_keeps_recent_keys() {
        let breaker = CircuitBreaker::default();
        let now = Utc::now();
        breaker.record_failure_at("fresh", "a", now - ChronoDuration::minutes(1));
        breaker.record_failure_at("old", "a", now - ChronoDuration::minutes(20));
        assert_eq!(breaker.tracked(), 2);
        assert_eq!(breaker.prune(now), 1);
        assert_eq!(breaker.tracked(), 1);
        assert!(breaker.state_at("fresh", "a", now).last_failure.is_some());
    }

    #[test]
    fn test_ring_is_bounded_and_reset() {
        let breaker = CircuitBreaker::new(CircuitSettings {
            failure_threshold: 2,
            window: Duration::from_secs(60),
            ring_capacity: 3,
        });
        let now = Utc::now();
        for _ in 0..10 {
            breaker.record_failure_at("t", "a", now);
        }
        assert_eq!(breaker.state_at("t", "a", now).recent_failures, 3);
        breaker.reset("t", "a");
        assert!(!breaker.is_open_at("t", "a", now));
    }
}
