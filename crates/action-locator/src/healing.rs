//! Bounded log of successful heals

use std::collections::VecDeque;

use chrono::Utc;
use dashmap::DashMap;
use resilience_core_types::ElementSnapshot;

use crate::types::{ElementCharacteristics, HealRecord, LocatorStrategy};

/// Per-selector log of lookups resolved by a fallback strategy
pub struct HealingLog {
    records: DashMap<String, VecDeque<HealRecord>>,
    per_selector: usize,
}

impl HealingLog {
    pub fn new(per_selector: usize) -> Self {
        Self {
            records: DashMap::new(),
            per_selector: per_selector.max(1),
        }
    }

    pub fn record(
        &self,
        selector: &str,
        strategy: LocatorStrategy,
        matched_selector: Option<String>,
        snapshot: &ElementSnapshot,
    ) -> HealRecord {
        let record = HealRecord {
            selector: selector.to_string(),
            strategy,
            matched_selector,
            element: ElementCharacteristics::from(snapshot),
            at: Utc::now(),
        };
        let mut entry = self.records.entry(selector.to_string()).or_default();
        entry.push_front(record.clone());
        entry.truncate(self.per_selector);
        record
    }

    /// Most recent heals first
    pub fn history(&self, selector: &str) -> Vec<HealRecord> {
        self.records
            .get(selector)
            .map(|entry| entry.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Selectors that resolved `selector` before, most recent first, without duplicates
    pub fn learned_selectors(&self, selector: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        if let Some(entry) = self.records.get(selector) {
            for record in entry.iter() {
                if let Some(matched) = &record.matched_selector {
                    if matched != selector && !out.contains(matched) {
                        out.push(matched.clone());
                    }
                }
                if let Some(id) = record.element.id.as_deref().filter(|id| !id.is_empty()) {
                    let by_id = format!("#{id}");
                    if by_id != selector && !out.contains(&by_id) {
                        out.push(by_id);
                    }
                }
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.records.iter().map(|e| e.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.records.clear();
    }
}
