///! Bounded cache of analyzed element contexts
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

use resilience_core_types::ElementSnapshot;

use crate::models::SemanticContext;

pub struct ContextCache {
    entries: DashMap<String, (SemanticContext, Instant)>,
    ttl: Duration,
    capacity: usize,
}

impl ContextCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Key built from the attributes analysis depends on
    pub fn key_for(element: &ElementSnapshot) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}|{}|{}",
            element.descriptor(),
            element.role.as_deref().unwrap_or_default(),
            element.input_type.as_deref().unwrap_or_default(),
            element.aria_label.as_deref().unwrap_or_default(),
            element.name.as_deref().unwrap_or_default(),
            element.href.is_some(),
            element.parent.as_deref().unwrap_or_default(),
            element.text.trim()
        )
    }

    pub fn get(&self, key: &str) -> Option<SemanticContext> {
        if let Some(entry) = self.entries.get(key) {
            if entry.1.elapsed() < self.ttl {
                return Some(entry.0.clone());
            }
            drop(entry);
            self.entries.remove(key);
        }
        None
    }

    pub fn put(&self, key: String, context: SemanticContext) {
        self.entries.insert(key, (context, Instant::now()));
        while self.entries.len() > self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().1)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
