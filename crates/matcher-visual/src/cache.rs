///! Fingerprint caching keyed by (selector, page URL)
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::models::VisualFingerprint;

/// Bounded cache of element fingerprints
pub struct FingerprintCache {
    entries: DashMap<(String, String), CachedFingerprint>,
    ttl: Duration,
    capacity: usize,
}

struct CachedFingerprint {
    fingerprint: VisualFingerprint,
    inserted_at: Instant,
}

impl FingerprintCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Get fingerprint from cache if still fresh
    pub fn get(&self, selector: &str, page_url: &str) -> Option<VisualFingerprint> {
        let key = (selector.to_string(), page_url.to_string());
        if let Some(entry) = self.entries.get(&key) {
            if entry.inserted_at.elapsed() < self.ttl {
                return Some(entry.fingerprint.clone());
            }
            // Expired, remove it
            drop(entry);
            self.entries.remove(&key);
        }
        None
    }

    /// Insert, evicting the oldest entries beyond capacity
    pub fn put(&self, selector: &str, fingerprint: VisualFingerprint) {
        let key = (selector.to_string(), fingerprint.page_url.clone());
        self.entries.insert(
            key,
            CachedFingerprint {
                fingerprint,
                inserted_at: Instant::now(),
            },
        );

        while self.entries.len() > self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().inserted_at)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }

    /// Whether any page has a fingerprint for `selector`, fresh or not
    pub fn holds(&self, selector: &str) -> bool {
        self.entries.iter().any(|entry| entry.key().0 == selector)
    }

    /// Drop every entry captured on a page
    pub fn invalidate_page(&self, page_url: &str) {
        self.entries.retain(|(_, url), _| url != page_url);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SurroundingContext;
    use chrono::Utc;
    use resilience_core_types::{BoundingBox, Viewport};

    fn fingerprint(url: &str) -> VisualFingerprint {
        VisualFingerprint {
            perceptual_hash: 7,
            bounding_box: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            feature_vector: vec![0.5; 6],
            surrounding_context: SurroundingContext::default(),
            captured_at: Utc::now(),
            page_url: url.to_string(),
            viewport: Viewport::default(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_expires_after_ttl() {
        let cache = FingerprintCache::new(10, Duration::from_secs(30));
        cache.put("#submit", fingerprint("https://a.test"));
        assert!(cache.get("#submit", "https://a.test").is_some());
        assert!(cache.get("#submit", "https://b.test").is_none());
        assert!(cache.holds("#submit"));
        assert!(!cache.holds("#cancel"));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(cache.get("#submit", "https://a.test").is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_evicts_oldest_beyond_capacity() {
        let cache = FingerprintCache::new(2, Duration::from_secs(60));
        cache.put("#a", fingerprint("https://a.test"));
        tokio::time::advance(Duration::from_millis(10)).await;
        cache.put("#b", fingerprint("https://a.test"));
        tokio::time::advance(Duration::from_millis(10)).await;
        cache.put("#c", fingerprint("https://a.test"));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("#a", "https://a.test").is_none());
        assert!(cache.get("#b", "https://a.test").is_some());
        assert!(cache.get("#c", "https://a.test").is_some());
    }

    #[test]
    fn test_invalidate_page() {
        let cache = FingerprintCache::new(10, Duration::from_secs(60));
        cache.put("#a", fingerprint("https://a.test"));
        cache.put("#a", fingerprint("https://b.test"));
        cache.invalidate_page("https://a.test");
        assert_eq!(cache.len(), 1);
    }
}
