///! Visual matcher: fingerprint capture and candidate search
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use resilience_core_types::{bounded, BrowserDriver, ElementHandle, ElementSnapshot, Viewport};
use tracing::{debug, info};

use crate::cache::FingerprintCache;
use crate::errors::VisualError;
use crate::hash::perceptual_hash;
use crate::models::{feature_vector, SurroundingContext, VisualCandidate, VisualFingerprint};
use crate::similarity::{geometric_breakdown, similarity, HASH_WEIGHT};

/// Matching thresholds and cache limits
#[derive(Debug, Clone)]
pub struct VisualMatchSettings {
    pub similarity_threshold: f64,
    pub max_candidates: usize,
    pub cache_size: usize,
    pub cache_ttl: Duration,
}

impl Default for VisualMatchSettings {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.8,
            max_candidates: 5,
            cache_size: 100,
            cache_ttl: Duration::from_secs(30),
        }
    }
}

/// Visual similarity matcher over the driver boundary
pub struct VisualMatcher {
    settings: VisualMatchSettings,
    cache: FingerprintCache,
}

impl VisualMatcher {
    pub fn new(settings: VisualMatchSettings) -> Self {
        let cache = FingerprintCache::new(settings.cache_size, settings.cache_ttl);
        Self { settings, cache }
    }

    pub fn settings(&self) -> &VisualMatchSettings {
        &self.settings
    }

    pub fn cache(&self) -> &FingerprintCache {
        &self.cache
    }

    /// Build a fingerprint from an already captured screenshot
    pub fn build_fingerprint(
        &self,
        snapshot: &ElementSnapshot,
        screenshot: &[u8],
        page_url: &str,
        viewport: Viewport,
    ) -> Result<VisualFingerprint, VisualError> {
        let bbox = snapshot
            .bounding_box
            .filter(|b| !b.is_empty())
            .ok_or_else(|| VisualError::MissingGeometry(snapshot.descriptor()))?;

        Ok(VisualFingerprint {
            perceptual_hash: perceptual_hash(screenshot)?,
            bounding_box: bbox,
            feature_vector: feature_vector(&bbox, &viewport),
            surrounding_context: SurroundingContext::from_snapshot(snapshot),
            captured_at: Utc::now(),
            page_url: page_url.to_string(),
            viewport,
        })
    }

    /// Capture (or reuse) the fingerprint of the element a selector currently resolves to
    pub async fn fingerprint_element(
        &self,
        driver: &Arc<dyn BrowserDriver>,
        selector: &str,
        handle: &ElementHandle,
        call_timeout: Duration,
    ) -> Result<VisualFingerprint, VisualError> {
        let page = bounded("page_state", call_timeout, driver.page_state()).await?;
        if let Some(cached) = self.cache.get(selector, &page.url) {
            debug!("Fingerprint cache hit for '{}'", selector);
            return Ok(cached);
        }

        let snapshot = bounded("describe", call_timeout, driver.describe(handle)).await?;
        let screenshot = bounded(
            "screenshot_element",
            call_timeout,
            driver.screenshot_element(handle),
        )
        .await
        .map_err(|err| VisualError::CaptureFailed(err.to_string()))?;

        let fingerprint = self.build_fingerprint(&snapshot, &screenshot, &page.url, page.viewport)?;
        self.cache.put(selector, fingerprint.clone());
        Ok(fingerprint)
    }

    /// Visible elements resembling `target`, best first, capped at `max_candidates`
    pub async fn find_similar(
        &self,
        driver: &Arc<dyn BrowserDriver>,
        target: &VisualFingerprint,
        call_timeout: Duration,
    ) -> Result<Vec<VisualCandidate>, VisualError> {
        let page = bounded("page_state", call_timeout, driver.page_state()).await?;
        let visible = bounded("query_all_visible", call_timeout, driver.query_all_visible()).await?;
        let threshold = self.settings.similarity_threshold;

        let mut candidates = Vec::new();
        for element in visible {
            let Some(bbox) = element.bounding_box.filter(|b| !b.is_empty()) else {
                continue;
            };
            let context = SurroundingContext::from_snapshot(&element);
            let features = feature_vector(&bbox, &page.viewport);
            let partial = geometric_breakdown(
                &target.bounding_box,
                &target.feature_vector,
                &target.surrounding_context,
                &bbox,
                &features,
                &context,
            );
            // Even a perfect hash match cannot lift this element over the threshold
            if partial.geometric() + HASH_WEIGHT < threshold {
                continue;
            }

            let screenshot = match bounded(
                "screenshot_element",
                call_timeout,
                driver.screenshot_element(&element.handle),
            )
            .await
            {
                Ok(bytes) => bytes,
                Err(err) => {
                    debug!("Skipping {}: screenshot failed: {}", element.handle, err);
                    continue;
                }
            };
            let fingerprint =
                match self.build_fingerprint(&element, &screenshot, &page.url, page.viewport) {
                    Ok(fp) => fp,
                    Err(err) => {
                        debug!("Skipping {}: {}", element.handle, err);
                        continue;
                    }
                };

            let breakdown = similarity(target, &fingerprint);
            let score = breakdown.total();
            if score >= threshold {
                candidates.push(VisualCandidate {
                    element,
                    score,
                    breakdown,
                });
            }
        }

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(self.settings.max_candidates);

        info!(
            "Visual search found {} candidate(s) at threshold {:.2}",
            candidates.len(),
            threshold
        );
        Ok(candidates)
    }
}

impl Default for VisualMatcher {
    fn default() -> Self {
        Self::new(VisualMatchSettings::default())
    }
}
