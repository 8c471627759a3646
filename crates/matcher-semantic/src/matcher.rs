///! Semantic matcher: weighted context similarity and candidate search

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use resilience_core_types::{bounded, BrowserDriver, ElementSnapshot};
use tracing::{debug, info};

use crate::analyzer::ContextAnalyzer;
use crate::cache::ContextCache;
use crate::errors::Result;
use crate::keywords::keyword_overlap;
use crate::models::*;

const TYPE_WEIGHT: f64 = 0.3;
const PURPOSE_WEIGHT: f64 = 0.3;
const KEYWORD_WEIGHT: f64 = 0.2;
const BUSINESS_WEIGHT: f64 = 0.2;

#[derive(Debug, Clone)]
pub struct SemanticMatchSettings {
    pub similarity_threshold: f64,
    pub cache_size: usize,
    pub cache_ttl: Duration,
}

impl Default for SemanticMatchSettings {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.6,
            cache_size: 500,
            cache_ttl: Duration::from_secs(60),
        }
    }
}

pub struct SemanticMatcher {
    settings: SemanticMatchSettings,
    analyzer: ContextAnalyzer,
    cache: ContextCache,
}

impl SemanticMatcher {
    pub fn new(settings: SemanticMatchSettings) -> Self {
        let cache = ContextCache::new(settings.cache_size, settings.cache_ttl);
        Self {
            settings,
            analyzer: ContextAnalyzer::new(),
            cache,
        }
    }

    pub fn settings(&self) -> &SemanticMatchSettings {
        &self.settings
    }

    /// Analyze an element, reusing a fresh cached analysis when available
    pub fn context_for(&self, element: &ElementSnapshot) -> SemanticContext {
        let key = ContextCache::key_for(element);
        if let Some(context) = self.cache.get(&key) {
            return context;
        }
        let context = self.analyzer.analyze(element);
        self.cache.put(key, context.clone());
        context
    }

    /// 0.3 type + 0.3 purpose + 0.2 keywords + 0.2 business context
    pub fn similarity(&self, a: &SemanticContext, b: &SemanticContext) -> f64 {
        let type_score = if a.role == b.role && a.role != ElementRole::Unknown {
            1.0
        } else if a.interaction == b.interaction && a.interaction != InteractionType::None {
            0.5
        } else {
            0.0
        };

        let primary = if a.purpose.primary == b.purpose.primary {
            0.5
        } else {
            0.0
        };
        let purpose_score = primary + 0.5 * tag_overlap(&a.purpose.tags, &b.purpose.tags);

        let business_score = if a.business_context == b.business_context
            && a.business_context != BusinessContext::Unknown
        {
            1.0
        } else {
            0.0
        };

        (TYPE_WEIGHT * type_score
            + PURPOSE_WEIGHT * purpose_score
            + KEYWORD_WEIGHT * keyword_overlap(&a.keywords, &b.keywords)
            + BUSINESS_WEIGHT * business_score)
            .clamp(0.0, 1.0)
    }

    /// Visible elements whose context resembles `target`, best first
    pub async fn find_similar(
        &self,
        driver: &Arc<dyn BrowserDriver>,
        target: &SemanticContext,
        call_timeout: Duration,
    ) -> Result<Vec<SemanticCandidate>> {
        let visible = bounded("query_all_visible", call_timeout, driver.query_all_visible()).await?;
        let threshold = self.settings.similarity_threshold;

        let mut candidates: Vec<SemanticCandidate> = visible
            .into_iter()
            .filter_map(|element| {
                let context = self.context_for(&element);
                let score = self.similarity(target, &context);
                if score >= threshold {
                    Some(SemanticCandidate {
                        element,
                        context,
                        score,
                    })
                } else {
                    debug!("Semantic score {:.2} below threshold for {}", score, element.handle);
                    None
                }
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        info!("Semantic search found {} candidate(s)", candidates.len());
        Ok(candidates)
    }
}

impl Default for SemanticMatcher {
    fn default() -> Self {
        Self::new(SemanticMatchSettings::default())
    }
}

fn tag_overlap(a: &BTreeSet<PurposeTag>, b: &BTreeSet<PurposeTag>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(b).count() as f64 / union as f64
}
