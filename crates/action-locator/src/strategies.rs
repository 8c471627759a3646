//! Element resolution strategies
//!
//! Seven strategies in static fallback order:
//! 1. CSS - Primary CSS selector
//! 2. Alternative selector - Alternative and previously healed CSS selectors
//! 3. XPath - XPath expressions
//! 4. Accessibility - ARIA role and accessible name
//! 5. Visual - Fingerprint similarity
//! 6. Semantic - Context similarity
//! 7. Fuzzy - Text similarity

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use matcher_semantic::{text_similarity, ContextAnalyzer, ElementRole, SemanticMatcher};
use matcher_visual::VisualMatcher;
use resilience_core_types::{bounded, BrowserDriver, ElementSnapshot};
use tracing::{debug, warn};

use crate::{errors::LocatorError, types::*};

/// Inputs shared by every strategy during one lookup
pub struct LookupContext<'a> {
    pub driver: &'a Arc<dyn BrowserDriver>,
    /// Bound applied to each driver call
    pub call_timeout: Duration,
    /// Selectors that healed this descriptor before, most recent first
    pub learned: &'a [String],
}

/// Strategy trait for element resolution
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Candidates in preference order
    async fn candidates(
        &self,
        descriptor: &SelectorDescriptor,
        ctx: &LookupContext<'_>,
    ) -> Result<Vec<Candidate>, LocatorError>;

    /// Whether the descriptor carries what this strategy needs
    fn applies_to(&self, descriptor: &SelectorDescriptor, learned: &[String]) -> bool;

    /// Get strategy type
    fn strategy_type(&self) -> LocatorStrategy;

    /// Get strategy name
    fn name(&self) -> &'static str {
        self.strategy_type().name()
    }
}

/// Default strategy set in static priority order
pub fn default_strategies(
    visual: Arc<VisualMatcher>,
    semantic: Arc<SemanticMatcher>,
    fuzzy_threshold: f64,
) -> Vec<Arc<dyn Strategy>> {
    vec![
        Arc::new(CssStrategy),
        Arc::new(AlternativeSelectorStrategy),
        Arc::new(XPathStrategy),
        Arc::new(AccessibilityStrategy::new()),
        Arc::new(VisualStrategy::new(visual)),
        Arc::new(SemanticStrategy::new(semantic)),
        Arc::new(FuzzyStrategy::new(fuzzy_threshold)),
    ]
}

/// Primary CSS selector resolution strategy
pub struct CssStrategy;

#[async_trait]
impl Strategy for CssStrategy {
    async fn candidates(
        &self,
        descriptor: &SelectorDescriptor,
        ctx: &LookupContext<'_>,
    ) -> Result<Vec<Candidate>, LocatorError> {
        debug!("Resolving CSS selector: {}", descriptor.primary);
        let found = bounded(
            "query_selector",
            ctx.call_timeout,
            ctx.driver.query_selector(&descriptor.primary),
        )
        .await?;
        Ok(found
            .map(|handle| Candidate::via_selector(handle, &descriptor.primary, 1.0))
            .into_iter()
            .collect())
    }

    fn applies_to(&self, descriptor: &SelectorDescriptor, _learned: &[String]) -> bool {
        !descriptor.primary.trim().is_empty() && !looks_like_xpath(&descriptor.primary)
    }

    fn strategy_type(&self) -> LocatorStrategy {
        LocatorStrategy::Css
    }
}

/// Alternative CSS selectors, then selectors learned from earlier heals
pub struct AlternativeSelectorStrategy;

#[async_trait]
impl Strategy for AlternativeSelectorStrategy {
    async fn candidates(
        &self,
        descriptor: &SelectorDescriptor,
        ctx: &LookupContext<'_>,
    ) -> Result<Vec<Candidate>, LocatorError> {
        let mut tried: Vec<&str> = vec![descriptor.primary.as_str()];
        let mut out = Vec::new();

        let alternatives = descriptor
            .css
            .iter()
            .map(|s| (s.as_str(), 0.9))
            .chain(ctx.learned.iter().map(|s| (s.as_str(), 0.8)));

        for (selector, confidence) in alternatives {
            if tried.contains(&selector) {
                continue;
            }
            tried.push(selector);
            debug!("Trying alternative selector: {}", selector);
            match bounded(
                "query_selector",
                ctx.call_timeout,
                ctx.driver.query_selector(selector),
            )
            .await
            {
                Ok(Some(handle)) => out.push(Candidate::via_selector(handle, selector, confidence)),
                Ok(None) => {}
                Err(err) => debug!("Alternative selector {} failed: {}", selector, err),
            }
        }
        Ok(out)
    }

    fn applies_to(&self, descriptor: &SelectorDescriptor, learned: &[String]) -> bool {
        !descriptor.css.is_empty() || !learned.is_empty()
    }

    fn strategy_type(&self) -> LocatorStrategy {
        LocatorStrategy::AlternativeSelector
    }
}

/// XPath resolution strategy
pub struct XPathStrategy;

#[async_trait]
impl Strategy for XPathStrategy {
    async fn candidates(
        &self,
        descriptor: &SelectorDescriptor,
        ctx: &LookupContext<'_>,
    ) -> Result<Vec<Candidate>, LocatorError> {
        let primary = looks_like_xpath(&descriptor.primary).then_some(descriptor.primary.as_str());
        let mut out = Vec::new();
        for xpath in primary.into_iter().chain(descriptor.xpath.iter().map(String::as_str)) {
            debug!("Resolving XPath: {}", xpath);
            match bounded("query_xpath", ctx.call_timeout, ctx.driver.query_xpath(xpath)).await {
                Ok(Some(handle)) => out.push(Candidate::via_selector(handle, xpath, 0.85)),
                Ok(None) => {}
                Err(err) => warn!("XPath {} failed: {}", xpath, err),
            }
        }
        Ok(out)
    }

    fn applies_to(&self, descriptor: &SelectorDescriptor, _learned: &[String]) -> bool {
        !descriptor.xpath.is_empty() || looks_like_xpath(&descriptor.primary)
    }

    fn strategy_type(&self) -> LocatorStrategy {
        LocatorStrategy::Xpath
    }
}

/// ARIA role and accessible-name strategy
pub struct AccessibilityStrategy {
    analyzer: ContextAnalyzer,
}

impl AccessibilityStrategy {
    pub fn new() -> Self {
        Self {
            analyzer: ContextAnalyzer::new(),
        }
    }

    fn score(&self, hints: &AccessibilityHints, element: &ElementSnapshot) -> Option<f64> {
        if let Some(role) = hints.role.as_deref() {
            let explicit = element
                .role
                .as_deref()
                .is_some_and(|r| r.eq_ignore_ascii_case(role));
            let implicit = ElementRole::from_aria(role)
                .is_some_and(|expected| self.analyzer.classify_role(element) == expected);
            if !explicit && !implicit {
                return None;
            }
        }

        match hints.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            None => Some(0.6),
            Some(expected) => {
                let actual = element.accessible_name()?.trim().to_lowercase();
                let expected = expected.to_lowercase();
                if actual == expected {
                    Some(0.85)
                } else if actual.contains(&expected) {
                    Some(0.7)
                } else {
                    None
                }
            }
        }
    }
}

impl Default for AccessibilityStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Strategy for AccessibilityStrategy {
    async fn candidates(
        &self,
        descriptor: &SelectorDescriptor,
        ctx: &LookupContext<'_>,
    ) -> Result<Vec<Candidate>, LocatorError> {
        let Some(hints) = descriptor.accessibility.as_ref() else {
            return Ok(Vec::new());
        };
        debug!("Resolving ARIA role={:?}, name={:?}", hints.role, hints.name);

        let visible = bounded(
            "query_all_visible",
            ctx.call_timeout,
            ctx.driver.query_all_visible(),
        )
        .await?;
        let mut out: Vec<Candidate> = visible
            .iter()
            .filter_map(|el| {
                self.score(hints, el)
                    .map(|score| Candidate::new(el.handle.clone(), score))
            })
            .collect();
        sort_by_confidence(&mut out);
        Ok(out)
    }

    fn applies_to(&self, descriptor: &SelectorDescriptor, _learned: &[String]) -> bool {
        descriptor
            .accessibility
            .as_ref()
            .is_some_and(|h| h.role.is_some() || h.name.is_some())
    }

    fn strategy_type(&self) -> LocatorStrategy {
        LocatorStrategy::Accessibility
    }
}

/// Visual fingerprint similarity strategy
///
/// Matches against the descriptor's own fingerprint, or the one captured the last time the
/// primary selector resolved on the current page.
pub struct VisualStrategy {
    matcher: Arc<VisualMatcher>,
}

impl VisualStrategy {
    pub fn new(matcher: Arc<VisualMatcher>) -> Self {
        Self { matcher }
    }
}

#[async_trait]
impl Strategy for VisualStrategy {
    async fn candidates(
        &self,
        descriptor: &SelectorDescriptor,
        ctx: &LookupContext<'_>,
    ) -> Result<Vec<Candidate>, LocatorError> {
        let target = match &descriptor.visual_fingerprint {
            Some(fingerprint) => fingerprint.clone(),
            None => {
                let url =
                    bounded("current_url", ctx.call_timeout, ctx.driver.current_url()).await?;
                match self.matcher.cache().get(&descriptor.primary, &url) {
                    Some(remembered) => {
                        debug!("Using remembered fingerprint for {}", descriptor.primary);
                        remembered
                    }
                    None => return Ok(Vec::new()),
                }
            }
        };
        let found = self
            .matcher
            .find_similar(ctx.driver, &target, ctx.call_timeout)
            .await
            .map_err(|err| LocatorError::StrategyFailed {
                strategy: self.name().to_string(),
                reason: err.to_string(),
            })?;
        Ok(found
            .into_iter()
            .map(|c| Candidate::new(c.element.handle, c.score))
            .collect())
    }

    fn applies_to(&self, descriptor: &SelectorDescriptor, _learned: &[String]) -> bool {
        descriptor.visual_fingerprint.is_some() || self.matcher.cache().holds(&descriptor.primary)
    }

    fn strategy_type(&self) -> LocatorStrategy {
        LocatorStrategy::Visual
    }
}

/// Semantic context similarity strategy
pub struct SemanticStrategy {
    matcher: Arc<SemanticMatcher>,
}

impl SemanticStrategy {
    pub fn new(matcher: Arc<SemanticMatcher>) -> Self {
        Self { matcher }
    }
}

#[async_trait]
impl Strategy for SemanticStrategy {
    async fn candidates(
        &self,
        descriptor: &SelectorDescriptor,
        ctx: &LookupContext<'_>,
    ) -> Result<Vec<Candidate>, LocatorError> {
        let Some(target) = descriptor.semantic_context.as_ref() else {
            return Ok(Vec::new());
        };
        let found = self
            .matcher
            .find_similar(ctx.driver, target, ctx.call_timeout)
            .await
            .map_err(|err| LocatorError::StrategyFailed {
                strategy: self.name().to_string(),
                reason: err.to_string(),
            })?;
        Ok(found
            .into_iter()
            .map(|c| Candidate::new(c.element.handle, c.score))
            .collect())
    }

    fn applies_to(&self, descriptor: &SelectorDescriptor, _learned: &[String]) -> bool {
        descriptor.semantic_context.is_some()
    }

    fn strategy_type(&self) -> LocatorStrategy {
        LocatorStrategy::Semantic
    }
}

/// Fuzzy text strategy
pub struct FuzzyStrategy {
    threshold: f64,
}

impl FuzzyStrategy {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

#[async_trait]
impl Strategy for FuzzyStrategy {
    async fn candidates(
        &self,
        descriptor: &SelectorDescriptor,
        ctx: &LookupContext<'_>,
    ) -> Result<Vec<Candidate>, LocatorError> {
        let Some(expected) = descriptor.expected_text() else {
            return Ok(Vec::new());
        };
        debug!("Fuzzy text match for: {}", expected);

        let visible = bounded(
            "query_all_visible",
            ctx.call_timeout,
            ctx.driver.query_all_visible(),
        )
        .await?;
        let mut out: Vec<Candidate> = visible
            .iter()
            .filter_map(|el| {
                let by_text = text_similarity(expected, &el.text);
                let by_name = el
                    .accessible_name()
                    .map(|name| text_similarity(expected, name))
                    .unwrap_or(0.0);
                let score = by_text.max(by_name);
                (score >= self.threshold).then(|| Candidate::new(el.handle.clone(), score))
            })
            .collect();
        sort_by_confidence(&mut out);
        Ok(out)
    }

    fn applies_to(&self, descriptor: &SelectorDescriptor, _learned: &[String]) -> bool {
        descriptor.expected_text().is_some()
    }

    fn strategy_type(&self) -> LocatorStrategy {
        LocatorStrategy::Fuzzy
    }
}

fn looks_like_xpath(selector: &str) -> bool {
    let trimmed = selector.trim_start();
    trimmed.starts_with('/') || trimmed.starts_with("(/") || trimmed.starts_with("./")
}

fn sort_by_confidence(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}
