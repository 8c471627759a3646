//! Self-healing locator with learned fallback ordering

use std::sync::Arc;
use std::time::{Duration, Instant};

use adaptive_timing::{ActionKind, AdaptiveTimingController, TimingContext};
use async_trait::async_trait;
use chrono::Utc;
use matcher_semantic::SemanticMatcher;
use matcher_visual::VisualMatcher;
use resilience_core_types::{bounded, BrowserDriver, ElementHandle, OutcomeHistory};
use resilience_event_bus::{EngineEvent, NullBus, SharedBus};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::healing::HealingLog;
use crate::strategies::{default_strategies, LookupContext, Strategy};
use crate::{errors::LocatorError, types::*};

/// Element locator trait
#[async_trait]
pub trait ElementLocator: Send + Sync {
    /// Resolve through the full fallback chain
    async fn locate(&self, descriptor: &SelectorDescriptor) -> Result<LocatedElement, LocatorError> {
        self.locate_with_cancel(descriptor, &CancellationToken::new())
            .await
    }

    /// Resolve through the full fallback chain, failing with [`LocatorError::Cancelled`] once
    /// `cancel` fires
    async fn locate_with_cancel(
        &self,
        descriptor: &SelectorDescriptor,
        cancel: &CancellationToken,
    ) -> Result<LocatedElement, LocatorError>;

    /// Resolve a single CSS selector to an interactable element, without fallbacks
    async fn find_interactable(
        &self,
        selector: &str,
    ) -> Result<Option<ElementHandle>, LocatorError>;
}

/// Locator configuration
#[derive(Debug, Clone)]
pub struct LocatorSettings {
    pub fuzzy_threshold: f64,
    pub healing_log_size: usize,
    /// Driver call bound when no timing controller is attached
    pub default_call_timeout: Duration,
    /// Fingerprint every located element so the visual strategy can find it after a redesign
    pub capture_fingerprints: bool,
}

impl Default for LocatorSettings {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.6,
            healing_log_size: 20,
            default_call_timeout: Duration::from_secs(5),
            capture_fingerprints: true,
        }
    }
}

/// Multi-strategy locator that learns which strategies work per selector
pub struct SelfHealingLocator {
    driver: Arc<dyn BrowserDriver>,
    strategies: Vec<Arc<dyn Strategy>>,
    visual: Option<Arc<VisualMatcher>>,
    history: Arc<OutcomeHistory>,
    healing: HealingLog,
    timing: Option<Arc<AdaptiveTimingController>>,
    bus: SharedBus,
    settings: LocatorSettings,
}

impl SelfHealingLocator {
    /// Create a locator with the default strategy chain
    pub fn new(
        driver: Arc<dyn BrowserDriver>,
        visual: Arc<VisualMatcher>,
        semantic: Arc<SemanticMatcher>,
        settings: LocatorSettings,
    ) -> Self {
        let strategies = default_strategies(visual.clone(), semantic, settings.fuzzy_threshold);
        let mut locator = Self::with_strategies(driver, strategies, settings);
        locator.visual = Some(visual);
        locator
    }

    pub fn with_strategies(
        driver: Arc<dyn BrowserDriver>,
        strategies: Vec<Arc<dyn Strategy>>,
        settings: LocatorSettings,
    ) -> Self {
        Self {
            driver,
            strategies,
            visual: None,
            history: Arc::new(OutcomeHistory::new()),
            healing: HealingLog::new(settings.healing_log_size),
            timing: None,
            bus: NullBus::<EngineEvent>::new(),
            settings,
        }
    }

    pub fn with_history(mut self, history: Arc<OutcomeHistory>) -> Self {
        self.history = history;
        self
    }

    pub fn with_timing(mut self, timing: Arc<AdaptiveTimingController>) -> Self {
        self.timing = Some(timing);
        self
    }

    pub fn with_bus(mut self, bus: SharedBus) -> Self {
        self.bus = bus;
        self
    }

    pub fn history(&self) -> &Arc<OutcomeHistory> {
        &self.history
    }

    pub fn healing_log(&self) -> &HealingLog {
        &self.healing
    }

    /// Strategy names in the order the next lookup for `selector` would try them
    pub fn planned_order(&self, selector: &str) -> Vec<String> {
        self.ranked(selector)
            .into_iter()
            .map(|entry| entry.name)
            .collect()
    }

    async fn resolve(
        &self,
        descriptor: &SelectorDescriptor,
        cancel: &CancellationToken,
    ) -> Result<LocatedElement, LocatorError> {
        if descriptor.primary.trim().is_empty() {
            return Err(LocatorError::InvalidDescriptor(
                "Empty primary selector".to_string(),
            ));
        }
        info!("Resolving element: {}", descriptor.primary);

        let started = Instant::now();
        let call_timeout = self.call_timeout().await;
        let learned = self.healing.learned_selectors(&descriptor.primary);
        let ctx = LookupContext {
            driver: &self.driver,
            call_timeout,
            learned: &learned,
        };
        let mut attempts = Vec::new();

        for entry in self.ranked(&descriptor.primary) {
            if cancel.is_cancelled() {
                return Err(LocatorError::Cancelled);
            }
            let strategy = entry.item;
            if !strategy.applies_to(descriptor, &learned) {
                debug!("Strategy {} not applicable", strategy.name());
                continue;
            }
            debug!(
                "Trying strategy: {} (priority {:.2})",
                strategy.name(),
                entry.adjusted_priority
            );

            let step = Instant::now();
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(LocatorError::Cancelled),
                found = strategy.candidates(descriptor, &ctx) => match found {
                    Ok(candidates) => self.first_interactable(candidates, call_timeout).await,
                    Err(err) => Err(err.to_string()),
                },
            };
            let success = outcome.is_ok();
            attempts.push(StrategyAttempt {
                strategy: strategy.strategy_type(),
                duration: step.elapsed(),
                success,
                error: outcome.as_ref().err().cloned(),
            });
            self.record_outcome(&descriptor.primary, strategy.name(), success);

            match outcome {
                Ok((candidate, snapshot)) => {
                    let kind = strategy.strategy_type();
                    info!(
                        "Resolved element using {} strategy: {} (confidence: {:.2})",
                        kind.name(),
                        candidate.handle,
                        candidate.confidence
                    );
                    if kind != LocatorStrategy::Css {
                        self.healing.record(
                            &descriptor.primary,
                            kind,
                            candidate.matched_selector.clone(),
                            &snapshot,
                        );
                    }
                    let duration = started.elapsed();
                    self.bus.publish(EngineEvent::ElementFound {
                        selector: descriptor.primary.clone(),
                        strategy: kind.name().to_string(),
                        matched_selector: candidate.matched_selector.clone(),
                        duration_ms: duration.as_millis() as u64,
                        attempts: attempts.len(),
                        at: Utc::now(),
                    });
                    if let Some(timing) = &self.timing {
                        timing.record_outcome(ActionKind::Query, duration, true);
                    }
                    self.remember_fingerprint(&descriptor.primary, &candidate.handle, call_timeout)
                        .await;
                    return Ok(LocatedElement {
                        handle: candidate.handle,
                        snapshot,
                        strategy: kind,
                        matched_selector: candidate.matched_selector,
                        confidence: candidate.confidence,
                        duration,
                        attempts,
                    });
                }
                Err(reason) => {
                    debug!("Strategy {} missed: {}", strategy.name(), reason);
                }
            }
        }

        let duration = started.elapsed();
        warn!(
            "All strategies exhausted for selector: {} ({} tried)",
            descriptor.primary,
            attempts.len()
        );
        self.bus.publish(EngineEvent::ElementNotFound {
            selector: descriptor.primary.clone(),
            attempts: attempts.len(),
            duration_ms: duration.as_millis() as u64,
            at: Utc::now(),
        });
        if let Some(timing) = &self.timing {
            timing.record_outcome(ActionKind::Query, duration, false);
        }
        Err(LocatorError::ElementNotFound {
            selector: descriptor.primary.clone(),
            attempts,
        })
    }

    fn ranked(&self, selector: &str) -> Vec<resilience_core_types::RankedEntry<Arc<dyn Strategy>>> {
        let items = self
            .strategies
            .iter()
            .map(|s| {
                let kind = s.strategy_type();
                (s.clone(), kind.name().to_string(), kind.priority())
            })
            .collect();
        self.history.rank(selector, items)
    }

    async fn call_timeout(&self) -> Duration {
        match &self.timing {
            Some(timing) => {
                timing
                    .timeout_for(ActionKind::Query, &TimingContext::default())
                    .await
            }
            None => self.settings.default_call_timeout,
        }
    }

    /// First visible and enabled candidate; hidden or disabled ones are misses
    async fn first_interactable(
        &self,
        candidates: Vec<Candidate>,
        call_timeout: Duration,
    ) -> Result<(Candidate, resilience_core_types::ElementSnapshot), String> {
        if candidates.is_empty() {
            return Err("no candidates".to_string());
        }
        let total = candidates.len();
        for candidate in candidates {
            match bounded("describe", call_timeout, self.driver.describe(&candidate.handle)).await {
                Ok(snapshot) if snapshot.is_interactable() => return Ok((candidate, snapshot)),
                Ok(_) => debug!("Candidate {} not interactable", candidate.handle),
                Err(err) => debug!("Candidate {} could not be described: {}", candidate.handle, err),
            }
        }
        Err(format!("{total} candidate(s), none visible and enabled"))
    }

    /// Cache the located element's fingerprint under the descriptor's primary selector
    async fn remember_fingerprint(
        &self,
        selector: &str,
        handle: &ElementHandle,
        call_timeout: Duration,
    ) {
        let Some(visual) = self.visual.as_ref().filter(|_| self.settings.capture_fingerprints)
        else {
            return;
        };
        if let Err(err) = visual
            .fingerprint_element(&self.driver, selector, handle, call_timeout)
            .await
        {
            debug!("No fingerprint for '{}': {}", selector, err);
        }
    }

    fn record_outcome(&self, selector: &str, strategy: &str, success: bool) {
        let stats = self.history.record(selector, strategy, success);
        self.bus.publish(EngineEvent::StrategyStatsUpdated {
            key: selector.to_string(),
            strategy: strategy.to_string(),
            attempts: stats.attempts,
            success_rate: stats.success_rate(),
            at: Utc::now(),
        });
    }
}

#[async_trait]
impl ElementLocator for SelfHealingLocator {
    async fn locate_with_cancel(
        &self,
        descriptor: &SelectorDescriptor,
        cancel: &CancellationToken,
    ) -> Result<LocatedElement, LocatorError> {
        self.resolve(descriptor, cancel).await
    }

    async fn find_interactable(
        &self,
        selector: &str,
    ) -> Result<Option<ElementHandle>, LocatorError> {
        let call_timeout = self.call_timeout().await;
        let Some(handle) =
            bounded("query_selector", call_timeout, self.driver.query_selector(selector)).await?
        else {
            return Ok(None);
        };
        let snapshot = bounded("describe", call_timeout, self.driver.describe(&handle)).await?;
        Ok(snapshot.is_interactable().then_some(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use image::{ImageBuffer, ImageOutputFormat, Luma};
    use resilience_core_types::fake::{element, FakeDriver};
    use resilience_core_types::{BoundingBox, PageState};
    use resilience_event_bus::{EventBus, InMemoryBus};

    use crate::strategies::LookupContext;

    fn locator(fake: Arc<FakeDriver>) -> SelfHealingLocator {
        SelfHealingLocator::new(
            fake,
            Arc::new(VisualMatcher::default()),
            Arc::new(SemanticMatcher::default()),
            LocatorSettings::default(),
        )
    }

    fn checkout_page() -> FakeDriver {
        let mut hidden = element("old", "button");
        hidden.visible = false;
        FakeDriver::new()
            .with_element(hidden)
            .with_element(element("new", "button"))
            .map_css(".submit-button", "old")
            .map_css("#submit", "new")
    }

    #[tokio::test]
    async fn test_hidden_primary_falls_back_to_alternative() {
        let fake = Arc::new(checkout_page());
        let locator = locator(fake);
        let descriptor = SelectorDescriptor::new(".submit-button").with_alternatives(["#submit"]);

        let found = locator.locate(&descriptor).await.unwrap();
        assert_eq!(found.handle.0, "new");
        assert_eq!(found.strategy, LocatorStrategy::AlternativeSelector);
        assert_eq!(found.matched_selector.as_deref(), Some("#submit"));
        assert_eq!(found.attempts.len(), 2);
        assert!(!found.attempts[0].success);
        assert!(found.attempts[1].success);

        let heals = locator.healing_log().history(".submit-button");
        assert_eq!(heals.len(), 1);
        assert_eq!(heals[0].strategy, LocatorStrategy::AlternativeSelector);
    }

    #[tokio::test]
    async fn test_exhaustion_carries_full_trace() {
        let fake = Arc::new(FakeDriver::new());
        let bus = InMemoryBus::<EngineEvent>::new(16);
        let mut rx = bus.subscribe();
        let locator = locator(fake).with_bus(bus.clone());
        let descriptor = SelectorDescriptor::new(".gone")
            .with_alternatives(["#gone"])
            .with_xpath("//button[@id='gone']")
            .with_text("Gone");

        let err = locator.locate(&descriptor).await.unwrap_err();
        match &err {
            LocatorError::ElementNotFound { selector, attempts } => {
                assert_eq!(selector, ".gone");
                let tried: Vec<_> = attempts.iter().map(|a| a.strategy).collect();
                assert_eq!(
                    tried,
                    vec![
                        LocatorStrategy::Css,
                        LocatorStrategy::AlternativeSelector,
                        LocatorStrategy::Xpath,
                        LocatorStrategy::Fuzzy
                    ]
                );
                assert!(attempts.iter().all(|a| !a.success && a.error.is_some()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().starts_with("Element not found for selector: .gone"));

        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(event.name());
        }
        assert_eq!(names.last(), Some(&"element-not-found"));
        assert_eq!(
            names.iter().filter(|n| **n == "strategy-stats-updated").count(),
            4
        );
    }

    #[tokio::test]
    async fn test_history_reorders_strategies() {
        let fake = Arc::new(checkout_page());
        let locator = locator(fake);
        let descriptor = SelectorDescriptor::new(".submit-button").with_alternatives(["#submit"]);

        for _ in 0..10 {
            locator.locate(&descriptor).await.unwrap();
        }
        let order = locator.planned_order(".submit-button");
        assert_eq!(order[0], "alternative-selector");
        assert_eq!(order[1], "css");

        let found = locator.locate(&descriptor).await.unwrap();
        assert_eq!(found.attempts.len(), 1);
    }

    #[tokio::test]
    async fn test_learned_selector_is_reused() {
        let fake = Arc::new(checkout_page());
        let locator = locator(fake);
        let with_alt = SelectorDescriptor::new(".submit-button").with_alternatives(["#submit"]);
        locator.locate(&with_alt).await.unwrap();

        let bare = SelectorDescriptor::new(".submit-button");
        let found = locator.locate(&bare).await.unwrap();
        assert_eq!(found.strategy, LocatorStrategy::AlternativeSelector);
        assert_eq!(found.matched_selector.as_deref(), Some("#submit"));
    }

    #[tokio::test]
    async fn test_find_interactable_skips_hidden_elements() {
        let fake = Arc::new(checkout_page());
        let locator = locator(fake.clone());
        assert!(locator.find_interactable(".submit-button").await.unwrap().is_none());
        assert_eq!(
            locator.find_interactable("#submit").await.unwrap(),
            Some(ElementHandle::new("new"))
        );
        fake.set_visible("new", false);
        assert!(locator.find_interactable("#submit").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancelled_lookup() {
        let locator = locator(Arc::new(checkout_page()));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = locator
            .locate_with_cancel(&SelectorDescriptor::new("#submit"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, LocatorError::Cancelled));
    }

    /// Dark left half, light right half
    fn split_png() -> Vec<u8> {
        let img = ImageBuffer::from_fn(32, 32, |x, _| if x < 16 { Luma([20u8]) } else { Luma([230u8]) });
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageLuma8(img)
            .write_to(&mut out, ImageOutputFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn pay_button(handle: &str, x: f64) -> resilience_core_types::ElementSnapshot {
        let mut el = element(handle, "button");
        el.bounding_box = Some(BoundingBox::new(x, 300.0, 120.0, 40.0));
        el.parent = Some("form#checkout".into());
        el
    }

    #[tokio::test]
    async fn test_remembered_fingerprint_heals_after_redesign() {
        let fake = Arc::new(
            FakeDriver::new()
                .with_page_state(PageState {
                    url: "https://shop.test/checkout".into(),
                    ..Default::default()
                })
                .with_element(pay_button("pay-old", 100.0))
                .with_element(pay_button("pay-new", 110.0))
                .with_screenshot("pay-old", split_png())
                .with_screenshot("pay-new", split_png())
                .map_css("#pay", "pay-old"),
        );
        let visual = Arc::new(VisualMatcher::default());
        let locator = SelfHealingLocator::new(
            fake.clone(),
            visual.clone(),
            Arc::new(SemanticMatcher::default()),
            LocatorSettings::default(),
        );
        let descriptor = SelectorDescriptor::new("#pay");

        let first = locator.locate(&descriptor).await.unwrap();
        assert_eq!(first.strategy, LocatorStrategy::Css);
        assert!(visual
            .cache()
            .get("#pay", "https://shop.test/checkout")
            .is_some());

        fake.set_visible("pay-old", false);
        let healed = locator.locate(&descriptor).await.unwrap();
        assert_eq!(healed.strategy, LocatorStrategy::Visual);
        assert_eq!(healed.handle.0, "pay-new");
        assert_eq!(
            locator.healing_log().history("#pay")[0].strategy,
            LocatorStrategy::Visual
        );
    }

    #[tokio::test]
    async fn test_fingerprint_capture_can_be_disabled() {
        let fake = Arc::new(
            FakeDriver::new()
                .with_element(pay_button("pay", 100.0))
                .with_screenshot("pay", split_png())
                .map_css("#pay", "pay"),
        );
        let visual = Arc::new(VisualMatcher::default());
        let locator = SelfHealingLocator::new(
            fake,
            visual.clone(),
            Arc::new(SemanticMatcher::default()),
            LocatorSettings {
                capture_fingerprints: false,
                ..Default::default()
            },
        );
        locator.locate(&SelectorDescriptor::new("#pay")).await.unwrap();
        assert!(visual.cache().is_empty());
    }

    /// Cancels the lookup from inside the chain and never yields a candidate
    struct CancelsLookup(CancellationToken);

    #[async_trait]
    impl Strategy for CancelsLookup {
        async fn candidates(
            &self,
            _descriptor: &SelectorDescriptor,
            _ctx: &LookupContext<'_>,
        ) -> Result<Vec<Candidate>, LocatorError> {
            self.0.cancel();
            Ok(Vec::new())
        }

        fn applies_to(&self, _descriptor: &SelectorDescriptor, _learned: &[String]) -> bool {
            true
        }

        fn strategy_type(&self) -> LocatorStrategy {
            LocatorStrategy::Css
        }
    }

    struct CountingStrategy(Arc<AtomicUsize>);

    #[async_trait]
    impl Strategy for CountingStrategy {
        async fn candidates(
            &self,
            _descriptor: &SelectorDescriptor,
            _ctx: &LookupContext<'_>,
        ) -> Result<Vec<Candidate>, LocatorError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        fn applies_to(&self, _descriptor: &SelectorDescriptor, _learned: &[String]) -> bool {
            true
        }

        fn strategy_type(&self) -> LocatorStrategy {
            LocatorStrategy::Semantic
        }
    }

    #[tokio::test]
    async fn test_cancel_mid_chain_stops_healing() {
        let cancel = CancellationToken::new();
        let later = Arc::new(AtomicUsize::new(0));
        let locator = SelfHealingLocator::with_strategies(
            Arc::new(FakeDriver::new()),
            vec![
                Arc::new(CancelsLookup(cancel.clone())),
                Arc::new(CountingStrategy(later.clone())),
            ],
            LocatorSettings::default(),
        );

        let err = locator
            .locate_with_cancel(&SelectorDescriptor::new("#pay"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, LocatorError::Cancelled));
        assert_eq!(later.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_selector_rejected() {
        let locator = locator(Arc::new(FakeDriver::new()));
        let err = locator.locate(&SelectorDescriptor::new("  ")).await.unwrap_err();
        assert!(matches!(err, LocatorError::InvalidDescriptor(_)));
    }
}
