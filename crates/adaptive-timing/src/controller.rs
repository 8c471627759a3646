use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use resilience_core_types::{bounded, BrowserDriver};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::TimingSettings;
use crate::history::{HistorySummary, TimingHistory};
use crate::multipliers::{
    complexity_multiplier, context_multiplier, history_multiplier, network_multiplier,
};
use crate::types::*;

/// Predicts timeouts and wait strategies for upcoming actions.
pub struct AdaptiveTimingController {
    driver: Arc<dyn BrowserDriver>,
    settings: TimingSettings,
    network: RwLock<Option<(NetworkConditions, Instant)>>,
    complexity: RwLock<Option<(PageComplexity, Instant)>>,
    history: TimingHistory,
}

impl AdaptiveTimingController {
    pub fn new(driver: Arc<dyn BrowserDriver>, settings: TimingSettings) -> Self {
        let history = TimingHistory::new(settings.history_max_entries, settings.history_retention);
        Self {
            driver,
            settings,
            network: RwLock::new(None),
            complexity: RwLock::new(None),
            history,
        }
    }

    pub fn settings(&self) -> &TimingSettings {
        &self.settings
    }

    pub fn history(&self) -> &TimingHistory {
        &self.history
    }

    /// Timeout and wait plan for `kind` under the current conditions.
    pub async fn decide(&self, kind: ActionKind, context: &TimingContext) -> TimingDecision {
        let network = self.network_conditions().await;
        let complexity = self.page_complexity().await;
        let summary = self.history.summary(kind);
        let multipliers = self.multipliers(kind, &network, &complexity, summary.as_ref(), context);

        TimingDecision {
            kind,
            timeout: self.clamp(kind.baseline().mul_f64(multipliers.product())),
            wait: select_wait_plan(kind, &complexity),
            multipliers,
        }
    }

    /// Shorthand for `decide(kind, context).timeout`.
    pub async fn timeout_for(&self, kind: ActionKind, context: &TimingContext) -> Duration {
        self.decide(kind, context).await.timeout
    }

    pub fn multipliers(
        &self,
        kind: ActionKind,
        network: &NetworkConditions,
        complexity: &PageComplexity,
        history: Option<&HistorySummary>,
        context: &TimingContext,
    ) -> Multipliers {
        Multipliers {
            network: network_multiplier(network),
            complexity: complexity_multiplier(complexity),
            history: history_multiplier(history, kind.baseline(), self.settings.history_min_samples),
            context: context_multiplier(context),
        }
    }

    /// Record an observed outcome; feeds the history multiplier.
    pub fn record_outcome(&self, kind: ActionKind, duration: Duration, success: bool) {
        debug!(
            "timing outcome {} {}ms success={}",
            kind,
            duration.as_millis(),
            success
        );
        self.history.record(kind, duration, success);
    }

    /// Cached network conditions, refreshed after `network_refresh`.
    pub async fn network_conditions(&self) -> NetworkConditions {
        if let Some((cached, at)) = self.network.read().as_ref() {
            if at.elapsed() < self.settings.network_refresh {
                return cached.clone();
            }
        }

        let conditions = match bounded(
            "network_sample",
            self.settings.driver_call_timeout(),
            self.driver.network_sample(),
        )
        .await
        {
            Ok(sample) => NetworkConditions {
                latency_ms: sample.latency_ms,
                connection: sample.connection,
                online: sample.online,
            },
            Err(err) => {
                warn!("network sample failed, assuming unknown connection: {}", err);
                NetworkConditions::default()
            }
        };
        *self.network.write() = Some((conditions.clone(), Instant::now()));
        conditions
    }

    /// Cached page complexity, re-read at most once per `complexity_min_interval`.
    pub async fn page_complexity(&self) -> PageComplexity {
        if let Some((cached, at)) = self.complexity.read().as_ref() {
            if at.elapsed() < self.settings.complexity_min_interval {
                return cached.clone();
            }
        }

        let complexity = match bounded(
            "page_state",
            self.settings.driver_call_timeout(),
            self.driver.page_state(),
        )
        .await
        {
            Ok(page) => PageComplexity::from(&page),
            Err(err) => {
                warn!("page state read failed, assuming simple page: {}", err);
                PageComplexity::default()
            }
        };
        *self.complexity.write() = Some((complexity.clone(), Instant::now()));
        complexity
    }

    /// Forget cached measurements (after navigation, for instance).
    pub fn invalidate(&self) {
        *self.network.write() = None;
        *self.complexity.write() = None;
    }

    fn clamp(&self, timeout: Duration) -> Duration {
        timeout.clamp(self.settings.min_timeout, self.settings.max_timeout)
    }
}

/// Primary strategy from the action kind and page signals, plus ordered fallbacks.
pub fn select_wait_plan(kind: ActionKind, complexity: &PageComplexity) -> WaitPlan {
    use WaitStrategy::*;

    if kind == ActionKind::Navigate {
        return WaitPlan::new(NavigationComplete, [DomContentLoaded, NetworkIdle, DomStable]);
    }
    if complexity.loading {
        return WaitPlan::new(DomContentLoaded, [ElementVisible, NetworkIdle, FixedDelay]);
    }
    if complexity.active_ajax > 0 {
        return WaitPlan::new(AjaxComplete, [NetworkIdle, ElementInteractable, DomStable]);
    }
    if complexity.dynamic {
        return WaitPlan::new(DomStable, [ElementInteractable, NetworkIdle, FixedDelay]);
    }
    match kind {
        ActionKind::Click | ActionKind::Submit | ActionKind::Select | ActionKind::Type => {
            WaitPlan::new(ElementInteractable, [ElementVisible, DomStable, FixedDelay])
        }
        ActionKind::Upload => WaitPlan::new(ElementInteractable, [NetworkIdle, FixedDelay]),
        ActionKind::Wait => WaitPlan::new(DomStable, [NetworkIdle, FixedDelay]),
        _ => WaitPlan::new(ElementVisible, [DomStable, FixedDelay]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resilience_core_types::fake::FakeDriver;
    use resilience_core_types::{ConnectionClass, NetworkSample, PageState};

    fn controller(fake: Arc<FakeDriver>) -> AdaptiveTimingController {
        AdaptiveTimingController::new(fake, TimingSettings::default())
    }

    #[tokio::test(start_paused = true)]
    async fn baseline_on_fast_simple_page() {
        let fake = Arc::new(FakeDriver::new().with_network(NetworkSample {
            latency_ms: 20.0,
            connection: ConnectionClass::Wifi,
            online: true,
        }));
        let timing = controller(fake);
        let decision = timing
            .decide(ActionKind::Click, &TimingContext::default())
            .await;
        assert_eq!(decision.timeout, Duration::from_millis(5_000));
        assert_eq!(decision.wait.primary, WaitStrategy::ElementInteractable);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_network_and_heavy_page_are_clamped() {
        let fake = Arc::new(
            FakeDriver::new()
                .with_network(NetworkSample {
                    latency_ms: 1_500.0,
                    connection: ConnectionClass::Slow2g,
                    online: true,
                })
                .with_page_state(PageState {
                    dom_size: 10_000,
                    script_count: 80,
                    framework_markers: vec!["react".into()],
                    active_ajax: 2,
                    ..Default::default()
                }),
        );
        let timing = controller(fake);
        let decision = timing
            .decide(ActionKind::Navigate, &TimingContext::default())
            .await;
        assert_eq!(decision.multipliers.network, 5.0);
        assert_eq!(decision.timeout, Duration::from_millis(60_000));
        assert_eq!(decision.wait.primary, WaitStrategy::NavigationComplete);
    }

    #[tokio::test(start_paused = true)]
    async fn measurements_are_cached() {
        let fake = Arc::new(FakeDriver::new());
        let timing = controller(fake.clone());
        let ctx = TimingContext::default();

        timing.decide(ActionKind::Click, &ctx).await;
        timing.decide(ActionKind::Click, &ctx).await;
        assert_eq!(fake.network_samples(), 1);
        assert_eq!(fake.page_state_reads(), 1);

        tokio::time::advance(Duration::from_secs(6)).await;
        timing.decide(ActionKind::Click, &ctx).await;
        assert_eq!(fake.network_samples(), 1);
        assert_eq!(fake.page_state_reads(), 2);

        tokio::time::advance(Duration::from_secs(30)).await;
        timing.decide(ActionKind::Click, &ctx).await;
        assert_eq!(fake.network_samples(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn recorded_failures_lengthen_timeouts() {
        let fake = Arc::new(FakeDriver::new().with_network(NetworkSample {
            latency_ms: 20.0,
            connection: ConnectionClass::FourG,
            online: true,
        }));
        let timing = controller(fake);
        for _ in 0..4 {
            timing.record_outcome(ActionKind::Click, Duration::from_millis(4_000), false);
        }
        let decision = timing
            .decide(ActionKind::Click, &TimingContext::default())
            .await;
        assert_eq!(decision.multipliers.history, 1.5);
        assert_eq!(decision.timeout, Duration::from_millis(7_500));
    }

    #[test]
    fn wait_plan_prefers_ajax_then_dynamic() {
        let ajax = PageComplexity {
            active_ajax: 1,
            dynamic: true,
            ..Default::default()
        };
        assert_eq!(
            select_wait_plan(ActionKind::Click, &ajax).primary,
            WaitStrategy::AjaxComplete
        );
        let dynamic = PageComplexity {
            dynamic: true,
            ..Default::default()
        };
        assert_eq!(
            select_wait_plan(ActionKind::Click, &dynamic).primary,
            WaitStrategy::DomStable
        );
        assert!(select_wait_plan(ActionKind::Hover, &PageComplexity::default())
            .fallbacks
            .len()
            <= WaitPlan::MAX_FALLBACKS);
    }

    #[test]
    fn parsing_document_waits_for_dom_content_loaded() {
        let parsing = PageComplexity::from(&PageState {
            ready_state: "loading".into(),
            ..Default::default()
        });
        assert!(parsing.loading);
        assert_eq!(
            select_wait_plan(ActionKind::Click, &parsing).primary,
            WaitStrategy::DomContentLoaded
        );

        let navigation = select_wait_plan(ActionKind::Navigate, &PageComplexity::default());
        assert_eq!(navigation.primary, WaitStrategy::NavigationComplete);
        assert_eq!(navigation.fallbacks[0], WaitStrategy::DomContentLoaded);
    }
}
