//! Engine facade

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use action_flow::{FlowError, OperationContext, RetryController, TracingObserver};
use action_locator::{
    ElementLocator, LocatedElement, LocatorError, SelectorDescriptor, SelfHealingLocator,
};
use adaptive_timing::AdaptiveTimingController;
use chrono::Utc;
use matcher_semantic::SemanticMatcher;
use matcher_visual::VisualMatcher;
use resilience_config::ResilienceConfig;
use resilience_core_types::{BrowserDriver, OutcomeHistory};
use resilience_event_bus::{EngineEvent, EventBus, InMemoryBus, SharedBus};
use resilience_recovery::{
    BuiltinDeps, CircuitBreaker, ContextMap, DiagnosticReport, DiagnosticsStore,
    ErrorClassification, ErrorClassifier, ErrorHandler, Failure, HandledError, PatternSet,
    RecoveryContext, RecoveryError, RecoveryExecutor, StrategyRegistry,
};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::errors::EngineError;
use crate::settings;

/// Every component, built once from a [`ResilienceConfig`] around one browser driver
pub struct ResilienceEngine {
    config: ResilienceConfig,
    bus: SharedBus,
    history: Arc<OutcomeHistory>,
    timing: Arc<AdaptiveTimingController>,
    locator: Arc<SelfHealingLocator>,
    breaker: Arc<CircuitBreaker>,
    handler: Arc<ErrorHandler>,
    controller: Arc<RetryController>,
}

impl ResilienceEngine {
    pub fn new(
        config: ResilienceConfig,
        driver: Arc<dyn BrowserDriver>,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let bus: SharedBus = InMemoryBus::<EngineEvent>::new(config.events.channel_capacity);
        let history = Arc::new(OutcomeHistory::with_weighting(
            config.history.min_samples,
            config.history.max_shift,
        ));

        let timing = Arc::new(AdaptiveTimingController::new(
            driver.clone(),
            settings::timing_settings(&config),
        ));
        let visual = Arc::new(VisualMatcher::new(settings::visual_settings(&config)));
        let semantic = Arc::new(SemanticMatcher::new(settings::semantic_settings(&config)));
        let locator = Arc::new(
            SelfHealingLocator::new(
                driver.clone(),
                visual,
                semantic,
                settings::locator_settings(&config),
            )
            .with_history(history.clone())
            .with_timing(timing.clone())
            .with_bus(bus.clone()),
        );

        let policy = settings::retry_policy(&config);
        let breaker = Arc::new(CircuitBreaker::new(settings::circuit_settings(&config)));
        let registry = StrategyRegistry::builtin(BuiltinDeps {
            driver,
            locator: locator.clone() as Arc<dyn ElementLocator>,
            breaker: breaker.clone(),
            policy: policy.clone(),
            settings: settings::recovery_settings(&config),
        });
        let executor = RecoveryExecutor::new(Arc::new(registry), history.clone())
            .with_bus(bus.clone());
        let classifier = ErrorClassifier::new(
            PatternSet::builtin(),
            settings::classifier_settings(&config),
        );
        let handler = Arc::new(
            ErrorHandler::new(
                Arc::new(classifier),
                Arc::new(executor),
                settings::diagnostics_settings(&config),
            )
            .with_bus(bus.clone()),
        );

        let controller = RetryController::new(handler.clone(), breaker.clone(), policy)
            .with_bus(bus.clone());
        controller.add_observer(Arc::new(TracingObserver));

        info!(
            "Resilience engine ready (max attempts {}, circuit threshold {})",
            config.retry.max_attempts, config.circuit_breaker.failure_threshold
        );

        Ok(Self {
            config,
            bus,
            history,
            timing,
            locator,
            breaker,
            handler,
            controller: Arc::new(controller),
        })
    }

    /// Load configuration from `path` (plus environment overrides) and build the engine
    pub fn from_path(
        path: Option<&Path>,
        driver: Arc<dyn BrowserDriver>,
    ) -> Result<Self, EngineError> {
        let config = resilience_config::load_config(path)?;
        Self::new(config, driver)
    }

    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    pub async fn locate(
        &self,
        descriptor: &SelectorDescriptor,
    ) -> Result<LocatedElement, LocatorError> {
        self.locator.locate(descriptor).await
    }

    pub async fn locate_with_cancel(
        &self,
        descriptor: &SelectorDescriptor,
        cancel: &CancellationToken,
    ) -> Result<LocatedElement, LocatorError> {
        self.locator.locate_with_cancel(descriptor, cancel).await
    }

    /// Run `attempt_fn` under the retry controller
    pub async fn execute<T, E, F, Fut>(
        &self,
        operation: OperationContext,
        attempt_fn: F,
    ) -> Result<T, FlowError<E>>
    where
        F: FnMut(action_flow::AttemptContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + 'static,
    {
        self.controller.retry_with_backoff(operation, attempt_fn).await
    }

    pub fn classify(&self, failure: &Failure, context: &ContextMap) -> ErrorClassification {
        self.handler.classifier().classify(failure, context)
    }

    /// Classify, recover and report one failure outside the retry loop
    pub async fn handle(
        &self,
        failure: &Failure,
        ctx: &RecoveryContext,
    ) -> Result<HandledError, RecoveryError> {
        self.handler.handle(failure, ctx).await
    }

    /// Diagnostic report for a failure, without running recovery
    pub fn report(&self, failure: &Failure, context: &ContextMap) -> DiagnosticReport {
        let classification = self.classify(failure, context);
        self.handler.report(failure, &classification, context, None)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.bus.subscribe()
    }

    pub fn diagnostics(&self) -> &Arc<DiagnosticsStore> {
        self.handler.diagnostics()
    }

    /// Drop strategy, timing and operation history older than the retention window, plus
    /// circuit keys with no failure left in their window
    pub fn prune_history(&self) -> usize {
        let now = Utc::now();
        let cutoff = now - settings::history_retention(&self.config);
        self.history.prune_older_than(cutoff)
            + self.timing.history().prune(now)
            + self.controller.prune_stats(cutoff)
            + self.breaker.prune(now)
    }

    pub fn history(&self) -> &Arc<OutcomeHistory> {
        &self.history
    }

    pub fn timing(&self) -> &Arc<AdaptiveTimingController> {
        &self.timing
    }

    pub fn locator(&self) -> &Arc<SelfHealingLocator> {
        &self.locator
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn handler(&self) -> &Arc<ErrorHandler> {
        &self.handler
    }

    pub fn controller(&self) -> &Arc<RetryController> {
        &self.controller
    }
}
