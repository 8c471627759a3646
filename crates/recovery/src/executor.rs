//! Recovery strategy registry and executor

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use action_locator::ElementLocator;
use adaptive_timing::StabilitySettings;
use chrono::Utc;
use resilience_core_types::{BrowserDriver, OutcomeHistory};
use resilience_event_bus::{EngineEvent, NullBus, SharedBus};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backoff::RetryPolicy;
use crate::circuit::CircuitBreaker;
use crate::errors::{RecoveryError, Result};
use crate::strategies::*;
use crate::types::{ErrorClassification, ErrorKind, RecoveryAction, RecoveryContext, RecoveryOutcome};

pub const EXHAUSTED_REASON: &str = "All recovery strategies failed";

/// Tunables for the built-in strategies
#[derive(Debug, Clone)]
pub struct RecoverySettings {
    pub wait_delay: Duration,
    pub timeout_multiplier: f64,
    pub default_timeout: Duration,
    pub max_timeout: Duration,
    pub stability: StabilitySettings,
    /// Bound on driver calls made by strategies (reload, page-state re-check)
    pub driver_call_timeout: Duration,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            wait_delay: Duration::from_millis(1_000),
            timeout_multiplier: 1.5,
            default_timeout: Duration::from_millis(30_000),
            max_timeout: Duration::from_millis(120_000),
            stability: StabilitySettings::default(),
            driver_call_timeout: Duration::from_millis(30_000),
        }
    }
}

/// Collaborators the built-in strategies need
pub struct BuiltinDeps {
    pub driver: Arc<dyn BrowserDriver>,
    pub locator: Arc<dyn ElementLocator>,
    pub breaker: Arc<CircuitBreaker>,
    pub policy: RetryPolicy,
    pub settings: RecoverySettings,
}

/// Strategies registered per error kind; immutable once built
pub struct StrategyRegistry {
    by_kind: HashMap<ErrorKind, Vec<Arc<dyn RecoveryStrategy>>>,
}

impl StrategyRegistry {
    pub fn builder() -> StrategyRegistryBuilder {
        StrategyRegistryBuilder::default()
    }

    pub fn builtin(deps: BuiltinDeps) -> Self {
        let BuiltinDeps {
            driver,
            locator,
            breaker,
            policy,
            settings,
        } = deps;

        Self::builder()
            .fallback_delay(settings.wait_delay)
            .register(
                ErrorKind::ElementNotFound,
                Arc::new(WaitAndRetry::rechecking(settings.wait_delay, locator.clone())),
            )
            .register(ErrorKind::ElementNotFound, Arc::new(AlternativeSelector))
            .register(ErrorKind::ElementNotFound, Arc::new(VisualMatching::new(locator)))
            .register(
                ErrorKind::Timeout,
                Arc::new(IncreaseTimeout::new(
                    settings.timeout_multiplier,
                    settings.default_timeout,
                    settings.max_timeout,
                )),
            )
            .register(
                ErrorKind::Timeout,
                Arc::new(WaitForStability::new(driver.clone(), settings.stability.clone())),
            )
            .register(ErrorKind::NetworkError, Arc::new(CircuitBreakerCheck::new(breaker)))
            .register(ErrorKind::NetworkError, Arc::new(ExponentialBackoff::new(policy)))
            .register(
                ErrorKind::PageError,
                Arc::new(RefreshPage::new(driver.clone(), settings.driver_call_timeout)),
            )
            .register(ErrorKind::PageError, Arc::new(RestartBrowser))
            .register(ErrorKind::DataError, Arc::new(DataTransformation))
            .register(ErrorKind::DataError, Arc::new(FallbackData))
            .register(
                ErrorKind::Unknown,
                Arc::new(WaitAndRetry::generic(
                    settings.wait_delay,
                    driver,
                    settings.driver_call_timeout,
                )),
            )
            .build()
    }

    /// Strategies for `kind`, or the `unknown` fallback set; never empty
    pub fn strategies_for(&self, kind: ErrorKind) -> &[Arc<dyn RecoveryStrategy>] {
        match self.by_kind.get(&kind).filter(|list| !list.is_empty()) {
            Some(list) => list,
            None => self
                .by_kind
                .get(&ErrorKind::Unknown)
                .map(Vec::as_slice)
                .unwrap_or_default(),
        }
    }

    pub fn names_for(&self, kind: ErrorKind) -> Vec<String> {
        self.strategies_for(kind)
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }
}

pub struct StrategyRegistryBuilder {
    by_kind: HashMap<ErrorKind, Vec<Arc<dyn RecoveryStrategy>>>,
    fallback_delay: Duration,
}

impl Default for StrategyRegistryBuilder {
    fn default() -> Self {
        Self {
            by_kind: HashMap::new(),
            fallback_delay: Duration::from_millis(1_000),
        }
    }
}

impl StrategyRegistryBuilder {
    pub fn register(mut self, kind: ErrorKind, strategy: Arc<dyn RecoveryStrategy>) -> Self {
        self.by_kind.entry(kind).or_default().push(strategy);
        self
    }

    /// Delay of the generic wait installed when nothing is registered for `unknown`
    pub fn fallback_delay(mut self, delay: Duration) -> Self {
        self.fallback_delay = delay;
        self
    }

    pub fn build(mut self) -> StrategyRegistry {
        let fallback = self.by_kind.entry(ErrorKind::Unknown).or_default();
        if fallback.is_empty() {
            fallback.push(Arc::new(WaitAndRetry::unchecked(self.fallback_delay)));
        }
        for list in self.by_kind.values_mut() {
            list.sort_by_key(|s| s.priority());
        }
        StrategyRegistry {
            by_kind: self.by_kind,
        }
    }
}

/// One strategy execution inside a recovery pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRun {
    pub strategy: String,
    pub success: bool,
    pub action: RecoveryAction,
    pub reason: Option<String>,
    pub duration: Duration,
}

/// Result of a full recovery pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub outcome: RecoveryOutcome,
    /// Strategy that produced the final outcome
    pub strategy: Option<String>,
    pub runs: Vec<StrategyRun>,
    pub duration: Duration,
}

impl RecoveryReport {
    pub fn recovered(&self) -> bool {
        self.outcome.success
    }

    pub fn circuit_broken(&self) -> bool {
        self.outcome.is_circuit_break()
    }
}

pub struct RecoveryExecutor {
    registry: Arc<StrategyRegistry>,
    history: Arc<OutcomeHistory>,
    bus: SharedBus,
}

impl RecoveryExecutor {
    pub fn new(registry: Arc<StrategyRegistry>, history: Arc<OutcomeHistory>) -> Self {
        Self {
            registry,
            history,
            bus: NullBus::<EngineEvent>::new(),
        }
    }

    pub fn with_bus(mut self, bus: SharedBus) -> Self {
        self.bus = bus;
        self
    }

    pub fn registry(&self) -> &Arc<StrategyRegistry> {
        &self.registry
    }

    pub fn history(&self) -> &Arc<OutcomeHistory> {
        &self.history
    }

    /// Strategy names in the order the next pass would run them
    pub fn planned_order(&self, classification: &ErrorClassification, ctx: &RecoveryContext) -> Vec<String> {
        let key = ctx.signature(classification.kind);
        self.ranked(classification.kind, &key)
            .into_iter()
            .map(|(_, name)| name)
            .collect()
    }

    fn ranked(&self, kind: ErrorKind, key: &str) -> Vec<(Arc<dyn RecoveryStrategy>, String)> {
        let entries = self
            .registry
            .strategies_for(kind)
            .iter()
            .map(|s| (s.clone(), s.name().to_string(), s.priority()))
            .collect();
        self.history
            .rank(key, entries)
            .into_iter()
            .map(|entry| (entry.item, entry.name))
            .collect()
    }

    /// Run strategies until one succeeds, one breaks the circuit, or all fail
    pub async fn recover(
        &self,
        classification: &ErrorClassification,
        ctx: &RecoveryContext,
    ) -> Result<RecoveryReport> {
        let started = Instant::now();
        let kind = classification.kind;

        if !classification.recoverable {
            warn!("{} is not recoverable, escalating", kind);
            return Ok(RecoveryReport {
                outcome: RecoveryOutcome::escalate(format!("Non-recoverable error: {kind}")),
                strategy: None,
                runs: Vec::new(),
                duration: started.elapsed(),
            });
        }

        let key = ctx.signature(kind);
        let view = ctx.clone().with_history(self.history.snapshot_for(&key));
        let mut runs = Vec::new();

        for (strategy, name) in self.ranked(kind, &key) {
            if ctx.cancel.is_cancelled() {
                return Err(RecoveryError::Cancelled);
            }

            debug!("trying recovery strategy '{}' for {}", name, kind);
            let run_started = Instant::now();
            let outcome = match strategy.execute(&view).await {
                Ok(outcome) => outcome,
                Err(err) if err.is_cancelled() => return Err(RecoveryError::Cancelled),
                Err(err) => {
                    debug!("recovery strategy '{}' errored: {}", name, err);
                    RecoveryOutcome::failure(RecoveryAction::Retry, err.to_string())
                }
            };

            runs.push(StrategyRun {
                strategy: name.clone(),
                success: outcome.success,
                action: outcome.action,
                reason: outcome.reason.clone(),
                duration: run_started.elapsed(),
            });
            if !strategy.is_guard() {
                self.record(&key, &name, outcome.success);
            }

            if outcome.success || outcome.is_circuit_break() {
                if outcome.success {
                    info!("recovered from {} via '{}' ({})", kind, name, outcome.action);
                } else {
                    warn!("recovery for {} stopped by '{}': circuit open", kind, name);
                }
                return Ok(RecoveryReport {
                    outcome,
                    strategy: Some(name),
                    runs,
                    duration: started.elapsed(),
                });
            }
        }

        warn!("{} for {} ({} strategies tried)", EXHAUSTED_REASON, kind, runs.len());
        Ok(RecoveryReport {
            outcome: RecoveryOutcome::escalate(EXHAUSTED_REASON),
            strategy: None,
            runs,
            duration: started.elapsed(),
        })
    }

    fn record(&self, key: &str, strategy: &str, success: bool) {
        let stats = self.history.record(key, strategy, success);
        self.bus.publish(EngineEvent::StrategyStatsUpdated {
            key: key.to_string(),
            strategy: strategy.to_string(),
            attempts: stats.attempts,
            success_rate: stats.success_rate(),
            at: Utc::now(),
        });
    }
}
