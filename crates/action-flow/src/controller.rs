//! Retry controller
//!
//! Runs an operation up to `max_attempts` times. Between attempts the failure is classified and
//! handed to recovery; a successful recovery applies its context mutation and retries at once,
//! anything else waits out the backoff delay. Network failures feed the circuit breaker, and an
//! open circuit ends the loop.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use resilience_event_bus::{EngineEvent, NullBus, SharedBus};
use resilience_recovery::{
    CircuitBreaker, ErrorHandler, ErrorKind, Failure, RecoveryContext, RetryPolicy,
};
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, info, warn};

use crate::errors::FlowError;
use crate::observer::RetryObserver;
use crate::types::{
    AttemptContext, AttemptRecord, FailureReport, OperationContext, OperationStats, RetryNotice,
};

/// Operations tracked in the stats map before the least recently run one is dropped
pub const DEFAULT_STATS_CAPACITY: usize = 1_024;

pub struct RetryController {
    handler: Arc<ErrorHandler>,
    breaker: Arc<CircuitBreaker>,
    policy: RetryPolicy,
    observers: RwLock<Vec<Arc<dyn RetryObserver>>>,
    stats: DashMap<String, OperationStats>,
    stats_capacity: usize,
    bus: SharedBus,
}

impl RetryController {
    pub fn new(handler: Arc<ErrorHandler>, breaker: Arc<CircuitBreaker>, policy: RetryPolicy) -> Self {
        Self {
            handler,
            breaker,
            policy,
            observers: RwLock::new(Vec::new()),
            stats: DashMap::new(),
            stats_capacity: DEFAULT_STATS_CAPACITY,
            bus: NullBus::<EngineEvent>::new(),
        }
    }

    pub fn with_bus(mut self, bus: SharedBus) -> Self {
        self.bus = bus;
        self
    }

    pub fn with_stats_capacity(mut self, capacity: usize) -> Self {
        self.stats_capacity = capacity.max(1);
        self
    }

    pub fn add_observer(&self, observer: Arc<dyn RetryObserver>) {
        self.observers.write().push(observer);
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn handler(&self) -> &Arc<ErrorHandler> {
        &self.handler
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn stats(&self, operation: &str) -> Option<OperationStats> {
        self.stats.get(operation).map(|entry| entry.clone())
    }

    /// Drop stats of operations not run since `cutoff`; returns how many went
    pub fn prune_stats(&self, cutoff: DateTime<Utc>) -> usize {
        let before = self.stats.len();
        self.stats
            .retain(|_, stats| stats.last_run.is_some_and(|at| at >= cutoff));
        before.saturating_sub(self.stats.len())
    }

    pub fn all_stats(&self) -> BTreeMap<String, OperationStats> {
        self.stats
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Run `attempt_fn` until it succeeds, recovery gives up, or attempts run out
    ///
    /// Each call receives an [`AttemptContext`] carrying the context as mutated by earlier
    /// recoveries (an alternative selector, a raised timeout).
    pub async fn retry_with_backoff<T, E, F, Fut>(
        &self,
        operation: OperationContext,
        mut attempt_fn: F,
    ) -> Result<T, FlowError<E>>
    where
        F: FnMut(AttemptContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + 'static,
    {
        let policy = operation.policy.clone().unwrap_or_else(|| self.policy.clone());
        let max_attempts = policy.max_attempts.max(1);
        let OperationContext {
            name,
            mut values,
            descriptor,
            cancel,
            ..
        } = operation;

        self.update_stats(&name, |stats| stats.calls += 1);
        let mut report = FailureReport::default();
        let mut last_error: Option<E> = None;
        let mut attempt = 0;

        loop {
            attempt += 1;
            report.attempts = attempt;
            let started = Instant::now();
            let attempt_ctx = AttemptContext {
                attempt,
                values: values.clone(),
                cancel: cancel.clone(),
            };

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.update_stats(&name, |stats| stats.failures += 1);
                    return Err(FlowError::Cancelled {
                        operation: name,
                        last_error: last_error.take(),
                        report,
                    });
                }
                result = attempt_fn(attempt_ctx) => result,
            };

            let error = match result {
                Ok(value) => {
                    report
                        .trace
                        .push(AttemptRecord::succeeded(attempt, started.elapsed()));
                    self.update_stats(&name, |stats| stats.successes += 1);
                    if attempt > 1 {
                        info!("Operation '{}' succeeded on attempt {}", name, attempt);
                    } else {
                        debug!("Operation '{}' succeeded", name);
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            let failure = Failure::from_error(&error);
            let mut record = AttemptRecord::failed(attempt, failure.message.clone(), started.elapsed());
            let classification = self.handler.classifier().classify(&failure, &values);
            record.kind = Some(classification.kind);
            report.classification = Some(classification.clone());

            let mut recovery_ctx = RecoveryContext::new(values.clone())
                .with_attempt(attempt)
                .with_cancel(cancel.clone())
                .with_policy(policy.clone());
            if let Some(descriptor) = &descriptor {
                recovery_ctx = recovery_ctx.with_descriptor(descriptor.clone());
            }

            if classification.kind == ErrorKind::NetworkError {
                if let Some((target, action)) = recovery_ctx.circuit_key() {
                    self.breaker.record_failure(target, action);
                }
            }

            if !classification.recoverable {
                report.trace.push(record);
                self.handler.report(&failure, &classification, &values, None);
                self.update_stats(&name, |stats| stats.failures += 1);
                warn!(
                    "Operation '{}' failed with non-recoverable {} error: {}",
                    name, classification.kind, failure.message
                );
                return Err(FlowError::NonRecoverable {
                    operation: name,
                    kind: classification.kind,
                    last_error: error,
                    report,
                });
            }

            if !policy.allows_retry_after(attempt) || attempt >= max_attempts {
                report.trace.push(record);
                self.handler.report(&failure, &classification, &values, None);
                self.update_stats(&name, |stats| stats.failures += 1);
                warn!(
                    "Operation '{}' failed after {} attempts: {}",
                    name, attempt, failure.message
                );
                return Err(FlowError::Exhausted {
                    operation: name,
                    last_error: error,
                    report,
                });
            }

            let kind = classification.kind;
            report.recovery_attempts += 1;
            let handled = match self
                .handler
                .handle_classified(&failure, classification, &recovery_ctx)
                .await
            {
                Ok(handled) => Some(handled),
                Err(err) if err.is_cancelled() => {
                    report.trace.push(record);
                    self.update_stats(&name, |stats| stats.failures += 1);
                    return Err(FlowError::Cancelled {
                        operation: name,
                        last_error: Some(error),
                        report,
                    });
                }
                Err(err) => {
                    warn!("Recovery for '{}' failed: {}", name, err);
                    None
                }
            };

            let mut recovered = false;
            if let Some(handled) = &handled {
                recovered = handled.recovered();
                record.recovery_strategy = handled.recovery.strategy.clone();
                record.recovery_action = Some(handled.recovery.outcome.action);
                record.recovered = recovered;

                if handled.recovery.circuit_broken() {
                    report.circuit_breaker_engaged = true;
                    report.trace.push(record);
                    self.update_stats(&name, |stats| {
                        stats.failures += 1;
                        stats.circuit_breaks += 1;
                    });
                    let target = recovery_ctx.url().unwrap_or("-").to_string();
                    warn!("Operation '{}' stopped: circuit open for {}", name, target);
                    return Err(FlowError::CircuitOpen {
                        operation: name,
                        target,
                        last_error: error,
                        report,
                    });
                }

                if recovered {
                    if let Some(mutation) = &handled.recovery.outcome.mutation {
                        mutation.apply(&mut values);
                    }
                }
            }

            let delay = if recovered {
                Duration::ZERO
            } else {
                policy.delay(attempt)
            };
            record.delay = delay;
            report.trace.push(record);

            self.update_stats(&name, |stats| {
                stats.retries += 1;
                if recovered {
                    stats.recoveries += 1;
                }
            });
            let notice = RetryNotice {
                operation: name.clone(),
                attempt,
                max_attempts,
                delay,
                recovered,
                error: failure.message.clone(),
                kind,
            };
            self.notify(&notice);
            self.bus.publish(EngineEvent::RetryAttempt {
                operation: name.clone(),
                attempt,
                max_attempts,
                delay_ms: delay.as_millis() as u64,
                recovered,
                error: failure.message,
                at: Utc::now(),
            });

            if !delay.is_zero() {
                debug!("Backing off '{}' for {}ms", name, delay.as_millis());
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        self.update_stats(&name, |stats| stats.failures += 1);
                        return Err(FlowError::Cancelled {
                            operation: name,
                            last_error: Some(error),
                            report,
                        });
                    }
                    _ = sleep(delay) => {}
                }
            }

            last_error = Some(error);
        }
    }

    fn notify(&self, notice: &RetryNotice) {
        for observer in self.observers.read().iter() {
            observer.on_retry(notice);
        }
    }

    fn update_stats(&self, operation: &str, update: impl FnOnce(&mut OperationStats)) {
        if !self.stats.contains_key(operation) && self.stats.len() >= self.stats_capacity {
            let stalest = self
                .stats
                .iter()
                .min_by_key(|entry| entry.value().last_run)
                .map(|entry| entry.key().clone());
            if let Some(key) = stalest {
                debug!("Dropping stats for '{}'", key);
                self.stats.remove(&key);
            }
        }
        let mut stats = self.stats.entry(operation.to_string()).or_default();
        stats.last_run = Some(Utc::now());
        update(&mut stats);
    }
}
