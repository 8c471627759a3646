//! Built-in recovery strategies
//!
//! Every strategy reads an immutable [`RecoveryContext`] and reports what it did as a
//! [`RecoveryOutcome`]. Changes the caller should carry into the next attempt travel as an
//! explicit [`ContextMutation`]; strategies never write to shared state themselves.

use std::sync::Arc;
use std::time::Duration;

use action_locator::{ElementLocator, LocatorError};
use adaptive_timing::{wait_for_stability, StabilitySettings, TimingError};
use async_trait::async_trait;
use resilience_core_types::{bounded, BrowserDriver};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backoff::RetryPolicy;
use crate::circuit::CircuitBreaker;
use crate::errors::{RecoveryError, Result};
use crate::types::{ContextMutation, RecoveryAction, RecoveryContext, RecoveryOutcome};

/// One way of recovering from a classified failure
#[async_trait]
pub trait RecoveryStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Static priority; lower runs first
    fn priority(&self) -> u32;

    /// Guards check a precondition; their outcomes are neither recorded nor re-ranked
    fn is_guard(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &RecoveryContext) -> Result<RecoveryOutcome>;
}

async fn pause(delay: Duration, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(RecoveryError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

/// What a [`WaitAndRetry`] checks once the delay has passed
enum Recheck {
    Selector(Arc<dyn ElementLocator>),
    Page {
        driver: Arc<dyn BrowserDriver>,
        call_timeout: Duration,
    },
    Nothing,
}

/// Wait a fixed delay, then confirm the failure condition has cleared
pub struct WaitAndRetry {
    name: &'static str,
    priority: u32,
    delay: Duration,
    recheck: Recheck,
}

impl WaitAndRetry {
    /// Element variant: re-resolves the current selector after waiting
    pub fn rechecking(delay: Duration, locator: Arc<dyn ElementLocator>) -> Self {
        Self {
            name: "wait-and-retry",
            priority: 1,
            delay,
            recheck: Recheck::Selector(locator),
        }
    }

    /// Fallback variant for unclassified failures: reads the page state after waiting
    pub fn generic(delay: Duration, driver: Arc<dyn BrowserDriver>, call_timeout: Duration) -> Self {
        Self {
            name: "generic-wait-and-retry",
            priority: 1,
            delay,
            recheck: Recheck::Page {
                driver,
                call_timeout,
            },
        }
    }

    /// Waits without anything to confirm against, so it never reports recovery
    pub fn unchecked(delay: Duration) -> Self {
        Self {
            name: "generic-wait-and-retry",
            priority: 1,
            delay,
            recheck: Recheck::Nothing,
        }
    }
}

#[async_trait]
impl RecoveryStrategy for WaitAndRetry {
    fn name(&self) -> &str {
        self.name
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    async fn execute(&self, ctx: &RecoveryContext) -> Result<RecoveryOutcome> {
        pause(self.delay, &ctx.cancel).await?;
        let waited_ms = self.delay.as_millis() as u64;

        match &self.recheck {
            Recheck::Selector(locator) => {
                let Some(selector) = ctx.selector() else {
                    return Ok(RecoveryOutcome::failure(
                        RecoveryAction::Retry,
                        "no selector to re-check",
                    ));
                };
                match locator.find_interactable(selector).await? {
                    Some(handle) => {
                        debug!("selector '{}' resolved after waiting", selector);
                        Ok(RecoveryOutcome::success(RecoveryAction::Retry).with_data(json!({
                            "selector": selector,
                            "handle": handle.0,
                            "waited_ms": waited_ms,
                        })))
                    }
                    None => Ok(RecoveryOutcome::failure(
                        RecoveryAction::Retry,
                        format!("selector '{selector}' still unresolved"),
                    )),
                }
            }
            Recheck::Page {
                driver,
                call_timeout,
            } => match bounded("page_state", *call_timeout, driver.page_state()).await {
                Ok(page) if page.ready_state != "loading" => {
                    Ok(RecoveryOutcome::success(RecoveryAction::Retry).with_data(json!({
                        "waited_ms": waited_ms,
                        "ready_state": page.ready_state,
                    })))
                }
                Ok(page) => Ok(RecoveryOutcome::failure(
                    RecoveryAction::Retry,
                    format!("page still {} after {waited_ms}ms", page.ready_state),
                )),
                Err(err) => Ok(RecoveryOutcome::failure(
                    RecoveryAction::Retry,
                    format!("page unresponsive after waiting: {err}"),
                )),
            },
            Recheck::Nothing => Ok(RecoveryOutcome::failure(
                RecoveryAction::Retry,
                format!("waited {waited_ms}ms with nothing to re-check"),
            )
            .with_data(json!({ "waited_ms": waited_ms }))),
        }
    }
}

/// Switch to the next alternative selector not tried yet
#[derive(Default)]
pub struct AlternativeSelector;

#[async_trait]
impl RecoveryStrategy for AlternativeSelector {
    fn name(&self) -> &str {
        "alternative-selector"
    }

    fn priority(&self) -> u32 {
        2
    }

    async fn execute(&self, ctx: &RecoveryContext) -> Result<RecoveryOutcome> {
        let mut used = ctx.used_selectors();
        let Some(next) = ctx.alternatives().into_iter().find(|alt| !used.contains(alt)) else {
            return Ok(RecoveryOutcome::failure(
                RecoveryAction::UseAlternative,
                "no unused alternative selectors",
            ));
        };

        info!("switching selector to alternative '{}'", next);
        used.push(next.clone());
        Ok(RecoveryOutcome::success(RecoveryAction::UseAlternative)
            .with_data(json!({ "selector": next }))
            .with_mutation(
                ContextMutation::new()
                    .set("selector", json!(next))
                    .set("used_selectors", json!(used)),
            ))
    }
}

/// Hand the element over to the full self-healing locator chain
pub struct VisualMatching {
    locator: Arc<dyn ElementLocator>,
}

impl VisualMatching {
    pub fn new(locator: Arc<dyn ElementLocator>) -> Self {
        Self { locator }
    }
}

#[async_trait]
impl RecoveryStrategy for VisualMatching {
    fn name(&self) -> &str {
        "visual-matching"
    }

    fn priority(&self) -> u32 {
        3
    }

    async fn execute(&self, ctx: &RecoveryContext) -> Result<RecoveryOutcome> {
        let Some(descriptor) = ctx.descriptor_or_selector() else {
            return Ok(RecoveryOutcome::failure(
                RecoveryAction::VisualMatch,
                "no selector to match against",
            ));
        };

        match self.locator.locate_with_cancel(&descriptor, &ctx.cancel).await {
            Ok(found) => {
                let selector = found
                    .matched_selector
                    .clone()
                    .unwrap_or_else(|| descriptor.primary.clone());
                let mut mutation =
                    ContextMutation::new().set("element_handle", json!(found.handle.0.clone()));
                if let Some(matched) = &found.matched_selector {
                    mutation = mutation.set("selector", json!(matched));
                }
                Ok(RecoveryOutcome::success(RecoveryAction::VisualMatch)
                    .with_data(json!({
                        "selector": selector,
                        "handle": found.handle.0,
                        "strategy": found.strategy.name(),
                        "confidence": found.confidence,
                    }))
                    .with_mutation(mutation))
            }
            Err(LocatorError::Cancelled) => Err(RecoveryError::Cancelled),
            Err(err @ LocatorError::ElementNotFound { .. }) => Ok(RecoveryOutcome::failure(
                RecoveryAction::VisualMatch,
                err.to_string(),
            )),
            Err(err) => Err(err.into()),
        }
    }
}

/// Stretch the operation timeout by a fixed factor up to a ceiling
pub struct IncreaseTimeout {
    multiplier: f64,
    default_timeout: Duration,
    max_timeout: Duration,
}

impl IncreaseTimeout {
    pub fn new(multiplier: f64, default_timeout: Duration, max_timeout: Duration) -> Self {
        Self {
            multiplier: multiplier.max(1.0),
            default_timeout,
            max_timeout,
        }
    }
}

#[async_trait]
impl RecoveryStrategy for IncreaseTimeout {
    fn name(&self) -> &str {
        "increase-timeout"
    }

    fn priority(&self) -> u32 {
        1
    }

    async fn execute(&self, ctx: &RecoveryContext) -> Result<RecoveryOutcome> {
        let max_ms = self.max_timeout.as_millis() as u64;
        let current = ctx
            .timeout_ms()
            .unwrap_or(self.default_timeout.as_millis() as u64);
        if current >= max_ms {
            return Ok(RecoveryOutcome::failure(
                RecoveryAction::IncreaseTimeout,
                format!("timeout already at ceiling ({max_ms}ms)"),
            ));
        }

        let next = ((current as f64 * self.multiplier).round() as u64).min(max_ms);
        debug!("raising timeout {}ms -> {}ms", current, next);
        Ok(RecoveryOutcome::success(RecoveryAction::IncreaseTimeout)
            .with_data(json!({ "timeout": next, "previous": current }))
            .with_mutation(ContextMutation::new().set("timeout", json!(next))))
    }
}

/// Wait until the DOM mutation rate settles
pub struct WaitForStability {
    driver: Arc<dyn BrowserDriver>,
    settings: StabilitySettings,
}

impl WaitForStability {
    pub fn new(driver: Arc<dyn BrowserDriver>, settings: StabilitySettings) -> Self {
        Self { driver, settings }
    }
}

#[async_trait]
impl RecoveryStrategy for WaitForStability {
    fn name(&self) -> &str {
        "wait-for-stability"
    }

    fn priority(&self) -> u32 {
        2
    }

    async fn execute(&self, ctx: &RecoveryContext) -> Result<RecoveryOutcome> {
        match wait_for_stability(&self.driver, &self.settings, &ctx.cancel).await {
            Ok(report) => Ok(RecoveryOutcome::success(RecoveryAction::Retry).with_data(json!({
                "waited_ms": report.waited.as_millis() as u64,
                "polls": report.polls,
                "mutation_rate": report.last_rate,
            }))),
            Err(TimingError::Cancelled) => Err(RecoveryError::Cancelled),
            Err(err @ TimingError::StabilityTimeout { .. }) => Ok(RecoveryOutcome::failure(
                RecoveryAction::Retry,
                err.to_string(),
            )),
            Err(err) => Err(err.into()),
        }
    }
}

/// Stop the scan when the (url, action) circuit is open
pub struct CircuitBreakerCheck {
    breaker: Arc<CircuitBreaker>,
}

impl CircuitBreakerCheck {
    pub fn new(breaker: Arc<CircuitBreaker>) -> Self {
        Self { breaker }
    }
}

#[async_trait]
impl RecoveryStrategy for CircuitBreakerCheck {
    fn name(&self) -> &str {
        "circuit-breaker"
    }

    fn priority(&self) -> u32 {
        1
    }

    fn is_guard(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: &RecoveryContext) -> Result<RecoveryOutcome> {
        let Some((target, action)) = ctx.circuit_key() else {
            return Ok(RecoveryOutcome::failure(
                RecoveryAction::Retry,
                "no url in context; circuit not tracked",
            ));
        };

        if self.breaker.is_open(target, action) {
            let state = self.breaker.state_at(target, action, chrono::Utc::now());
            return Ok(RecoveryOutcome::failure(
                RecoveryAction::CircuitBreak,
                format!("circuit open for {target} / {action}"),
            )
            .with_data(json!({
                "target": target,
                "action": action,
                "recent_failures": state.recent_failures,
            })));
        }

        Ok(RecoveryOutcome::failure(
            RecoveryAction::Retry,
            "circuit not tripped",
        ))
    }
}

/// Sleep for the retry-policy delay of the failed attempt
///
/// The operation's own policy on the context wins over the one given at construction.
pub struct ExponentialBackoff {
    policy: RetryPolicy,
}

impl ExponentialBackoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl RecoveryStrategy for ExponentialBackoff {
    fn name(&self) -> &str {
        "exponential-backoff"
    }

    fn priority(&self) -> u32 {
        2
    }

    async fn execute(&self, ctx: &RecoveryContext) -> Result<RecoveryOutcome> {
        let policy = ctx.policy.as_ref().unwrap_or(&self.policy);
        let delay = policy.delay(ctx.attempt);
        debug!("backing off {}ms after attempt {}", delay.as_millis(), ctx.attempt);
        pause(delay, &ctx.cancel).await?;
        Ok(RecoveryOutcome::success(RecoveryAction::Retry)
            .with_data(json!({ "delay_ms": delay.as_millis() as u64 })))
    }
}

/// Reload the current page
pub struct RefreshPage {
    driver: Arc<dyn BrowserDriver>,
    call_timeout: Duration,
}

impl RefreshPage {
    pub fn new(driver: Arc<dyn BrowserDriver>, call_timeout: Duration) -> Self {
        Self {
            driver,
            call_timeout,
        }
    }
}

#[async_trait]
impl RecoveryStrategy for RefreshPage {
    fn name(&self) -> &str {
        "refresh-page"
    }

    fn priority(&self) -> u32 {
        1
    }

    async fn execute(&self, ctx: &RecoveryContext) -> Result<RecoveryOutcome> {
        if ctx.cancel.is_cancelled() {
            return Err(RecoveryError::Cancelled);
        }
        bounded("reload", self.call_timeout, self.driver.reload()).await?;
        info!("page reloaded");
        Ok(RecoveryOutcome::success(RecoveryAction::RefreshPage))
    }
}

/// Signals that only a browser restart can help; the driver owner acts on it
#[derive(Default)]
pub struct RestartBrowser;

#[async_trait]
impl RecoveryStrategy for RestartBrowser {
    fn name(&self) -> &str {
        "restart-browser"
    }

    fn priority(&self) -> u32 {
        2
    }

    async fn execute(&self, _ctx: &RecoveryContext) -> Result<RecoveryOutcome> {
        Ok(RecoveryOutcome::failure(
            RecoveryAction::RestartBrowser,
            "browser restart required",
        ))
    }
}

/// Coerce `data` into `expected_type` (number, string, boolean, array, object)
#[derive(Default)]
pub struct DataTransformation;

#[async_trait]
impl RecoveryStrategy for DataTransformation {
    fn name(&self) -> &str {
        "data-transformation"
    }

    fn priority(&self) -> u32 {
        1
    }

    async fn execute(&self, ctx: &RecoveryContext) -> Result<RecoveryOutcome> {
        let (Some(data), Some(expected)) = (ctx.values.get("data"), ctx.str_field("expected_type"))
        else {
            return Ok(RecoveryOutcome::failure(
                RecoveryAction::TransformData,
                "context carries no data/expected_type pair",
            ));
        };

        match coerce(data, expected) {
            Some(value) => Ok(RecoveryOutcome::success(RecoveryAction::TransformData)
                .with_data(value.clone())
                .with_mutation(ContextMutation::new().set("data", value))),
            None => Ok(RecoveryOutcome::failure(
                RecoveryAction::TransformData,
                format!("cannot coerce value into {expected}"),
            )),
        }
    }
}

/// Converted value, or `None` when no conversion applies
pub fn coerce(value: &Value, expected: &str) -> Option<Value> {
    match (expected.trim().to_ascii_lowercase().as_str(), value) {
        ("number", Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .map(Value::from)
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(|f| serde_json::Number::from_f64(f).map(Value::Number)))
        }
        ("number", Value::Bool(b)) => Some(Value::from(u8::from(*b))),
        ("string", Value::Number(n)) => Some(Value::String(n.to_string())),
        ("string", Value::Bool(b)) => Some(Value::String(b.to_string())),
        ("string", v @ (Value::Array(_) | Value::Object(_))) => {
            serde_json::to_string(v).ok().map(Value::String)
        }
        ("boolean", Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Some(Value::Bool(true)),
            "false" | "no" | "0" | "off" => Some(Value::Bool(false)),
            _ => None,
        },
        ("boolean", Value::Number(n)) => match n.as_f64() {
            Some(f) if f == 0.0 => Some(Value::Bool(false)),
            Some(f) if f == 1.0 => Some(Value::Bool(true)),
            _ => None,
        },
        ("array", Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(parsed @ Value::Array(_)) => Some(parsed),
            _ => Some(Value::Array(vec![value.clone()])),
        },
        ("array", Value::Array(_)) | ("object", Value::Object(_)) => None,
        ("array", Value::Null) => Some(Value::Array(Vec::new())),
        ("array", scalar) => Some(Value::Array(vec![scalar.clone()])),
        ("object", Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(parsed @ Value::Object(_)) => Some(parsed),
            _ => None,
        },
        _ => None,
    }
}

/// Substitute the caller-supplied `fallback_data`
#[derive(Default)]
pub struct FallbackData;

#[async_trait]
impl RecoveryStrategy for FallbackData {
    fn name(&self) -> &str {
        "fallback-data"
    }

    fn priority(&self) -> u32 {
        2
    }

    async fn execute(&self, ctx: &RecoveryContext) -> Result<RecoveryOutcome> {
        match ctx.values.get("fallback_data").filter(|v| !v.is_null()) {
            Some(fallback) => Ok(RecoveryOutcome::success(RecoveryAction::TransformData)
                .with_data(fallback.clone())
                .with_mutation(ContextMutation::new().set("data", fallback.clone()))),
            None => Ok(RecoveryOutcome::failure(
                RecoveryAction::TransformData,
                "no fallback_data supplied",
            )),
        }
    }
}
