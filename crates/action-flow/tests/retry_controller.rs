use std::sync::Arc;
use std::time::Duration;

use action_flow::*;
use action_locator::{ElementLocator, LocatedElement, LocatorError, SelectorDescriptor};
use async_trait::async_trait;
use parking_lot::Mutex;
use resilience_core_types::fake::FakeDriver;
use resilience_core_types::{ElementHandle, OutcomeHistory};
use resilience_event_bus::{EngineEvent, EventBus, InMemoryBus};
use resilience_recovery::{
    BuiltinDeps, CircuitBreaker, DiagnosticsSettings, ErrorClassifier, ErrorHandler, ErrorKind,
    RecoveryAction, RecoveryExecutor, RecoverySettings, RetryPolicy, StrategyRegistry,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
#[error("{0}")]
struct TestError(String);

fn fail<T>(message: &str) -> Result<T, TestError> {
    Err(TestError(message.to_string()))
}

struct AlwaysFail;

#[async_trait]
impl ElementLocator for AlwaysFail {
    async fn locate_with_cancel(
        &self,
        descriptor: &SelectorDescriptor,
        _cancel: &CancellationToken,
    ) -> Result<LocatedElement, LocatorError> {
        Err(LocatorError::ElementNotFound {
            selector: descriptor.primary.clone(),
            attempts: Vec::new(),
        })
    }

    async fn find_interactable(
        &self,
        _selector: &str,
    ) -> Result<Option<ElementHandle>, LocatorError> {
        Ok(None)
    }
}

struct Harness {
    controller: RetryController,
    breaker: Arc<CircuitBreaker>,
    handler: Arc<ErrorHandler>,
    bus: Arc<InMemoryBus<EngineEvent>>,
    notices: Arc<Mutex<Vec<RetryNotice>>>,
}

fn harness(policy: RetryPolicy) -> Harness {
    let fake = Arc::new(FakeDriver::new());
    let breaker = Arc::new(CircuitBreaker::default());
    let registry = StrategyRegistry::builtin(BuiltinDeps {
        driver: fake,
        locator: Arc::new(AlwaysFail),
        breaker: breaker.clone(),
        policy: policy.clone(),
        settings: RecoverySettings {
            wait_delay: Duration::from_millis(200),
            ..Default::default()
        },
    });
    let bus = InMemoryBus::<EngineEvent>::new(64);
    let executor = RecoveryExecutor::new(Arc::new(registry), Arc::new(OutcomeHistory::new()));
    let handler = Arc::new(ErrorHandler::new(
        Arc::new(ErrorClassifier::default()),
        Arc::new(executor),
        DiagnosticsSettings::default(),
    ));
    let controller =
        RetryController::new(handler.clone(), breaker.clone(), policy).with_bus(bus.clone());

    let notices = Arc::new(Mutex::new(Vec::new()));
    let seen = notices.clone();
    controller.add_observer(Arc::new(move |notice: &RetryNotice| {
        seen.lock().push(notice.clone())
    }));

    Harness {
        controller,
        breaker,
        handler,
        bus,
        notices,
    }
}

fn fixed_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::from_millis(100), Duration::from_secs(1)).with_jitter(0.0)
}

#[tokio::test(start_paused = true)]
async fn recovered_failures_retry_without_backoff() {
    let h = harness(fixed_policy(5));
    let mut calls = 0;

    let value = h
        .controller
        .retry_with_backoff(OperationContext::new("poll"), |_ctx| {
            calls += 1;
            let n = calls;
            async move {
                if n < 3 {
                    fail("flaky glitch")
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();

    assert_eq!(value, 3);
    assert_eq!(calls, 3);
    let notices = h.notices.lock();
    assert_eq!(notices.len(), 2);
    assert!(notices.iter().all(|n| n.recovered && n.delay.is_zero()));
    assert_eq!(notices[0].kind, ErrorKind::Unknown);
    assert_eq!(notices[1].attempt, 2);

    let stats = h.controller.stats("poll").unwrap();
    assert_eq!(stats.calls, 1);
    assert_eq!(stats.successes, 1);
    assert_eq!(stats.retries, 2);
    assert_eq!(stats.recoveries, 2);
}

#[tokio::test(start_paused = true)]
async fn exhausted_operation_reports_last_error_and_trace() {
    let h = harness(fixed_policy(3));
    let mut rx = h.bus.subscribe();
    let mut calls = 0;
    let started = tokio::time::Instant::now();

    let err = h
        .controller
        .retry_with_backoff(OperationContext::new("parse"), |_ctx| {
            calls += 1;
            let n = calls;
            async move { fail::<()>(&format!("Unexpected token < in JSON #{n}")) }
        })
        .await
        .unwrap_err();

    assert_eq!(calls, 3);
    assert!(matches!(err, FlowError::Exhausted { .. }));
    assert_eq!(err.last_error().unwrap().0, "Unexpected token < in JSON #3");

    let report = err.report();
    assert_eq!(report.attempts, 3);
    assert_eq!(report.recovery_attempts, 2);
    assert!(!report.circuit_breaker_engaged);
    assert_eq!(report.trace.len(), 3);
    assert_eq!(
        report.classification.as_ref().map(|c| c.kind),
        Some(ErrorKind::DataError)
    );

    let delays = h
        .notices
        .lock()
        .iter()
        .map(|n| n.delay)
        .collect::<Vec<_>>();
    assert_eq!(delays, vec![Duration::from_millis(100), Duration::from_millis(200)]);
    assert!(started.elapsed() >= Duration::from_millis(300));

    let mut retry_events = 0;
    while let Ok(event) = rx.try_recv() {
        if let EngineEvent::RetryAttempt { recovered, .. } = event {
            assert!(!recovered);
            retry_events += 1;
        }
    }
    assert_eq!(retry_events, 2);
}

#[tokio::test(start_paused = true)]
async fn network_failures_open_the_circuit() {
    let h = harness(fixed_policy(5));
    for _ in 0..4 {
        h.breaker.record_failure("https://api.test/orders", "fetch");
    }
    let op = OperationContext::new("load-orders")
        .with_target("https://api.test/orders")
        .with_action("fetch");
    let mut calls = 0;

    let err = h
        .controller
        .retry_with_backoff(op, |_ctx| {
            calls += 1;
            async { fail::<()>("net::ERR_CONNECTION_RESET") }
        })
        .await
        .unwrap_err();

    assert_eq!(calls, 1);
    assert!(err.circuit_breaker_engaged());
    match &err {
        FlowError::CircuitOpen { target, .. } => assert_eq!(target, "https://api.test/orders"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        err.report().trace[0].recovery_action,
        Some(RecoveryAction::CircuitBreak)
    );
    assert_eq!(h.controller.stats("load-orders").unwrap().circuit_breaks, 1);
}

#[tokio::test]
async fn open_circuit_never_blocks_a_first_attempt() {
    let h = harness(fixed_policy(5));
    for _ in 0..5 {
        h.breaker.record_failure("https://api.test/orders", "fetch");
    }
    let op = OperationContext::new("load-orders")
        .with_target("https://api.test/orders")
        .with_action("fetch");

    let value = h
        .controller
        .retry_with_backoff(op, |_ctx| async { Ok::<_, TestError>("orders") })
        .await
        .unwrap();
    assert_eq!(value, "orders");
}

#[tokio::test(start_paused = true)]
async fn recovery_mutation_reaches_the_next_attempt() {
    let h = harness(fixed_policy(5));
    let descriptor = SelectorDescriptor::new(".submit-button").with_alternatives(["#submit"]);
    let op = OperationContext::new("click-submit").with_descriptor(descriptor);
    let mut selectors = Vec::new();

    let clicked = h
        .controller
        .retry_with_backoff(op, |ctx| {
            let selector = ctx.selector().unwrap_or_default().to_string();
            selectors.push(selector.clone());
            async move {
                if selector == "#submit" {
                    Ok(selector)
                } else {
                    fail(&format!("Element not found for selector: {selector}"))
                }
            }
        })
        .await
        .unwrap();

    assert_eq!(clicked, "#submit");
    assert_eq!(selectors, vec![".submit-button", "#submit"]);
    let notices = h.notices.lock();
    assert_eq!(notices.len(), 1);
    assert!(notices[0].recovered);
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_backoff() {
    let h = harness(
        RetryPolicy::new(5, Duration::from_secs(10), Duration::from_secs(30)).with_jitter(0.0),
    );
    let op = OperationContext::new("parse");
    let cancel = op.cancel.clone();
    h.controller
        .add_observer(Arc::new(move |_notice: &RetryNotice| cancel.cancel()));
    let mut calls = 0;

    let err = h
        .controller
        .retry_with_backoff(op, |_ctx| {
            calls += 1;
            async { fail::<()>("Unexpected token < in JSON") }
        })
        .await
        .unwrap_err();

    assert_eq!(calls, 1);
    assert!(err.is_cancelled());
    assert!(err.last_error().is_some());
    assert_eq!(err.attempts(), 1);
}

#[tokio::test]
async fn non_recoverable_failure_is_not_retried() {
    let h = harness(fixed_policy(5));
    let mut calls = 0;

    let err = h
        .controller
        .retry_with_backoff(OperationContext::new("open-admin"), |_ctx| {
            calls += 1;
            async { fail::<()>("403 Forbidden") }
        })
        .await
        .unwrap_err();

    assert_eq!(calls, 1);
    match &err {
        FlowError::NonRecoverable { kind, .. } => assert_eq!(*kind, ErrorKind::PermissionDenied),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.report().recovery_attempts, 0);
    assert_eq!(h.handler.diagnostics().len(), 1);
    assert!(h.notices.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn operation_policy_drives_network_backoff() {
    let h = harness(
        RetryPolicy::new(5, Duration::from_secs(1), Duration::from_secs(30)).with_jitter(0.0),
    );
    let op = OperationContext::new("ping").with_policy(
        RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(1)).with_jitter(0.0),
    );
    let started = tokio::time::Instant::now();
    let mut calls = 0;

    let value = h
        .controller
        .retry_with_backoff(op, |_ctx| {
            calls += 1;
            let n = calls;
            async move {
                if n == 1 {
                    fail("socket hang up")
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();

    assert_eq!(value, 2);
    assert!(started.elapsed() < Duration::from_millis(100));
    let notices = h.notices.lock();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].kind, ErrorKind::NetworkError);
    assert!(notices[0].recovered);
    assert_eq!(notices[0].max_attempts, 3);
}

#[tokio::test]
async fn stats_map_drops_least_recently_run_operation() {
    let h = harness(fixed_policy(1));
    let controller = h.controller.with_stats_capacity(2);

    for name in ["load", "save", "load", "export"] {
        controller
            .retry_with_backoff(OperationContext::new(name), |_ctx| async {
                Ok::<_, TestError>(())
            })
            .await
            .unwrap();
    }

    let tracked = controller.all_stats();
    assert_eq!(tracked.len(), 2);
    assert_eq!(tracked["load"].calls, 2);
    assert!(tracked.contains_key("export"));
    assert!(!tracked.contains_key("save"));

    let later = chrono::Utc::now() + chrono::Duration::seconds(1);
    assert_eq!(controller.prune_stats(later), 2);
    assert!(controller.all_stats().is_empty());
}
