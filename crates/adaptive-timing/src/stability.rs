//! DOM stability wait.
//!
//! The page counts as stable once its mutation rate stays below the threshold for a full settle
//! window. Any reading at or above the threshold restarts the window.

use std::sync::Arc;
use std::time::Duration;

use resilience_core_types::{bounded, BrowserDriver};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::TimingError;

#[derive(Clone, Debug)]
pub struct StabilitySettings {
    /// Mutations per second below which a reading counts as quiet.
    pub threshold: f64,
    pub settle: Duration,
    pub timeout: Duration,
    pub poll: Duration,
}

impl Default for StabilitySettings {
    fn default() -> Self {
        Self {
            threshold: 5.0,
            settle: Duration::from_millis(500),
            timeout: Duration::from_millis(10_000),
            poll: Duration::from_millis(100),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StabilityReport {
    pub waited: Duration,
    pub polls: usize,
    pub last_rate: f64,
}

pub async fn wait_for_stability(
    driver: &Arc<dyn BrowserDriver>,
    settings: &StabilitySettings,
    cancel: &CancellationToken,
) -> Result<StabilityReport, TimingError> {
    let started = Instant::now();
    let mut quiet_since: Option<Instant> = None;
    let mut polls = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(TimingError::Cancelled);
        }

        let page = bounded("page_state", settings.poll.max(settings.settle), driver.page_state()).await?;
        polls += 1;
        let now = Instant::now();

        if page.mutation_rate < settings.threshold {
            let since = *quiet_since.get_or_insert(now);
            if now.duration_since(since) >= settings.settle {
                debug!(
                    "page settled after {}ms ({} polls)",
                    started.elapsed().as_millis(),
                    polls
                );
                return Ok(StabilityReport {
                    waited: started.elapsed(),
                    polls,
                    last_rate: page.mutation_rate,
                });
            }
        } else {
            quiet_since = None;
        }

        if started.elapsed() >= settings.timeout {
            return Err(TimingError::StabilityTimeout {
                after: settings.timeout,
                last_rate: page.mutation_rate,
            });
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(TimingError::Cancelled),
            _ = tokio::time::sleep(settings.poll) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resilience_core_types::fake::FakeDriver;

    fn settings() -> StabilitySettings {
        StabilitySettings {
            threshold: 5.0,
            settle: Duration::from_millis(300),
            timeout: Duration::from_secs(2),
            poll: Duration::from_millis(100),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn settles_after_quiet_window() {
        let fake = Arc::new(FakeDriver::new().with_mutation_rates([40.0, 12.0, 1.0]));
        let driver: Arc<dyn BrowserDriver> = fake.clone();
        let report = wait_for_stability(&driver, &settings(), &CancellationToken::new())
            .await
            .unwrap();
        // two busy polls, then quiet at t=200ms held until t=500ms
        assert_eq!(report.polls, 6);
        assert_eq!(report.waited, Duration::from_millis(500));
        assert_eq!(fake.page_state_reads(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_on_busy_page() {
        let driver: Arc<dyn BrowserDriver> =
            Arc::new(FakeDriver::new().with_mutation_rates([50.0]));
        let err = wait_for_stability(&driver, &settings(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TimingError::StabilityTimeout { last_rate, .. } if last_rate == 50.0));
    }

    #[tokio::test(start_paused = true)]
    async fn honours_cancellation() {
        let driver: Arc<dyn BrowserDriver> =
            Arc::new(FakeDriver::new().with_mutation_rates([50.0]));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            trigger.cancel();
        });
        let err = wait_for_stability(&driver, &settings(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, TimingError::Cancelled));
    }
}
