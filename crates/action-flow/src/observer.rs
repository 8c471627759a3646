//! Retry observers

use tracing::info;

use crate::types::RetryNotice;

/// Notified synchronously once per scheduled retry
pub trait RetryObserver: Send + Sync {
    fn on_retry(&self, notice: &RetryNotice);
}

impl<F> RetryObserver for F
where
    F: Fn(&RetryNotice) + Send + Sync,
{
    fn on_retry(&self, notice: &RetryNotice) {
        self(notice)
    }
}

/// Logs every retry at info level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl RetryObserver for TracingObserver {
    fn on_retry(&self, notice: &RetryNotice) {
        info!(
            "Retrying '{}' (attempt {}/{}) after {}ms: {} [{}{}]",
            notice.operation,
            notice.attempt + 1,
            notice.max_attempts,
            notice.delay.as_millis(),
            notice.error,
            notice.kind,
            if notice.recovered { ", recovered" } else { "" }
        );
    }
}
