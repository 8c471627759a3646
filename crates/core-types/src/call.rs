use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::errors::DriverError;

/// Run one driver call under a hard time limit
///
/// A hung driver must never block a worker, so every call site wraps its future here with a
/// limit taken from the timing controller.
pub async fn bounded<T, F>(operation: &str, limit: Duration, call: F) -> Result<T, DriverError>
where
    F: Future<Output = Result<T, DriverError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            warn!("driver call '{}' exceeded {}ms", operation, limit.as_millis());
            Err(DriverError::timeout(operation, limit))
        }
    }
}
