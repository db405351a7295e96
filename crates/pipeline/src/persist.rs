//! Store writes made after a task was acknowledged.
//!
//! Once a submission is accepted the task has to reach a terminal state, so
//! writes failing on persistence itself are repeated with backoff instead of
//! being dropped. Errors about record state ([`StoreError::InvalidTransition`],
//! [`StoreError::NotFound`]) come back on the first attempt.

use std::future::Future;

use orch_core::retry::RetryPolicy;
use orch_db::store::StoreError;
use tokio_util::sync::CancellationToken;

/// Run `write` until it succeeds, fails on record state, or `stop` fires.
///
/// `policy` supplies the backoff only; there is no attempt limit. On `stop`
/// the last persistence error is returned.
pub(crate) async fn retry_write<T, F, Fut>(
    policy: &RetryPolicy,
    stop: &CancellationToken,
    write_name: &'static str,
    mut write: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let err = match write().await {
            Err(e) if e.is_write_failure() => e,
            other => return other,
        };
        if stop.is_cancelled() {
            return Err(err);
        }

        let delay = policy.backoff_with_jitter(attempt);
        tracing::warn!(
            write = write_name,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Store write failed, retrying",
        );
        tokio::select! {
            _ = stop.cancelled() => return Err(err),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
