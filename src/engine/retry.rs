//! Bounded exponential retry for operations that may hit transient store conflicts.

use crate::config::RetryPolicy;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Exponential backoff that gives up after `max_retries` delays.
///
/// No jitter: delays are `base`, `2*base`, `4*base`, ...
pub struct BoundedBackoff {
    inner: ExponentialBackoff,
    max_retries: u32,
    remaining: u32,
}

impl BoundedBackoff {
    pub fn new(policy: &RetryPolicy) -> Self {
        let inner = ExponentialBackoff {
            current_interval: policy.base_delay,
            initial_interval: policy.base_delay,
            randomization_factor: 0.0,
            multiplier: 2.0,
            max_interval: policy.base_delay.saturating_mul(1 << policy.max_retries.min(16)),
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        };
        Self {
            inner,
            max_retries: policy.max_retries,
            remaining: policy.max_retries,
        }
    }
}

impl Backoff for BoundedBackoff {
    fn reset(&mut self) {
        self.inner.reset();
        self.remaining = self.max_retries;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.inner.next_backoff()
    }
}

/// Run `operation`, retrying from scratch while `is_retryable` holds, at most
/// `policy.max_retries` times. Any other error is returned on first sight.
pub async fn with_retry<T, E, F, Fut, R>(
    policy: &RetryPolicy,
    is_retryable: R,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: fmt::Display,
{
    let is_retryable = &is_retryable;
    backoff::future::retry_notify(
        BoundedBackoff::new(policy),
        || {
            let fut = operation();
            async move {
                fut.await.map_err(|err| {
                    if is_retryable(&err) {
                        backoff::Error::transient(err)
                    } else {
                        backoff::Error::permanent(err)
                    }
                })
            }
        },
        |err: E, delay: Duration| {
            warn!(
                error = %err,
                delay_ms = delay.as_millis() as u64,
                "Transient store conflict, retrying"
            );
        },
    )
    .await
}
