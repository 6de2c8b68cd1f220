//! Deadline-bounded retry loop for transient failures
//!
//! Every retrying call site shares the same shape: attempt, classify, back
//! off, give up once the deadline would be crossed. The loop form keeps the
//! stack flat no matter how long an outage lasts.

use std::future::Future;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Retry policy: overall deadline plus backoff bounds
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total time budget across all attempts
    pub deadline: Duration,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Backoff ceiling
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Policy with the given overall deadline and default backoff bounds
    pub fn with_deadline(deadline: Duration) -> Self {
        Self {
            deadline,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::with_deadline(Duration::from_secs(10))
    }
}

/// Run `operation` until it succeeds, fails non-transiently, or the policy
/// deadline is exhausted
pub async fn with_retries<F, Fut, T>(
    what: &str,
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let started = Instant::now();
    let mut delay = policy.initial_delay;
    let mut attempt = 1u32;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(what, attempt, "operation succeeded after retries");
                }
                return Ok(value);
            }
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => {
                let elapsed = started.elapsed();
                if elapsed + delay >= policy.deadline {
                    warn!(what, attempt, %err, "retry deadline exhausted");
                    return Err(Error::timeout(format!("{what}: {err}")));
                }
                warn!(what, attempt, %err, ?delay, "transient failure, retrying");
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, policy.max_delay);
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            deadline: Duration::from_millis(200),
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let out = with_retries("noop", fast_policy(), || async { Ok::<_, Error>(7) }).await;
        assert_eq!(out.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_success_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = Arc::clone(&calls);
        let out = with_retries("flaky", fast_policy(), move || {
            let n = calls2.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::network("connection refused"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(out.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = Arc::clone(&calls);
        let out: Result<()> = with_retries("fatal", fast_policy(), move || {
            calls2.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::config("bad")) }
        })
        .await;
        assert!(matches!(out, Err(Error::Config { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_deadline_exhaustion_surfaces_timeout() {
        let out: Result<()> = with_retries("down", fast_policy(), || async {
            Err(Error::network("still down"))
        })
        .await;
        assert!(matches!(out, Err(Error::Timeout { .. })));
    }
}
