//! Bounded polling with a fixed delay.
//!
//! Every check that waits on eventually-consistent cluster state goes through
//! [`poll`]. There is no process-wide default policy: each call site passes
//! its own [`RetryPolicy`].
//!
//! # Example
//!
//! ```ignore
//! use meshcheck::retry::{poll, RetryPolicy};
//!
//! let policy = RetryPolicy::new(Duration::from_secs(30), Duration::from_millis(100));
//! poll(&policy, "lookup istiod", || async {
//!     probe.get_deployment("istio-system", "istiod").await.map(drop)
//! })
//! .await?;
//! ```

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::Error;

/// Timeout and fixed delay for one polling loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Total time budget measured from the first attempt
    #[serde(rename = "timeoutMs", with = "millis")]
    pub timeout: Duration,
    /// Wait between a failed attempt and the next one
    #[serde(rename = "delayMs", with = "millis")]
    pub delay: Duration,
}

impl RetryPolicy {
    /// Create a policy
    pub const fn new(timeout: Duration, delay: Duration) -> Self {
        Self { timeout, delay }
    }

    /// Policy for the install status check (100s / 1s)
    pub const fn install_status() -> Self {
        Self::new(Duration::from_secs(100), Duration::from_secs(1))
    }

    /// Policy for a single manifest object lookup (30s / 100ms)
    pub const fn object_lookup() -> Self {
        Self::new(Duration::from_secs(30), Duration::from_millis(100))
    }

    /// Reject policies that would spin without sleeping
    pub fn validate(&self) -> Result<(), Error> {
        if self.delay.is_zero() {
            return Err(Error::config("retry delay must be greater than zero"));
        }
        if self.timeout < self.delay {
            return Err(Error::config(format!(
                "retry timeout {:?} is shorter than delay {:?}",
                self.timeout, self.delay
            )));
        }
        Ok(())
    }
}

/// Invoke `probe` until it succeeds, fails permanently, or the policy's
/// timeout elapses.
///
/// The first attempt runs immediately. After a retryable failure the loop
/// sleeps for `policy.delay`, clamped so the final attempt lands on the
/// deadline. Errors for which [`Error::is_retryable`] is false are returned
/// as-is without further attempts. On timeout the last failure is wrapped in
/// [`Error::Timeout`]. A policy that fails [`RetryPolicy::validate`] is
/// rejected before the first attempt.
pub async fn poll<F, Fut, T>(policy: &RetryPolicy, operation: &str, mut probe: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    policy.validate()?;

    let start = Instant::now();
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let err = match probe().await {
            Ok(value) => {
                debug!(operation = %operation, attempt, "Poll succeeded");
                return Ok(value);
            }
            Err(e) if !e.is_retryable() => {
                debug!(operation = %operation, attempt, error = %e, "Poll aborted on permanent error");
                return Err(e);
            }
            Err(e) => e,
        };

        let elapsed = start.elapsed();
        if elapsed >= policy.timeout {
            warn!(
                operation = %operation,
                attempt,
                elapsed_ms = elapsed.as_millis(),
                error = %err,
                "Poll timed out"
            );
            return Err(Error::Timeout {
                operation: operation.to_string(),
                elapsed,
                last: Box::new(err),
            });
        }

        // Expected while the cluster converges
        trace!(operation = %operation, attempt, error = %err, "Poll attempt failed, retrying");

        let remaining = policy.timeout - elapsed;
        tokio::time::sleep(policy.delay.min(remaining)).await;
    }
}

mod millis {
    use std::time::Duration;

    use serde::ser::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        let ms = u64::try_from(d.as_millis()).map_err(S::Error::custom)?;
        s.serialize_u64(ms)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
