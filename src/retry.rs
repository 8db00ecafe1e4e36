//! Bounded retry with a fixed delay.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// How many times to try an operation and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }
}

/// Outcome of a single attempt.
#[derive(Debug)]
pub enum Attempt<T, E> {
    Done(T),
    /// Failed, but another attempt may succeed.
    Retry(E),
    /// Failed in a way no retry can fix.
    Fail(E),
}

/// Error returned by [`retry`]: the last error and how many attempts ran.
#[derive(Debug)]
pub struct Exhausted<E> {
    pub attempts: u32,
    pub error: E,
}

/// Runs `op` until it is done, fails terminally, or the policy runs out.
///
/// `op` receives the 1-based attempt number. `what` names the operation in
/// retry logs.
pub async fn retry<T, E, F, Fut>(
    policy: RetryPolicy,
    what: &str,
    mut op: F,
) -> Result<T, Exhausted<E>>
where
    E: std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Attempt<T, E>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Attempt::Done(value) => return Ok(value),
            Attempt::Fail(error) => return Err(Exhausted { attempts: attempt, error }),
            Attempt::Retry(error) if attempt >= attempts => {
                return Err(Exhausted { attempts: attempt, error });
            }
            Attempt::Retry(error) => {
                warn!(
                    what,
                    attempt,
                    error = %error,
                    delay_ms = policy.delay.as_millis() as u64,
                    "Attempt failed, retrying"
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}
