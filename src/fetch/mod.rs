//! Retrieval of raw stop prediction pages.
//!
//! [`FeedSource`] is the per-stop fetch capability; [`HttpFeed`] implements it
//! over any [`HttpClient`]. [`fetch_stop`] adds the per-attempt timeout and
//! retry, and [`fetch_all`] runs one such fetch per stop in a bounded pool.

mod basic;
mod client;
mod feed;
mod pool;
pub mod auth;

pub use basic::BasicClient;
pub use client::HttpClient;
pub use feed::{FeedSource, HttpFeed, METLINK_PREDICTIONS_URL};
pub use pool::{RawPage, fetch_all};

use std::fmt;
use std::time::Duration;

use tracing::error;

use crate::error::FetchError;
use crate::retry::{Attempt, RetryPolicy, retry};

/// Identifier of one physical stop, e.g. `"6910"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StopId(String);

impl StopId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StopId {
    fn from(id: &str) -> Self {
        StopId(id.trim().to_string())
    }
}

impl From<String> for StopId {
    fn from(id: String) -> Self {
        StopId::from(id.as_str())
    }
}

impl fmt::Display for StopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Timeout and retry settings for one stop's fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPolicy {
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            retry: RetryPolicy::new(2, Duration::from_secs(3)),
        }
    }
}

/// Fetches one stop, bounding each attempt by `policy.timeout` and retrying
/// per `policy.retry`.
///
/// # Errors
///
/// Returns the last [`FetchError`] once the attempts are used up, or the
/// first one that is not retryable.
#[tracing::instrument(skip_all, fields(stop = %stop))]
pub async fn fetch_stop<F>(feed: &F, stop: &StopId, policy: FetchPolicy) -> Result<Vec<u8>, FetchError>
where
    F: FeedSource + ?Sized,
{
    let timeout = policy.timeout;
    retry(policy.retry, "fetch", |_| async move {
        match tokio::time::timeout(timeout, feed.fetch(stop)).await {
            Ok(Ok(bytes)) => Attempt::Done(bytes),
            Ok(Err(e)) if e.is_retryable() => Attempt::Retry(e),
            Ok(Err(e)) => Attempt::Fail(e),
            Err(_) => Attempt::Retry(FetchError::Timeout {
                stop: stop.clone(),
                timeout,
            }),
        }
    })
    .await
    .map_err(|exhausted| {
        error!(
            attempts = exhausted.attempts,
            error = %exhausted.error,
            "Giving up on stop"
        );
        exhausted.error
    })
}
