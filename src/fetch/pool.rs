use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error};

use super::{FeedSource, FetchPolicy, StopId, fetch_stop};
use crate::error::{CycleError, FetchError};

/// Bytes returned by one successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPage {
    pub stop: StopId,
    pub bytes: Vec<u8>,
}

/// Fetches every stop concurrently, at most `concurrency` at a time.
///
/// Pages come back in the order of `stops`, whatever order they completed
/// in. On the first terminal failure every fetch still queued or in flight
/// is aborted and the error is returned.
///
/// # Errors
///
/// The first [`FetchError`] to surface, or a [`CycleError::Task`] if a fetch
/// task panicked.
pub async fn fetch_all<F>(
    feed: Arc<F>,
    stops: &[StopId],
    concurrency: usize,
    policy: FetchPolicy,
) -> Result<Vec<RawPage>, CycleError>
where
    F: FeedSource + ?Sized + 'static,
{
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for (index, stop) in stops.iter().cloned().enumerate() {
        let sem = semaphore.clone();
        let feed = feed.clone();
        let span = tracing::info_span!("fetch_task", stop = %stop);

        tasks.spawn(
            async move {
                let _permit = sem
                    .acquire_owned()
                    .await
                    .map_err(|e| FetchError::Transport {
                        stop: stop.clone(),
                        reason: e.to_string(),
                    })?;
                let bytes = fetch_stop(feed.as_ref(), &stop, policy).await?;
                Ok::<_, FetchError>((index, RawPage { stop, bytes }))
            }
            .instrument(span),
        );
    }

    let mut pages: Vec<Option<RawPage>> = vec![None; stops.len()];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok((index, page))) => {
                debug!(stop = %page.stop, bytes = page.bytes.len(), "Stop fetched");
                pages[index] = Some(page);
            }
            Ok(Err(e)) => {
                error!(
                    stop = %e.stop(),
                    error = %e,
                    abandoned = tasks.len(),
                    "Stop fetch failed, cancelling remaining fetches"
                );
                tasks.abort_all();
                return Err(e.into());
            }
            Err(e) => {
                tasks.abort_all();
                return Err(e.into());
            }
        }
    }

    Ok(pages.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    const FAST: FetchPolicy = FetchPolicy {
        timeout: Duration::from_secs(10),
        retry: RetryPolicy::new(2, Duration::from_millis(1)),
    };

    /// Answers `"fail"` with an error, `"hang"` never, anything else with the
    /// stop id after a delay that shrinks with the position in `stops`.
    #[derive(Default)]
    struct FakeFeed {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        hang_dropped: Arc<AtomicBool>,
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl FeedSource for FakeFeed {
        async fn fetch(&self, stop: &StopId) -> Result<Vec<u8>, FetchError> {
            match stop.as_str() {
                "fail" => Err(FetchError::Transport {
                    stop: stop.clone(),
                    reason: "connection reset".into(),
                }),
                "hang" => {
                    let _flag = DropFlag(self.hang_dropped.clone());
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(Vec::new())
                }
                id => {
                    let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    self.max_in_flight.fetch_max(now, Ordering::SeqCst);
                    let delay: u64 = id.parse().unwrap_or(1);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    self.in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(id.as_bytes().to_vec())
                }
            }
        }
    }

    fn stops(ids: &[&str]) -> Vec<StopId> {
        ids.iter().map(|id| StopId::from(*id)).collect()
    }

    #[tokio::test]
    async fn test_pages_returned_in_stop_order() {
        let feed = Arc::new(FakeFeed::default());
        // later stops finish first
        let pages = fetch_all(feed, &stops(&["40", "20", "5"]), 5, FAST)
            .await
            .unwrap();

        let ids: Vec<_> = pages.iter().map(|p| p.stop.as_str()).collect();
        assert_eq!(ids, vec!["40", "20", "5"]);
        assert_eq!(pages[0].bytes, b"40");
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let feed = Arc::new(FakeFeed::default());
        let ids: Vec<String> = (0..12).map(|_| "15".to_string()).collect();
        let ids: Vec<&str> = ids.iter().map(String::as_str).collect();

        let pages = fetch_all(feed.clone(), &stops(&ids), 3, FAST).await.unwrap();
        assert_eq!(pages.len(), 12);
        assert!(feed.max_in_flight.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_failure_cancels_in_flight_fetches() {
        let feed = Arc::new(FakeFeed::default());
        let err = fetch_all(feed.clone(), &stops(&["hang", "fail"]), 5, FAST)
            .await
            .unwrap_err();

        assert!(matches!(err, CycleError::Fetch(FetchError::Transport { .. })));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(feed.hang_dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_no_stops_yields_no_pages() {
        let feed = Arc::new(FakeFeed::default());
        assert!(fetch_all(feed, &[], 5, FAST).await.unwrap().is_empty());
    }
}
