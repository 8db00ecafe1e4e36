use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Method, Request, Url};
use tracing::debug;

use super::StopId;
use super::client::HttpClient;
use crate::error::FetchError;

/// Default Metlink stop predictions endpoint; the stop goes in `stop_id`.
pub const METLINK_PREDICTIONS_URL: &str = "https://api.opendata.metlink.org.nz/v1/stop-predictions";

/// Anything that can return one stop's raw prediction page.
///
/// A single call is a single attempt; timeouts and retries are layered on by
/// [`fetch_stop`](super::fetch_stop).
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, stop: &StopId) -> Result<Vec<u8>, FetchError>;
}

/// [`FeedSource`] backed by an HTTP endpoint taking the stop as a query
/// parameter.
pub struct HttpFeed<C> {
    client: C,
    base_url: Url,
}

impl<C: HttpClient> HttpFeed<C> {
    pub fn new(client: C, base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("invalid predictions URL '{base_url}'"))?;
        Ok(Self { client, base_url })
    }

    fn url_for(&self, stop: &StopId) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut().append_pair("stop_id", stop.as_str());
        url
    }
}

fn transport(stop: &StopId, err: reqwest::Error) -> FetchError {
    if err.is_builder() {
        FetchError::InvalidRequest {
            stop: stop.clone(),
            reason: err.to_string(),
        }
    } else {
        FetchError::Transport {
            stop: stop.clone(),
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl<C: HttpClient> FeedSource for HttpFeed<C> {
    async fn fetch(&self, stop: &StopId) -> Result<Vec<u8>, FetchError> {
        let url = self.url_for(stop);
        debug!(url = %url, "Requesting stop predictions");

        let resp = self
            .client
            .execute(Request::new(Method::GET, url))
            .await
            .map_err(|e| transport(stop, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                stop: stop.clone(),
                status: status.as_u16(),
            });
        }

        let bytes = resp.bytes().await.map_err(|e| transport(stop, e))?;
        debug!(bytes = bytes.len(), "Stop predictions received");
        Ok(bytes.to_vec())
    }
}
