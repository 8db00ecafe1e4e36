//! Error types for the scrape pipeline.
//!
//! Only [`FetchError`] and [`WriteError`] escape a cycle (wrapped in
//! [`CycleError`]). Page and record errors are absorbed by the parser and
//! turned into counters or the malformed flag.

use std::time::Duration;

use thiserror::Error;

use crate::fetch::StopId;

/// Failure to retrieve one stop's predictions.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("timed out after {timeout:?} fetching stop {stop}")]
    Timeout { stop: StopId, timeout: Duration },
    #[error("transport error fetching stop {stop}: {reason}")]
    Transport { stop: StopId, reason: String },
    #[error("stop {stop} returned HTTP {status}")]
    Status { stop: StopId, status: u16 },
    #[error("invalid request for stop {stop}: {reason}")]
    InvalidRequest { stop: StopId, reason: String },
}

impl FetchError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::InvalidRequest { .. })
    }

    pub fn stop(&self) -> &StopId {
        match self {
            FetchError::Timeout { stop, .. }
            | FetchError::Transport { stop, .. }
            | FetchError::Status { stop, .. }
            | FetchError::InvalidRequest { stop, .. } => stop,
        }
    }
}

/// A whole page could not be used.
#[derive(Debug, Error)]
pub enum PageError {
    /// The document is not decodable at all. Poisons the whole cycle.
    #[error("page is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    /// Decodable, but there is no `departures` array to read.
    #[error("page has no departures array")]
    MissingDepartures,
}

impl PageError {
    pub fn is_malformed(&self) -> bool {
        matches!(self, PageError::Malformed(_))
    }
}

/// A single departure entry that had to be skipped.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("departure {index} has unexpected shape: {source}")]
    Shape {
        index: usize,
        source: serde_json::Error,
    },
    #[error("departure {index} has no {field} arrival time")]
    MissingArrival { index: usize, field: &'static str },
    #[error("departure {index} has unparseable arrival time {value:?}")]
    Timestamp { index: usize, value: String },
}

/// Unparseable arrival time encoding such as `"soon"` or `"25:99pm"`.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unrecognised arrival time {0:?}")]
pub struct TimeEncodingError(pub String);

/// Persisting the output document failed on every attempt.
#[derive(Debug, Error)]
#[error("writing document failed after {attempts} attempts: {source}")]
pub struct WriteError {
    pub attempts: u32,
    pub source: std::io::Error,
}

/// Reasons a cycle ends without a document being written.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Write(#[from] WriteError),
    #[error("failed to render document: {0}")]
    Render(#[from] quick_xml::SeError),
    #[error("fetch task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
