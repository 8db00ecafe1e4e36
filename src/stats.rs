use serde::Serialize;
use tracing::{debug, info};

/// Counters collected while parsing one cycle's pages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleStats {
    pub stops: usize,
    pub good_pages: usize,
    pub bad_pages: usize,
    pub malformed_pages: usize,

    // per-departure counters
    pub records: usize,
    pub bad_records: usize,
    pub dropped_records: usize,

    pub elapsed_ms: u64,
}

impl CycleStats {
    pub fn for_stops(stops: usize) -> Self {
        CycleStats {
            stops,
            ..Default::default()
        }
    }

    /// Adds one parsed page's counters.
    pub fn record_page(&mut self, kept: usize, bad: usize, dropped: usize) {
        self.good_pages += 1;
        self.records += kept;
        self.bad_records += bad;
        self.dropped_records += dropped;
    }

    pub fn with_elapsed(mut self, elapsed: std::time::Duration) -> Self {
        self.elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn pct_bad_records(&self) -> f64 {
        let total = self.records + self.bad_records + self.dropped_records;
        if total == 0 {
            0.0
        } else {
            (self.bad_records as f64 / total as f64) * 100.0
        }
    }

    /// Logs the counters as structured fields and as one JSON blob.
    pub fn log(&self) {
        info!(
            good_pages = self.good_pages,
            bad_pages = self.bad_pages,
            malformed_pages = self.malformed_pages,
            records = self.records,
            bad_records = self.bad_records,
            dropped_records = self.dropped_records,
            pct_bad_records = self.pct_bad_records(),
            elapsed_ms = self.elapsed_ms,
            "Cycle summary"
        );
        match serde_json::to_string(self) {
            Ok(json) => debug!(stats = %json, "Cycle stats"),
            Err(e) => debug!(error = %e, "Cycle stats not serialisable"),
        }
    }
}
