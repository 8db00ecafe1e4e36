//! One scrape cycle: fetch every stop, parse, assemble, write.
//!
//! ```text
//! FETCHING --(any stop fails twice)--> ABORTED
//! FETCHING --> PARSING --> ASSEMBLING --> EMITTING --> DONE
//! ```
//!
//! The baseline is captured once, when the last page has arrived, and is the
//! only "now" used for every time computation and the `scrapeDate` of the
//! document.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{info, warn};

use crate::error::CycleError;
use crate::fetch::{FeedSource, FetchPolicy, RawPage, StopId, fetch_all};
use crate::output::{DocumentSink, OutputDocument, write_document};
use crate::parser::parse_page;
use crate::retry::RetryPolicy;
use crate::schedule::{ScrapeOutcome, assemble};
use crate::stats::CycleStats;
use crate::time::CycleBaseline;

/// Settings that stay fixed across cycles.
#[derive(Debug, Clone)]
pub struct CycleSettings {
    pub stops: Vec<StopId>,
    pub concurrency: usize,
    pub fetch: FetchPolicy,
    pub write: RetryPolicy,
    pub timezone: Tz,
}

/// What a completed cycle wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub scrape_date: String,
    pub malformed: bool,
    pub stats: CycleStats,
}

/// Runs scrape cycles against a feed and a sink.
pub struct ScrapeCycle<F: ?Sized, S> {
    feed: Arc<F>,
    sink: S,
    settings: CycleSettings,
    clock: fn() -> DateTime<Utc>,
}

impl<F, S> ScrapeCycle<F, S>
where
    F: FeedSource + ?Sized + 'static,
    S: DocumentSink,
{
    pub fn new(feed: Arc<F>, sink: S, settings: CycleSettings) -> Self {
        Self {
            feed,
            sink,
            settings,
            clock: Utc::now,
        }
    }

    /// Replaces the wall clock used to capture the cycle baseline.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Runs one full cycle.
    ///
    /// # Errors
    ///
    /// A stop that could not be fetched aborts the cycle before anything is
    /// written. A write that fails on every attempt is also returned. In both
    /// cases the previous document is left untouched.
    #[tracing::instrument(skip_all, fields(stops = self.settings.stops.len()))]
    pub async fn run(&self) -> Result<CycleReport, CycleError> {
        let started = Instant::now();
        info!("Scrape begins");

        let pages = fetch_all(
            self.feed.clone(),
            &self.settings.stops,
            self.settings.concurrency,
            self.settings.fetch,
        )
        .await?;

        let baseline = CycleBaseline::at((self.clock)().with_timezone(&self.settings.timezone));
        let outcome = self.parse_and_assemble(&pages, &baseline);

        let document = OutputDocument::from_outcome(&outcome, &baseline);
        let xml = document.to_xml()?;
        write_document(&self.sink, &xml, self.settings.write).await?;

        let stats = outcome.stats.with_elapsed(started.elapsed());
        stats.log();
        info!(
            records = document.buses.len(),
            malformed = outcome.malformed,
            "Scraped"
        );

        Ok(CycleReport {
            scrape_date: baseline.scrape_date(),
            malformed: outcome.malformed,
            stats,
        })
    }

    fn parse_and_assemble(&self, pages: &[RawPage], baseline: &CycleBaseline) -> ScrapeOutcome {
        let mut stats = CycleStats::for_stops(self.settings.stops.len());
        let mut records = Vec::new();
        let mut malformed = false;

        for page in pages {
            match parse_page(&page.bytes, baseline) {
                Ok(parsed) => {
                    stats.record_page(
                        parsed.records.len(),
                        parsed.bad_records,
                        parsed.dropped_records,
                    );
                    records.extend(parsed.records);
                }
                Err(e) if e.is_malformed() => {
                    warn!(stop = %page.stop, error = %e, "Page format not as expected");
                    stats.malformed_pages += 1;
                    malformed = true;
                }
                Err(e) => {
                    warn!(stop = %page.stop, error = %e, "Page contents not as expected");
                    stats.bad_pages += 1;
                }
            }
        }

        info!(
            good_pages = stats.good_pages,
            bad_pages = stats.bad_pages + stats.malformed_pages,
            bad_records = stats.bad_records,
            "Pages processed"
        );

        assemble(records, malformed, stats)
    }
}
