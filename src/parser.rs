//! JSON parser for stop prediction pages.
//!
//! A page is parsed in two stages. The container must decode as JSON and hold
//! a `departures` array; otherwise the whole page is rejected. Each departure
//! is then read on its own, so one broken entry only costs that entry.

use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{PageError, RecordError};
use crate::schedule::ArrivalRecord;
use crate::time::{CycleBaseline, TimeEncoding};

/// Arrivals further out than this (100 hours) are treated as bad data and dropped.
pub const MAX_WAIT_SECONDS: i64 = 360_000;

#[derive(Debug, Deserialize)]
struct Departure {
    service_id: String,
    destination: Destination,
    monitored: bool,
    #[serde(default)]
    arrival: ArrivalTimes,
}

#[derive(Debug, Deserialize)]
struct Destination {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct ArrivalTimes {
    expected: Option<String>,
    aimed: Option<String>,
}

/// Records recovered from one page plus what had to be skipped.
#[derive(Debug, Default)]
pub struct ParsedPage {
    pub records: Vec<ArrivalRecord>,
    pub bad_records: usize,
    pub dropped_records: usize,
}

/// Parses one stop's prediction page against the cycle baseline.
///
/// # Errors
///
/// Returns [`PageError::Malformed`] if the bytes are not JSON and
/// [`PageError::MissingDepartures`] if there is no `departures` array.
/// Problems with individual departures are counted, not returned.
pub fn parse_page(bytes: &[u8], baseline: &CycleBaseline) -> Result<ParsedPage, PageError> {
    let document: Value = serde_json::from_slice(bytes)?;
    let departures = match document {
        Value::Object(mut map) => match map.remove("departures") {
            Some(Value::Array(entries)) => entries,
            _ => return Err(PageError::MissingDepartures),
        },
        _ => return Err(PageError::MissingDepartures),
    };

    let mut page = ParsedPage::default();
    for (index, entry) in departures.into_iter().enumerate() {
        match parse_departure(index, entry, baseline) {
            Ok(record) if record.wait_seconds >= MAX_WAIT_SECONDS => {
                debug!(
                    service = %record.service_code,
                    wait_seconds = record.wait_seconds,
                    "Dropping implausibly distant departure"
                );
                page.dropped_records += 1;
            }
            Ok(record) => page.records.push(record),
            Err(e) => {
                warn!(error = %e, "Skipping departure");
                page.bad_records += 1;
            }
        }
    }

    Ok(page)
}

fn parse_departure(
    index: usize,
    entry: Value,
    baseline: &CycleBaseline,
) -> Result<ArrivalRecord, RecordError> {
    let departure: Departure =
        serde_json::from_value(entry).map_err(|source| RecordError::Shape { index, source })?;

    // live predictions carry `expected`, timetabled ones only `aimed`
    let (field, raw) = if departure.monitored {
        ("expected", departure.arrival.expected)
    } else {
        ("aimed", departure.arrival.aimed)
    };
    let raw = raw.ok_or(RecordError::MissingArrival { index, field })?;
    let arrival = parse_timestamp(&raw).ok_or(RecordError::Timestamp { index, value: raw })?;

    let local = arrival.with_timezone(&baseline.timezone());
    let arrives = TimeEncoding::clock_of(&local);

    Ok(ArrivalRecord {
        service_code: departure.service_id,
        destination: departure.destination.name,
        is_real_time: departure.monitored,
        arrives,
        arrival_instant: arrives.normalize(baseline),
        wait_seconds: (local - baseline.instant()).num_seconds(),
    })
}

fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z"))
        .ok()
}
