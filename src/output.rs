//! Output document rendering and persistence.
//!
//! The display client reads a single XML file that is overwritten every cycle:
//!
//! ```xml
//! <busses scrapeDate="2024:03:14:17:30:00">
//!   <bus code="2" dest="Karori" arrives="5:34pm" arrivalSeconds="240" isRealTime="True"/>
//! </busses>
//! ```

use std::fs;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, error, info};

use crate::error::WriteError;
use crate::retry::{Attempt, RetryPolicy, retry};
use crate::schedule::{ArrivalRecord, ScrapeOutcome};
use crate::time::CycleBaseline;

/// Entries shown instead of a schedule when the feed is unusable.
const UNAVAILABLE_NOTICE: [&str; 2] = ["Real Time Bus Info", "Missing from Metlink Site"];

/// Root `busses` element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename = "busses")]
pub struct OutputDocument {
    #[serde(rename = "@scrapeDate")]
    pub scrape_date: String,
    #[serde(rename = "bus")]
    pub buses: Vec<BusEntry>,
}

/// One `bus` element. Placeholder entries leave the timing attributes out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BusEntry {
    #[serde(rename = "@code")]
    pub code: String,
    #[serde(rename = "@dest")]
    pub dest: String,
    #[serde(rename = "@arrives")]
    pub arrives: String,
    #[serde(rename = "@arrivalSeconds", skip_serializing_if = "Option::is_none")]
    pub arrival_seconds: Option<i64>,
    #[serde(rename = "@isRealTime", skip_serializing_if = "Option::is_none")]
    pub is_real_time: Option<&'static str>,
}

impl From<&ArrivalRecord> for BusEntry {
    fn from(record: &ArrivalRecord) -> Self {
        BusEntry {
            code: record.service_code.clone(),
            dest: record.destination.clone(),
            arrives: record.arrives.to_string(),
            arrival_seconds: Some(record.wait_seconds),
            is_real_time: Some(if record.is_real_time { "True" } else { "False" }),
        }
    }
}

impl OutputDocument {
    /// The schedule, or the fixed "unavailable" notice if the cycle was
    /// malformed.
    pub fn from_outcome(outcome: &ScrapeOutcome, baseline: &CycleBaseline) -> Self {
        if outcome.malformed {
            Self::unavailable(baseline)
        } else {
            OutputDocument {
                scrape_date: baseline.scrape_date(),
                buses: outcome.records.iter().map(BusEntry::from).collect(),
            }
        }
    }

    pub fn unavailable(baseline: &CycleBaseline) -> Self {
        OutputDocument {
            scrape_date: baseline.scrape_date(),
            buses: UNAVAILABLE_NOTICE
                .iter()
                .map(|line| BusEntry {
                    code: String::new(),
                    dest: (*line).to_string(),
                    arrives: String::new(),
                    arrival_seconds: None,
                    is_real_time: None,
                })
                .collect(),
        }
    }

    /// Renders the document as indented XML.
    pub fn to_xml(&self) -> Result<String, quick_xml::SeError> {
        let mut xml = String::new();
        let mut ser = quick_xml::se::Serializer::new(&mut xml);
        ser.indent(' ', 2);
        self.serialize(ser)?;
        xml.push('\n');
        Ok(xml)
    }
}

/// Destination for the rendered document.
pub trait DocumentSink: Send + Sync {
    fn write(&self, contents: &[u8]) -> std::io::Result<()>;
}

/// Overwrites a local file with each document.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DocumentSink for FileSink {
    fn write(&self, contents: &[u8]) -> std::io::Result<()> {
        debug!(path = %self.path.display(), bytes = contents.len(), "Writing document");
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, contents)
    }
}

/// Writes `xml` to `sink`, retrying per `policy`.
///
/// # Errors
///
/// Returns [`WriteError`] with the last I/O error once every attempt failed.
pub async fn write_document<S>(sink: &S, xml: &str, policy: RetryPolicy) -> Result<(), WriteError>
where
    S: DocumentSink + ?Sized,
{
    retry(policy, "write", |attempt| async move {
        match sink.write(xml.as_bytes()) {
            Ok(()) => {
                info!(attempt, "Document written");
                Attempt::Done(())
            }
            Err(e) => Attempt::Retry(e),
        }
    })
    .await
    .map_err(|exhausted| {
        error!(
            attempts = exhausted.attempts,
            error = %exhausted.error,
            "Document write failed, nothing persisted this cycle"
        );
        WriteError {
            attempts: exhausted.attempts,
            source: exhausted.error,
        }
    })
}
