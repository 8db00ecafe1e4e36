use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Pacific::Auckland;
use std::env;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use stop_scraper::cycle::{CycleSettings, ScrapeCycle};
use stop_scraper::error::{CycleError, FetchError};
use stop_scraper::fetch::{FeedSource, FetchPolicy, StopId};
use stop_scraper::output::FileSink;
use stop_scraper::retry::RetryPolicy;

struct FixtureFeed;

#[async_trait]
impl FeedSource for FixtureFeed {
    async fn fetch(&self, stop: &StopId) -> Result<Vec<u8>, FetchError> {
        match stop.as_str() {
            "6910" => Ok(include_bytes!("fixtures/stop_predictions_6910.json").to_vec()),
            "5514" => Ok(include_bytes!("fixtures/stop_predictions_5514.json").to_vec()),
            "broken" => Ok(b"<html><body>Gateway Timeout</body></html>".to_vec()),
            _ => Err(FetchError::Timeout {
                stop: stop.clone(),
                timeout: Duration::from_millis(10),
            }),
        }
    }
}

fn evening() -> DateTime<Utc> {
    Auckland
        .with_ymd_and_hms(2024, 3, 14, 17, 30, 0)
        .unwrap()
        .with_timezone(&Utc)
}

fn settings(stops: &[&str]) -> CycleSettings {
    CycleSettings {
        stops: stops.iter().map(|s| StopId::from(*s)).collect(),
        concurrency: 5,
        fetch: FetchPolicy {
            timeout: Duration::from_secs(1),
            retry: RetryPolicy::new(2, Duration::from_millis(1)),
        },
        write: RetryPolicy::new(2, Duration::from_millis(1)),
        timezone: Auckland,
    }
}

fn temp_path(name: &str) -> std::path::PathBuf {
    env::temp_dir().join(name)
}

#[tokio::test]
async fn test_full_pipeline() {
    let path = temp_path("stop_scraper_it_full.xml");
    let _ = fs::remove_file(&path);

    let cycle = ScrapeCycle::new(
        Arc::new(FixtureFeed),
        FileSink::new(&path),
        settings(&["6910", "5514"]),
    )
    .with_clock(evening);

    let report = cycle.run().await.expect("cycle should succeed");
    assert!(!report.malformed);
    assert_eq!(report.scrape_date, "2024:03:14:17:30:00");
    assert_eq!(report.stats.good_pages, 2);
    // 22 has no destination name; N22 is over 100 hours away
    assert_eq!(report.stats.bad_records, 1);
    assert_eq!(report.stats.dropped_records, 1);
    assert_eq!(report.stats.records, 4);

    let xml = fs::read_to_string(&path).unwrap();
    let order: Vec<_> = ["code=\"N1\"", "code=\"21\"", "code=\"2\"", "code=\"3\""]
        .iter()
        .map(|needle| xml.find(needle).expect(needle))
        .collect();
    assert!(order.windows(2).all(|w| w[0] < w[1]), "unexpected order:\n{xml}");

    assert!(xml.contains(
        r#"<bus code="2" dest="Karori" arrives="5:39pm" arrivalSeconds="540" isRealTime="True"/>"#
    ));
    assert!(xml.contains(
        r#"<bus code="21" dest="Karori" arrives="5:34pm" arrivalSeconds="240" isRealTime="False"/>"#
    ));
    assert!(xml.contains(r#"code="3" dest="Lyall Bay" arrives="5:30pm" arrivalSeconds="30""#));
    assert!(xml.contains(r#"code="N1" dest="Island Bay" arrives="12:05am""#));

    fs::remove_file(&path).unwrap();
}

#[tokio::test]
async fn test_broken_stop_yields_placeholder_document() {
    let path = temp_path("stop_scraper_it_placeholder.xml");
    let _ = fs::remove_file(&path);

    let cycle = ScrapeCycle::new(
        Arc::new(FixtureFeed),
        FileSink::new(&path),
        settings(&["6910", "broken", "5514"]),
    )
    .with_clock(evening);

    let report = cycle.run().await.unwrap();
    assert!(report.malformed);

    let xml = fs::read_to_string(&path).unwrap();
    assert!(xml.contains(r#"<bus code="" dest="Real Time Bus Info" arrives=""/>"#));
    assert!(xml.contains(r#"<bus code="" dest="Missing from Metlink Site" arrives=""/>"#));
    assert_eq!(xml.matches("<bus ").count(), 2);

    fs::remove_file(&path).unwrap();
}

#[tokio::test]
async fn test_unreachable_stop_leaves_previous_document() {
    let path = temp_path("stop_scraper_it_unreachable.xml");
    fs::write(&path, "<busses scrapeDate=\"earlier\"/>").unwrap();

    let cycle = ScrapeCycle::new(
        Arc::new(FixtureFeed),
        FileSink::new(&path),
        settings(&["6910", "9999"]),
    )
    .with_clock(evening);

    let err = cycle.run().await.unwrap_err();
    assert!(matches!(err, CycleError::Fetch(FetchError::Timeout { .. })));
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "<busses scrapeDate=\"earlier\"/>"
    );

    fs::remove_file(&path).unwrap();
}
