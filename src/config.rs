//! Scraper configuration and defaults.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono_tz::Tz;
use rand::Rng;

use crate::cycle::CycleSettings;
use crate::fetch::{FetchPolicy, StopId};
use crate::retry::RetryPolicy;

/// Environment variable holding the Metlink API key.
pub const API_KEY_ENV: &str = "METLINK_API_KEY";

pub const DEFAULT_STOPS: &str = "6910,5514,5515";
pub const DEFAULT_CONCURRENCY: usize = 5;
pub const DEFAULT_TIMEZONE: &str = "Pacific/Auckland";

/// Everything needed to build a [`ScrapeCycle`](crate::cycle::ScrapeCycle).
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    pub stops: Vec<StopId>,
    pub base_url: String,
    pub api_key: String,
    pub output: String,
    pub concurrency: usize,
    pub timezone: Tz,
    pub fetch: FetchPolicy,
    pub write: RetryPolicy,
    pub delay: CycleDelay,
}

impl ScraperConfig {
    pub fn settings(&self) -> CycleSettings {
        CycleSettings {
            stops: self.stops.clone(),
            concurrency: self.concurrency,
            fetch: self.fetch,
            write: self.write,
            timezone: self.timezone,
        }
    }
}

/// Reads the API key from the environment.
pub fn api_key_from_env() -> Result<String> {
    let key = std::env::var(API_KEY_ENV).with_context(|| format!("{API_KEY_ENV} must be set"))?;
    if key.trim().is_empty() {
        bail!("{API_KEY_ENV} is empty");
    }
    Ok(key)
}

/// Splits a comma separated stop list, ignoring blanks.
pub fn parse_stops(raw: &str) -> Result<Vec<StopId>> {
    let stops: Vec<StopId> = raw
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(StopId::from)
        .collect();
    if stops.is_empty() {
        bail!("no stops configured");
    }
    Ok(stops)
}

pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|e| anyhow::anyhow!("unknown time zone '{name}': {e}"))
}

/// Wait between cycles: a fixed pause, plus random jitter after a cycle that
/// wrote a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleDelay {
    pub fixed: Duration,
    pub jitter_min_secs: u64,
    pub jitter_max_secs: u64,
}

impl Default for CycleDelay {
    fn default() -> Self {
        Self {
            fixed: Duration::from_secs(20),
            jitter_min_secs: 13,
            jitter_max_secs: 19,
        }
    }
}

impl CycleDelay {
    pub fn jitter(&self) -> Duration {
        let (lo, hi) = if self.jitter_min_secs <= self.jitter_max_secs {
            (self.jitter_min_secs, self.jitter_max_secs)
        } else {
            (self.jitter_max_secs, self.jitter_min_secs)
        };
        Duration::from_secs(rand::thread_rng().gen_range(lo..=hi))
    }

    /// Total wait before the next cycle.
    pub fn after(&self, wrote_document: bool) -> Duration {
        if wrote_document {
            self.fixed + self.jitter()
        } else {
            self.fixed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stops() {
        let stops = parse_stops(DEFAULT_STOPS).unwrap();
        let ids: Vec<_> = stops.iter().map(StopId::as_str).collect();
        assert_eq!(ids, vec!["6910", "5514", "5515"]);

        let stops = parse_stops(" 6910 , ,5514,").unwrap();
        assert_eq!(stops.len(), 2);
    }

    #[test]
    fn test_parse_stops_rejects_empty() {
        assert!(parse_stops("").is_err());
        assert!(parse_stops(" , ").is_err());
    }

    #[test]
    fn test_parse_timezone() {
        assert_eq!(parse_timezone(DEFAULT_TIMEZONE).unwrap(), chrono_tz::Pacific::Auckland);
        assert!(parse_timezone("Middle/Earth").is_err());
    }

    #[test]
    fn test_jitter_within_bounds() {
        let delay = CycleDelay::default();
        for _ in 0..100 {
            let wait = delay.after(true);
            assert!(wait >= Duration::from_secs(33));
            assert!(wait <= Duration::from_secs(39));
        }
        assert_eq!(delay.after(false), Duration::from_secs(20));
    }

    #[test]
    fn test_jitter_with_swapped_bounds() {
        let delay = CycleDelay {
            fixed: Duration::ZERO,
            jitter_min_secs: 5,
            jitter_max_secs: 2,
        };
        let wait = delay.jitter();
        assert!(wait >= Duration::from_secs(2) && wait <= Duration::from_secs(5));
    }
}
