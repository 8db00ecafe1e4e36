//! Arrival time normalisation.
//!
//! The feed and the display client speak three different "time until arrival"
//! dialects: `Due`, a countdown such as `5 mins`, and a bare clock time such
//! as `9:05pm`. [`TimeEncoding::normalize`] maps all of them onto one
//! absolute instant relative to a shared [`CycleBaseline`], so records from
//! different stops can be compared directly.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use crate::error::TimeEncodingError;

/// Clock times further than this in the past are taken to mean tomorrow.
const ROLLOVER_GRACE_MINUTES: i64 = 5;

/// The reference "now" for one cycle.
///
/// Captured exactly once per cycle and passed explicitly to every relative
/// time computation in that cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleBaseline(DateTime<Tz>);

impl CycleBaseline {
    pub fn now(tz: Tz) -> Self {
        Self(Utc::now().with_timezone(&tz))
    }

    pub fn at(instant: DateTime<Tz>) -> Self {
        Self(instant)
    }

    pub fn instant(&self) -> DateTime<Tz> {
        self.0
    }

    pub fn timezone(&self) -> Tz {
        self.0.timezone()
    }

    /// Formats the baseline as the document's `scrapeDate` attribute.
    pub fn scrape_date(&self) -> String {
        self.0.format("%Y:%m:%d:%H:%M:%S").to_string()
    }
}

/// One raw "time until arrival" representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeEncoding {
    Due,
    Minutes(u32),
    /// Wall clock time with no date; the baseline supplies date and zone.
    Clock(NaiveTime),
}

impl TimeEncoding {
    /// Builds a clock encoding from an instant, keeping only hour and minute.
    pub fn clock_of<T: TimeZone>(instant: &DateTime<T>) -> Self {
        let time = NaiveTime::from_hms_opt(instant.hour(), instant.minute(), 0)
            .unwrap_or(NaiveTime::MIN);
        TimeEncoding::Clock(time)
    }

    /// Maps this encoding to an absolute instant against `baseline`.
    ///
    /// `Due` lands five minutes before the baseline so it always sorts first.
    /// `N mins` lands at `N - 1` minutes and 30 seconds, matching the feed's
    /// own rounding of countdowns. Clock times are placed on the baseline's
    /// local date and pushed to the next day when they would be more than
    /// five minutes in the past.
    pub fn normalize(&self, baseline: &CycleBaseline) -> DateTime<Tz> {
        let now = baseline.instant();
        match *self {
            TimeEncoding::Due => now - Duration::minutes(5),
            TimeEncoding::Minutes(n) => {
                now + Duration::minutes(i64::from(n) - 1) + Duration::seconds(30)
            }
            TimeEncoding::Clock(time) => {
                let local = now.naive_local();
                let same_day = local
                    .with_hour(time.hour())
                    .and_then(|t| t.with_minute(time.minute()))
                    .unwrap_or(local);
                // The clock value means hh:mm:00; the baseline's seconds only
                // carry into the returned instant.
                let on_the_minute = localize(&now, local.date().and_time(time));
                if on_the_minute < now - Duration::minutes(ROLLOVER_GRACE_MINUTES) {
                    localize(&now, same_day + Duration::days(1))
                } else {
                    localize(&now, same_day)
                }
            }
        }
    }
}

/// Interprets a naive local time in the baseline's zone.
///
/// Times falling in a DST gap are shifted by their naive distance from the
/// baseline instead of failing.
fn localize(now: &DateTime<Tz>, local: NaiveDateTime) -> DateTime<Tz> {
    now.timezone()
        .from_local_datetime(&local)
        .earliest()
        .unwrap_or_else(|| *now + (local - now.naive_local()))
}

impl fmt::Display for TimeEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeEncoding::Due => write!(f, "Due"),
            TimeEncoding::Minutes(n) => write!(f, "{n} mins"),
            // 9:05am: lowercase, no leading zero
            TimeEncoding::Clock(time) => {
                write!(f, "{}", time.format("%-I:%M%p").to_string().to_lowercase())
            }
        }
    }
}

impl FromStr for TimeEncoding {
    type Err = TimeEncodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if raw.eq_ignore_ascii_case("due") {
            return Ok(TimeEncoding::Due);
        }

        if let Some(count) = raw
            .strip_suffix("mins")
            .or_else(|| raw.strip_suffix("min"))
        {
            return count
                .trim()
                .parse::<u32>()
                .map(TimeEncoding::Minutes)
                .map_err(|_| TimeEncodingError(s.to_string()));
        }

        NaiveTime::parse_from_str(&raw.to_uppercase(), "%I:%M%p")
            .map(TimeEncoding::Clock)
            .map_err(|_| TimeEncodingError(s.to_string()))
    }
}
