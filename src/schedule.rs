//! Merging per-stop arrivals into one ordered schedule.

use std::cmp::Ordering;

use chrono::DateTime;
use chrono_tz::Tz;

use crate::stats::CycleStats;
use crate::time::TimeEncoding;

/// One bus's predicted arrival at one of the configured stops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrivalRecord {
    pub service_code: String,
    pub destination: String,
    pub is_real_time: bool,
    pub arrives: TimeEncoding,
    /// `arrives` normalised against the cycle baseline.
    pub arrival_instant: DateTime<Tz>,
    /// Whole seconds from the cycle baseline to the predicted arrival.
    pub wait_seconds: i64,
}

/// Result of one cycle, consumed once by emission.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeOutcome {
    pub records: Vec<ArrivalRecord>,
    pub malformed: bool,
    pub stats: CycleStats,
}

/// Composite ordering: destination, then arrival instant.
///
/// Service code and wait seconds break any remaining ties so the result never
/// depends on the order pages were fetched in.
pub fn schedule_order(a: &ArrivalRecord, b: &ArrivalRecord) -> Ordering {
    a.destination
        .cmp(&b.destination)
        .then_with(|| a.arrival_instant.cmp(&b.arrival_instant))
        .then_with(|| a.service_code.cmp(&b.service_code))
        .then_with(|| a.wait_seconds.cmp(&b.wait_seconds))
}

/// Builds the cycle outcome from every parsed record.
///
/// A malformed page anywhere poisons the whole cycle: no partial schedule is
/// produced and the outcome carries no records.
pub fn assemble(
    mut records: Vec<ArrivalRecord>,
    any_page_malformed: bool,
    stats: CycleStats,
) -> ScrapeOutcome {
    if any_page_malformed {
        return ScrapeOutcome {
            records: Vec::new(),
            malformed: true,
            stats,
        };
    }

    records.sort_by(schedule_order);

    ScrapeOutcome {
        records,
        malformed: false,
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::CycleBaseline;
    use chrono::{Duration, TimeZone};
    use chrono_tz::Pacific::Auckland;

    fn baseline() -> CycleBaseline {
        CycleBaseline::at(Auckland.with_ymd_and_hms(2024, 3, 14, 17, 30, 0).unwrap())
    }

    fn record(code: &str, dest: &str, arrives: TimeEncoding) -> ArrivalRecord {
        let b = baseline();
        let arrival_instant = arrives.normalize(&b);
        ArrivalRecord {
            service_code: code.to_string(),
            destination: dest.to_string(),
            is_real_time: true,
            arrives,
            arrival_instant,
            wait_seconds: (arrival_instant - b.instant()).num_seconds(),
        }
    }

    fn sample() -> Vec<ArrivalRecord> {
        vec![
            record("2", "Seatoun", TimeEncoding::Minutes(12)),
            record("14", "Kilbirnie", TimeEncoding::Minutes(3)),
            record("2", "Karori", TimeEncoding::Minutes(7)),
            record("3", "Karori", TimeEncoding::Due),
            record("14", "Wilton", "5:15pm".parse().unwrap()),
            record("21", "Karori", "6:05pm".parse().unwrap()),
        ]
    }

    #[test]
    fn test_sorted_by_destination_then_arrival() {
        let outcome = assemble(sample(), false, CycleStats::default());
        assert!(!outcome.malformed);

        let order: Vec<_> = outcome
            .records
            .iter()
            .map(|r| (r.destination.as_str(), r.service_code.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("Karori", "3"),
                ("Karori", "2"),
                ("Karori", "21"),
                ("Kilbirnie", "14"),
                ("Seatoun", "2"),
                ("Wilton", "14"),
            ]
        );

        for pair in outcome.records.windows(2) {
            assert_ne!(schedule_order(&pair[0], &pair[1]), Ordering::Greater);
        }
    }

    #[test]
    fn test_clock_time_in_past_sorts_as_tomorrow() {
        // 5:15pm is over five minutes before the 5:30pm baseline
        let outcome = assemble(sample(), false, CycleStats::default());
        let wilton = outcome
            .records
            .iter()
            .find(|r| r.destination == "Wilton")
            .unwrap();
        assert_eq!(
            wilton.arrival_instant,
            baseline().instant() + Duration::hours(23) + Duration::minutes(45)
        );
    }

    #[test]
    fn test_malformed_discards_records() {
        let outcome = assemble(sample(), true, CycleStats::default());
        assert!(outcome.malformed);
        assert!(outcome.records.is_empty());
    }

    #[test]
    fn test_ordering_is_independent_of_input_order() {
        let forward = assemble(sample(), false, CycleStats::default());
        let mut reversed_input = sample();
        reversed_input.reverse();
        let reversed = assemble(reversed_input, false, CycleStats::default());
        assert_eq!(forward.records, reversed.records);
    }

    #[test]
    fn test_equal_destination_and_time_breaks_on_service_code() {
        let records = vec![
            record("7", "Brooklyn", TimeEncoding::Minutes(4)),
            record("17", "Brooklyn", TimeEncoding::Minutes(4)),
        ];
        let outcome = assemble(records, false, CycleStats::default());
        assert_eq!(outcome.records[0].service_code, "17");
        assert_eq!(outcome.records[1].service_code, "7");
    }
}
