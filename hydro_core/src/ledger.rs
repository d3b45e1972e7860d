//! In-memory intake ledger.
//!
//! Append-only log of cumulative readings for the current session. Daily
//! aggregates are derived on every call rather than cached; session volumes
//! are a few readings per minute at most.

use crate::{DailyBucket, IntakeReading};
use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Days covered by the weekly summary
pub const WEEK_DAYS: usize = 7;

/// History figures over the whole ledger
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryStats {
    pub total_records: usize,
    /// Mean of all recorded totals, rounded
    pub average_ml: u32,
    pub highest_ml: u32,
    /// The last [`WEEK_DAYS`] daily buckets, in first-seen order
    pub week: Vec<DailyBucket>,
}

/// Ordered log of intake readings
#[derive(Clone, Debug, Default)]
pub struct Ledger {
    readings: Vec<IntakeReading>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a reading. Nothing is rejected, including totals lower than
    /// the previous one (bottle counter resets).
    pub fn append(&mut self, reading: IntakeReading) {
        self.readings.push(reading);
    }

    /// Cumulative total of the most recent reading, 0 when empty
    pub fn latest_total(&self) -> u32 {
        self.readings.last().map_or(0, |r| r.intake_ml)
    }

    /// Timestamp of the most recent reading
    pub fn last_synced(&self) -> Option<DateTime<Utc>> {
        self.readings.last().map(|r| r.timestamp)
    }

    /// All readings in insertion order
    pub fn readings(&self) -> &[IntakeReading] {
        &self.readings
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// The last `n` readings, most recent first
    pub fn recent(&self, n: usize) -> Vec<IntakeReading> {
        self.readings.iter().rev().take(n).copied().collect()
    }

    /// Mean of all recorded totals, rounded half up. 0 when empty.
    pub fn average_ml(&self) -> u32 {
        if self.readings.is_empty() {
            return 0;
        }
        let sum: u64 = self.readings.iter().map(|r| u64::from(r.intake_ml)).sum();
        let count = self.readings.len() as u64;
        ((sum + count / 2) / count) as u32
    }

    /// Highest recorded total, 0 when empty
    pub fn highest_ml(&self) -> u32 {
        self.readings.iter().map(|r| r.intake_ml).max().unwrap_or(0)
    }

    /// The last `n` daily buckets in `tz`, in first-seen order
    pub fn last_days_in<Tz: TimeZone>(&self, n: usize, tz: &Tz) -> Vec<DailyBucket> {
        let mut buckets = self.daily_buckets_in(tz);
        let skip = buckets.len().saturating_sub(n);
        buckets.drain(..skip);
        buckets
    }

    pub fn stats(&self) -> HistoryStats {
        self.stats_in(&Local)
    }

    pub fn stats_in<Tz: TimeZone>(&self, tz: &Tz) -> HistoryStats {
        HistoryStats {
            total_records: self.readings.len(),
            average_ml: self.average_ml(),
            highest_ml: self.highest_ml(),
            week: self.last_days_in(WEEK_DAYS, tz),
        }
    }

    /// Daily maxima by local calendar day, in first-seen order
    pub fn daily_buckets(&self) -> Vec<DailyBucket> {
        self.daily_buckets_in(&Local)
    }

    /// Daily maxima by calendar day in `tz`, in first-seen order
    pub fn daily_buckets_in<Tz: TimeZone>(&self, tz: &Tz) -> Vec<DailyBucket> {
        let mut buckets: Vec<DailyBucket> = Vec::new();
        let mut index: HashMap<NaiveDate, usize> = HashMap::new();

        for reading in &self.readings {
            let day = reading.timestamp.with_timezone(tz).date_naive();
            match index.get(&day) {
                Some(&idx) => {
                    let bucket = &mut buckets[idx];
                    bucket.ml = bucket.ml.max(reading.intake_ml);
                }
                None => {
                    index.insert(day, buckets.len());
                    buckets.push(DailyBucket {
                        day,
                        ml: reading.intake_ml,
                    });
                }
            }
        }

        buckets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn at(rfc3339: &str, intake_ml: u32) -> IntakeReading {
        let timestamp = DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .with_timezone(&Utc);
        IntakeReading::new(timestamp, intake_ml)
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_latest_total_tracks_last_append() {
        let mut ledger = Ledger::new();
        assert_eq!(ledger.latest_total(), 0);
        assert!(ledger.last_synced().is_none());

        ledger.append(at("2024-05-01T08:00:00Z", 120));
        ledger.append(at("2024-05-01T09:00:00Z", 480));
        assert_eq!(ledger.latest_total(), 480);

        // Counter reset on the bottle: still accepted, still latest
        ledger.append(at("2024-05-01T10:00:00Z", 30));
        assert_eq!(ledger.latest_total(), 30);
        assert_eq!(ledger.len(), 3);
    }

    #[test]
    fn test_single_day_gives_one_bucket_with_max() {
        let mut ledger = Ledger::new();
        for (time, ml) in [("08:00", 200), ("12:30", 900), ("18:45", 650)] {
            ledger.append(at(&format!("2024-05-01T{}:00Z", time), ml));
        }

        let buckets = ledger.daily_buckets_in(&Utc);
        assert_eq!(buckets, vec![DailyBucket { day: day(2024, 5, 1), ml: 900 }]);
    }

    #[test]
    fn test_buckets_by_day_in_first_seen_order() {
        let mut ledger = Ledger::new();
        ledger.append(at("2024-05-01T08:00:00Z", 100));
        ledger.append(at("2024-05-01T20:00:00Z", 250));
        ledger.append(at("2024-05-02T07:00:00Z", 80));

        let buckets = ledger.daily_buckets_in(&Utc);
        assert_eq!(
            buckets,
            vec![
                DailyBucket { day: day(2024, 5, 1), ml: 250 },
                DailyBucket { day: day(2024, 5, 2), ml: 80 },
            ]
        );
    }

    #[test]
    fn test_buckets_follow_time_zone() {
        let mut ledger = Ledger::new();
        // 23:30 UTC is already the next day at UTC+2
        ledger.append(at("2024-05-01T20:00:00Z", 100));
        ledger.append(at("2024-05-01T23:30:00Z", 300));

        let utc = ledger.daily_buckets_in(&Utc);
        assert_eq!(utc.len(), 1);

        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        let shifted = ledger.daily_buckets_in(&plus_two);
        assert_eq!(
            shifted,
            vec![
                DailyBucket { day: day(2024, 5, 1), ml: 100 },
                DailyBucket { day: day(2024, 5, 2), ml: 300 },
            ]
        );
    }

    #[test]
    fn test_recent_is_newest_first_and_clamped() {
        let mut ledger = Ledger::new();
        ledger.append(at("2024-05-01T08:00:00Z", 10));
        ledger.append(at("2024-05-01T09:00:00Z", 20));
        ledger.append(at("2024-05-01T10:00:00Z", 30));

        let totals: Vec<u32> = ledger.recent(2).iter().map(|r| r.intake_ml).collect();
        assert_eq!(totals, vec![30, 20]);

        assert_eq!(ledger.recent(10).len(), 3);
        assert!(ledger.recent(0).is_empty());
    }

    #[test]
    fn test_empty_ledger_has_no_buckets() {
        assert!(Ledger::new().daily_buckets().is_empty());
    }

    #[test]
    fn test_empty_ledger_stats_are_zero() {
        let stats = Ledger::new().stats_in(&Utc);
        assert_eq!(
            stats,
            HistoryStats {
                total_records: 0,
                average_ml: 0,
                highest_ml: 0,
                week: Vec::new(),
            }
        );
    }

    #[test]
    fn test_average_rounds_and_highest_survives_reset() {
        let mut ledger = Ledger::new();
        ledger.append(at("2024-05-01T08:00:00Z", 100));
        ledger.append(at("2024-05-01T09:00:00Z", 901));
        // Counter reset
        ledger.append(at("2024-05-01T10:00:00Z", 50));

        // 1051 / 3 = 350.33
        assert_eq!(ledger.average_ml(), 350);
        assert_eq!(ledger.highest_ml(), 901);

        ledger.append(at("2024-05-01T11:00:00Z", 351));
        // 1402 / 4 = 350.5
        assert_eq!(ledger.average_ml(), 351);
    }

    #[test]
    fn test_week_keeps_last_seven_days() {
        let mut ledger = Ledger::new();
        for d in 1..=9 {
            ledger.append(at(&format!("2024-05-{:02}T12:00:00Z", d), d * 100));
        }

        let stats = ledger.stats_in(&Utc);
        assert_eq!(stats.total_records, 9);
        assert_eq!(stats.highest_ml, 900);
        assert_eq!(stats.week.len(), WEEK_DAYS);
        assert_eq!(stats.week[0], DailyBucket { day: day(2024, 5, 3), ml: 300 });
        assert_eq!(stats.week[6], DailyBucket { day: day(2024, 5, 9), ml: 900 });

        // Fewer days than a week are all kept
        assert_eq!(ledger.last_days_in(20, &Utc).len(), 9);
    }
}
