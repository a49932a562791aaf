//! Calendar arithmetic anchored to Monday-start weeks.
//!
//! Sunday is day 7 of the week that started the previous Monday. All helpers
//! are pure and take the reference date explicitly; nothing here reads the
//! wall clock.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// An inclusive instant range: `start <= t <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t <= self.end
    }
}

pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        _ if is_leap_year(year) => 29,
        _ => 28,
    }
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.day0()))
}

/// First instant of the month containing `now` through its last millisecond.
pub fn month_range(now: DateTime<Utc>) -> DateRange {
    let date = now.date_naive();
    let first = first_of_month(date);
    let start = first.and_time(NaiveTime::MIN).and_utc();
    let len = i64::from(days_in_month(date.year(), date.month()));
    let end = start + Duration::days(len) - Duration::milliseconds(1);
    DateRange { start, end }
}

/// Storage suffix for a month, e.g. `2026-10`.
pub fn month_key(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

/// Monday and Sunday of the week containing `date`.
pub fn week_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let monday = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
    (monday, monday + Duration::days(6))
}

/// Days left in the week including `date`: Monday → 7, Sunday → 1.
pub fn days_remaining_in_week(date: NaiveDate) -> u32 {
    7 - date.weekday().num_days_from_monday()
}

/// Monday–Friday days left in the week including `date`; 0 on weekends.
pub fn work_days_remaining_in_week(date: NaiveDate) -> u32 {
    let n = date.weekday().number_from_monday();
    if n <= 5 {
        6 - n
    } else {
        0
    }
}

/// Days left in the month including `date`.
pub fn days_remaining_in_month(date: NaiveDate) -> u32 {
    days_in_month(date.year(), date.month()) - date.day0()
}

/// Monday–Friday days left in the month including `date`.
pub fn work_days_remaining_in_month(date: NaiveDate) -> u32 {
    let remaining = days_remaining_in_month(date);
    (0..remaining)
        .map(|offset| date + Duration::days(i64::from(offset)))
        .filter(|d| d.weekday().number_from_monday() <= 5)
        .count() as u32
}

/// 1-based index of the Monday-start week of the month that holds `date`.
/// A month starting on a Sunday has a one-day week 1.
pub fn week_of_month(date: NaiveDate) -> u32 {
    let lead = first_of_month(date).weekday().num_days_from_monday();
    (date.day0() + lead) / 7 + 1
}

/// Number of Monday-start weeks the month containing `date` touches.
pub fn weeks_in_month(date: NaiveDate) -> u32 {
    let last = first_of_month(date) + Duration::days(i64::from(days_in_month(date.year(), date.month())) - 1);
    week_of_month(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_month_range_bounds() {
        let now = Utc.with_ymd_and_hms(2026, 2, 14, 9, 30, 0).unwrap();
        let r = month_range(now);
        assert_eq!(r.start, Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap());
        assert_eq!(
            r.end,
            Utc.with_ymd_and_hms(2026, 2, 28, 23, 59, 59).unwrap() + Duration::milliseconds(999)
        );
        assert!(r.contains(r.start));
        assert!(r.contains(r.end));
        assert!(!r.contains(r.end + Duration::milliseconds(1)));
    }

    #[test]
    fn test_month_range_leap_february() {
        let now = Utc.with_ymd_and_hms(2028, 2, 29, 12, 0, 0).unwrap();
        let r = month_range(now);
        assert_eq!(r.end.date_naive(), d(2028, 2, 29));
    }

    #[test]
    fn test_month_key_zero_pads() {
        assert_eq!(month_key(d(2026, 3, 9)), "2026-03");
        assert_eq!(month_key(d(2026, 12, 31)), "2026-12");
    }

    #[test]
    fn test_week_bounds_sunday_belongs_to_prior_week() {
        // 2026-10-18 is a Sunday.
        let (mon, sun) = week_bounds(d(2026, 10, 18));
        assert_eq!(mon, d(2026, 10, 12));
        assert_eq!(sun, d(2026, 10, 18));
    }

    #[test]
    fn test_days_remaining_in_week() {
        assert_eq!(days_remaining_in_week(d(2026, 10, 12)), 7); // Monday
        assert_eq!(days_remaining_in_week(d(2026, 10, 16)), 3); // Friday
        assert_eq!(days_remaining_in_week(d(2026, 10, 18)), 1); // Sunday
    }

    #[test]
    fn test_work_days_remaining_in_week() {
        assert_eq!(work_days_remaining_in_week(d(2026, 10, 12)), 5);
        assert_eq!(work_days_remaining_in_week(d(2026, 10, 16)), 1);
        assert_eq!(work_days_remaining_in_week(d(2026, 10, 17)), 0);
        assert_eq!(work_days_remaining_in_week(d(2026, 10, 18)), 0);
    }

    #[test]
    fn test_work_days_remaining_in_month() {
        // October 2026: the 26th is a Monday, five weekdays through the 30th, 31st is a Saturday.
        assert_eq!(work_days_remaining_in_month(d(2026, 10, 26)), 5);
        assert_eq!(work_days_remaining_in_month(d(2026, 10, 31)), 0);
        assert_eq!(work_days_remaining_in_month(d(2026, 10, 1)), 22);
    }

    #[test]
    fn test_week_of_month() {
        // March 2026 starts on a Sunday.
        assert_eq!(week_of_month(d(2026, 3, 1)), 1);
        assert_eq!(week_of_month(d(2026, 3, 2)), 2);
        assert_eq!(week_of_month(d(2026, 3, 31)), 6);
        assert_eq!(weeks_in_month(d(2026, 3, 15)), 6);
        // February 2027 starts on a Monday and has exactly four weeks.
        assert_eq!(weeks_in_month(d(2027, 2, 1)), 4);
    }

    #[test]
    fn test_days_in_month_century_rule() {
        assert_eq!(days_in_month(1900, 2), 28);
        assert_eq!(days_in_month(2000, 2), 29);
        assert_eq!(days_in_month(2026, 4), 30);
    }
}
