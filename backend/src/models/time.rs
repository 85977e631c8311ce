//! Calendar arithmetic for weekly checkpoints and plan windows.
//!
//! Everything here works on whole calendar dates (`NaiveDate`); the tracking
//! service's timestamps are reduced to their UTC date before they get here.

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, Utc};

const DAYS_PER_WEEK: i64 = 7;

/// Whole weeks from `start` to `end`, rounded towards negative infinity.
///
/// Negative when `end` precedes `start` (one day before is `-1`).
pub fn weeks_between(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days().div_euclid(DAYS_PER_WEEK)
}

/// Monday of the ISO week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    let offset = date.weekday().num_days_from_monday() as u64;
    date.checked_sub_days(Days::new(offset)).unwrap_or(date)
}

/// Midnight UTC at the start of `date`, used as the "as of" instant for
/// point-in-time queries.
pub fn start_of_day_utc(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Forecast completion of a plan window as of a given date.
///
/// Returns `100 * weeks(start, as_of) / weeks(start, end)` clamped to
/// `0..=100`. A missing bound means the item has no plan and yields `0`.
///
/// Windows shorter than one week (or inverted ones) cannot be divided into;
/// they count as complete from `start` onwards and `0` before it.
///
/// The result is not rounded.
pub fn calc_pct_completion(
    item_start: Option<NaiveDate>,
    item_end: Option<NaiveDate>,
    as_of: NaiveDate,
) -> f64 {
    let (Some(start), Some(end)) = (item_start, item_end) else {
        return 0.0;
    };

    let total_weeks = weeks_between(start, end);
    if total_weeks <= 0 {
        return if as_of >= start { 100.0 } else { 0.0 };
    }

    let weeks_passed = weeks_between(start, as_of);
    let pct = weeks_passed as f64 / total_weeks as f64 * 100.0;
    pct.clamp(0.0, 100.0)
}

/// Parse a date value as the tracking service reports it.
///
/// Accepts RFC 3339 timestamps (`2024-01-01T00:00:00Z`, with or without
/// fractional seconds or an offset) and bare `YYYY-MM-DD` dates. Returns
/// `None` for anything else.
pub fn parse_service_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc).date_naive());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}
