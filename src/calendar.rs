use crate::error::EngineError;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use log::warn;
use std::collections::BTreeMap;

const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Monday-Friday dates from `start` to `end` inclusive. No holiday calendar is applied.
pub fn build_calendar(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    if end < start {
        return Vec::new();
    }

    start
        .iter_days()
        .take_while(|date| *date <= end)
        .filter(|date| is_business_day(*date))
        .collect()
}

/// Parses a date cell and drops any time-of-day or zone suffix, keeping the date as written.
pub fn normalize_date(raw: &str) -> Result<NaiveDate, EngineError> {
    let trimmed = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, DATE_FORMAT) {
        return Ok(date);
    }

    let has_time_suffix = trimmed
        .chars()
        .nth(10)
        .map(|c| c == ' ' || c == 'T')
        .unwrap_or(false);
    if has_time_suffix {
        if let Some(prefix) = trimmed.get(..10) {
            if let Ok(date) = NaiveDate::parse_from_str(prefix, DATE_FORMAT) {
                return Ok(date);
            }
        }
    }

    Err(EngineError::InvalidDate(raw.to_string()))
}

/// Friday that closes the Monday-Friday week containing `date`.
pub fn week_ending_friday(date: NaiveDate) -> NaiveDate {
    let weekday = date.weekday().num_days_from_monday() as i64;
    let days_to_friday = (4 + 7 - weekday) % 7;
    date + Duration::days(days_to_friday)
}

/// Left-joins sparse per-date values onto `calendar`. Dates missing from `sparse` get a
/// clone of `fill`; entries dated outside the calendar are discarded. The output always
/// has one entry per calendar date.
pub fn align<T: Clone>(
    sparse: Vec<(NaiveDate, T)>,
    calendar: &[NaiveDate],
    fill: T,
) -> Vec<(NaiveDate, T)> {
    let mut by_date: BTreeMap<NaiveDate, T> = BTreeMap::new();
    for (date, value) in sparse {
        by_date.entry(date).or_insert(value);
    }

    let aligned: Vec<(NaiveDate, T)> = calendar
        .iter()
        .map(|date| {
            let value = by_date.remove(date).unwrap_or_else(|| fill.clone());
            (*date, value)
        })
        .collect();

    if !by_date.is_empty() {
        warn!(
            "Discarded {} date(s) outside the business-day calendar (first: {})",
            by_date.len(),
            by_date
                .keys()
                .next()
                .map(|date| date.format(DATE_FORMAT).to_string())
                .unwrap_or_default()
        );
    }

    aligned
}
