//! Week-offset arithmetic
//!
//! Offsets are relative to the ISO week containing "today"; 0 is the current
//! week. The year term uses a flat 52 weeks, matching what the portal
//! expects for its `week` parameter.

use chrono::{Datelike, Duration, NaiveDate};

pub fn week_offset_for(target: NaiveDate, today: NaiveDate) -> i32 {
    let target_week = target.iso_week();
    let today_week = today.iso_week();
    (target_week.year() - today_week.year()) * 52
        + (target_week.week() as i32 - today_week.week() as i32)
}

/// Monday of the week `offset` weeks away from `today`
pub fn monday_for_offset(today: NaiveDate, offset: i32) -> NaiveDate {
    let monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);
    monday + Duration::weeks(offset as i64)
}

/// Offsets of the retention window around `center`
pub fn window(center: i32, radius: i32) -> std::ops::RangeInclusive<i32> {
    (center - radius)..=(center + radius)
}
