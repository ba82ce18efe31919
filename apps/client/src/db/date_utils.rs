//! Date utilities for daily reset hour handling.

use chrono::{Duration, Local, NaiveDate, NaiveDateTime, Timelike};

/// Get adjusted "today" based on daily_reset_hour.
///
/// If the current hour is before the reset hour, "today" is actually "yesterday"
/// from a study perspective. This allows users to study late at night and have
/// it count towards the previous day.
///
/// # Arguments
/// * `daily_reset_hour` - Hour of day (0-23) when a new "study day" begins
pub fn get_adjusted_today(daily_reset_hour: u32) -> NaiveDate {
    adjusted_day(Local::now().naive_local(), daily_reset_hour)
}

/// Study day that `now` (local wall-clock time) belongs to.
pub fn adjusted_day(now: NaiveDateTime, daily_reset_hour: u32) -> NaiveDate {
    if now.hour() < daily_reset_hour {
        (now - Duration::days(1)).date()
    } else {
        now.date()
    }
}
