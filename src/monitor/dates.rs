//! Calendar date inference for bare times of day
//!
//! Log lines carry only `HH:MM:SS`. Files are not rotated at midnight, so a
//! line near midnight could belong to the file's modification date or to
//! the day on either side of it. The file's modification date and the
//! current time decide which one.

use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::constants::{EARLY_MORNING_END_HOUR, LATE_NIGHT_START_HOUR};

/// Pick the calendar date for `time_of_day`.
///
/// Rules, first match wins:
/// 1. early-morning line read during the early morning: today
/// 2. early-morning line in a file touched today, read later in the day: tomorrow
/// 3. late-night line read after midnight from a file not newer than today: yesterday
/// 4. otherwise the file's modification date
pub fn resolve_date(time_of_day: NaiveTime, file_date: NaiveDate, now: NaiveDateTime) -> NaiveDate {
    let today = now.date();
    let line_is_early = time_of_day.hour() < EARLY_MORNING_END_HOUR;
    let now_is_early = now.hour() < EARLY_MORNING_END_HOUR;

    if line_is_early && now_is_early {
        return today;
    }

    if line_is_early && file_date == today {
        return today.checked_add_days(Days::new(1)).unwrap_or(today);
    }

    if time_of_day.hour() >= LATE_NIGHT_START_HOUR && now_is_early && file_date <= today {
        return today.checked_sub_days(Days::new(1)).unwrap_or(today);
    }

    file_date
}

/// Pair a time of day with its inferred date
pub fn resolve_timestamp(time_of_day: NaiveTime, file_modified: NaiveDateTime, now: NaiveDateTime) -> NaiveDateTime {
    resolve_date(time_of_day, file_modified.date(), now).and_time(time_of_day)
}
