//! Next-occurrence resolution for weekly reminders.
//!
//! Times are floating local time: no timezone is attached and daylight-saving
//! transitions are not handled. The local date/time fields are used as-is.

use chrono::{Datelike, Duration, Local, NaiveDateTime};

use super::settings::ReminderSettings;
use crate::error::{DataError, DataResult};

/// A weekly pattern always matches within a week.
const MAX_DAY_ADVANCES: u32 = 7;

/// Day number of `dt`, 0 = Sunday.
fn weekday_number(dt: &NaiveDateTime) -> u8 {
    dt.weekday().num_days_from_sunday() as u8
}

/// Next datetime strictly after `now` that falls on one of the selected days
/// at the reminder time. Today's slot is only returned if it is still ahead.
pub fn next_occurrence(settings: &ReminderSettings, now: NaiveDateTime) -> DataResult<NaiveDateTime> {
    settings.validate()?;

    let mut candidate = now.date().and_time(settings.time_of_day());
    if candidate <= now {
        candidate = next_day(candidate)?;
    }

    let mut advances = 0;
    while !settings.days.contains(&weekday_number(&candidate)) {
        if advances == MAX_DAY_ADVANCES {
            return Err(DataError::InvalidSettings(
                "no selected day matched within a week".to_string(),
            ));
        }
        candidate = next_day(candidate)?;
        advances += 1;
    }

    Ok(candidate)
}

fn next_day(candidate: NaiveDateTime) -> DataResult<NaiveDateTime> {
    candidate
        .checked_add_signed(Duration::days(1))
        .ok_or_else(|| DataError::InvalidSettings(format!("no reminder date after {}", candidate)))
}

/// `next_occurrence` against the device's local wall clock.
pub fn next_occurrence_from_local_clock(settings: &ReminderSettings) -> DataResult<NaiveDateTime> {
    next_occurrence(settings, Local::now().naive_local())
}
