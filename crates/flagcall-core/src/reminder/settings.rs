use std::collections::BTreeSet;

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::{DataError, DataResult};

/// Two-letter RFC 5545 weekday codes, indexed by day number (0 = Sunday).
pub const DAY_CODES: [&str; 7] = ["SU", "MO", "TU", "WE", "TH", "FR", "SA"];

/// Weekly reminder pattern chosen by the user.
///
/// Stored as `{"time":"07:00","days":[1]}`. Days are 0..=6 with 0 = Sunday;
/// duplicates collapse because `days` is a set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderSettings {
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    pub days: BTreeSet<u8>,
}

impl Default for ReminderSettings {
    /// Monday 07:00, when the weekly flag ceremony usually takes place.
    fn default() -> Self {
        Self {
            time: NaiveTime::from_hms_opt(7, 0, 0).unwrap_or_default(),
            days: BTreeSet::from([1]),
        }
    }
}

impl ReminderSettings {
    pub fn new(time: NaiveTime, days: impl IntoIterator<Item = u8>) -> Self {
        Self {
            time,
            days: days.into_iter().collect(),
        }
    }

    /// Build settings from a `HH:MM` string and day numbers.
    pub fn parse(time: &str, days: impl IntoIterator<Item = u8>) -> DataResult<Self> {
        Ok(Self::new(parse_time(time)?, days))
    }

    /// Non-empty set of days, each within 0..=6.
    pub fn validate(&self) -> DataResult<()> {
        if self.days.is_empty() {
            return Err(DataError::InvalidSettings(
                "at least one day must be selected".to_string(),
            ));
        }
        if let Some(day) = self.days.iter().find(|&&d| usize::from(d) >= DAY_CODES.len()) {
            return Err(DataError::InvalidSettings(format!(
                "day {} is out of range (0 = Sunday .. 6 = Saturday)",
                day
            )));
        }
        Ok(())
    }

    /// Reminder time with seconds and sub-seconds cleared.
    pub fn time_of_day(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.time.hour(), self.time.minute(), 0).unwrap_or(self.time)
    }

    /// Day codes in SU..SA order, skipping out-of-range days.
    pub fn day_codes(&self) -> Vec<&'static str> {
        self.days
            .iter()
            .filter_map(|&d| DAY_CODES.get(usize::from(d)).copied())
            .collect()
    }
}

/// Parse a `HH:MM` time of day.
pub fn parse_time(value: &str) -> DataResult<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|e| DataError::InvalidSettings(format!("invalid time '{}': {}", value, e)))
}

mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_time(&raw).map_err(serde::de::Error::custom)
    }
}
