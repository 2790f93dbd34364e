//! ICS file generation for the weekly reminder.
//!
//! Output layout is fixed and compared byte for byte in tests. Only newlines
//! in text values are escaped; commas and semicolons are written verbatim.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::recurrence::next_occurrence;
use super::settings::ReminderSettings;
use crate::error::DataResult;

pub const ICS_MIME_TYPE: &str = "text/calendar";
pub const ICS_FILENAME: &str = "flag-ceremony-reminder.ics";

const PRODID: &str = "-//flagcall//Flag Ceremony Reminder//EN";
const UID_PREFIX: &str = "flag-ceremony";
const UID_DOMAIN: &str = "flagcall.app";

/// Length of the reminder event in minutes.
const EVENT_DURATION_MINUTES: i64 = 5;

/// Alarm offsets, minutes before the event start.
const ALARM_MINUTES_BEFORE: [i64; 2] = [0, 5];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Vi,
    En,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::Vi => "vi",
            Language::En => "en",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "vi" => Some(Language::Vi),
            "en" => Some(Language::En),
            _ => None,
        }
    }

    fn summary(&self) -> &'static str {
        match self {
            Language::Vi => "Nhắc nhở chào cờ",
            Language::En => "Flag Ceremony Reminder",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            Language::Vi => "Đã đến giờ chào cờ!\nHãy chuẩn bị đồng phục và có mặt đúng giờ.",
            Language::En => {
                "It's time for the flag ceremony!\nWear your uniform and be there on time."
            }
        }
    }

    fn location(&self) -> &'static str {
        match self {
            Language::Vi => "Sân trường",
            Language::En => "School yard",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// One reminder occurrence, ready to be rendered. Built and discarded per
/// export; nothing but the UID text identifies it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEvent {
    pub uid: String,
    pub dtstamp: DateTime<Utc>,
    pub dtstart: NaiveDateTime,
    pub dtend: NaiveDateTime,
    /// Weekday codes in SU..SA order.
    pub byday: Vec<&'static str>,
    pub alarm_minutes_before: [i64; 2],
}

impl CalendarEvent {
    /// Event starting at `start` and created at `created_at`, which feeds both
    /// the UID and DTSTAMP.
    pub fn new(settings: &ReminderSettings, start: NaiveDateTime, created_at: DateTime<Utc>) -> Self {
        Self {
            uid: format!(
                "{}-{}@{}",
                UID_PREFIX,
                created_at.timestamp_millis(),
                UID_DOMAIN
            ),
            dtstamp: created_at,
            dtstart: start,
            dtend: start
                .checked_add_signed(Duration::minutes(EVENT_DURATION_MINUTES))
                .unwrap_or(NaiveDateTime::MAX),
            byday: settings.day_codes(),
            alarm_minutes_before: ALARM_MINUTES_BEFORE,
        }
    }

    /// Event for the next occurrence after `now`, stamped with a fresh
    /// creation time.
    pub fn next(settings: &ReminderSettings, now: NaiveDateTime) -> DataResult<Self> {
        let start = next_occurrence(settings, now)?;
        Ok(Self::new(settings, start, creation_time()))
    }

    pub fn rrule(&self) -> String {
        format!("FREQ=WEEKLY;BYDAY={}", self.byday.join(","))
    }
}

static LAST_CREATION_MILLIS: AtomicI64 = AtomicI64::new(i64::MIN);

/// Current time at millisecond precision, strictly increasing within the
/// process so that two events never share a UID.
pub fn creation_time() -> DateTime<Utc> {
    let now = Utc::now().timestamp_millis();
    let mut last = LAST_CREATION_MILLIS.load(Ordering::SeqCst);
    loop {
        let next = now.max(last.saturating_add(1));
        match LAST_CREATION_MILLIS.compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => return DateTime::from_timestamp_millis(next).unwrap_or_else(Utc::now),
            Err(actual) => last = actual,
        }
    }
}

fn format_floating(dt: &NaiveDateTime) -> String {
    dt.format("%Y%m%dT%H%M%S").to_string()
}

fn format_utc(dt: &DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Escape newlines as the two characters `\n`. Nothing else is escaped.
fn escape_text(text: &str) -> String {
    text.replace("\r\n", "\\n").replace('\n', "\\n")
}

fn format_trigger(minutes_before: i64) -> String {
    if minutes_before == 0 {
        "PT0M".to_string()
    } else {
        format!("-PT{}M", minutes_before)
    }
}

/// Render `event` as a VCALENDAR with one VEVENT, CRLF line endings.
pub fn generate(event: &CalendarEvent, language: Language) -> String {
    let mut lines: Vec<String> = vec![
        "BEGIN:VCALENDAR".into(),
        "VERSION:2.0".into(),
        format!("PRODID:{}", PRODID),
        "CALSCALE:GREGORIAN".into(),
        "METHOD:PUBLISH".into(),
        "BEGIN:VEVENT".into(),
        format!("UID:{}", event.uid),
        format!("DTSTAMP:{}", format_utc(&event.dtstamp)),
        format!("DTSTART:{}", format_floating(&event.dtstart)),
        format!("DTEND:{}", format_floating(&event.dtend)),
        format!("RRULE:{}", event.rrule()),
        format!("SUMMARY:{}", escape_text(language.summary())),
        format!("DESCRIPTION:{}", escape_text(language.description())),
        format!("LOCATION:{}", escape_text(language.location())),
    ];

    for minutes in event.alarm_minutes_before {
        lines.push("BEGIN:VALARM".into());
        lines.push("ACTION:DISPLAY".into());
        lines.push(format!("DESCRIPTION:{}", escape_text(language.summary())));
        lines.push(format!("TRIGGER:{}", format_trigger(minutes)));
        lines.push("END:VALARM".into());
    }

    lines.push("END:VEVENT".into());
    lines.push("END:VCALENDAR".into());

    let mut output = String::with_capacity(lines.iter().map(|l| l.len() + 2).sum());
    for line in &lines {
        output.push_str(line);
        output.push_str("\r\n");
    }
    output
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn monday_seven() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 8)
            .unwrap()
            .and_hms_opt(7, 0, 0)
            .unwrap()
    }

    fn created() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 7, 12, 30, 45).unwrap()
    }

    #[test]
    fn test_generate_english_exact() {
        let settings = ReminderSettings::parse("07:00", [1, 3, 5]).unwrap();
        let event = CalendarEvent::new(&settings, monday_seven(), created());

        let expected = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:-//flagcall//Flag Ceremony Reminder//EN\r\n\
CALSCALE:GREGORIAN\r\n\
METHOD:PUBLISH\r\n\
BEGIN:VEVENT\r\n\
UID:flag-ceremony-1704630645000@flagcall.app\r\n\
DTSTAMP:20240107T123045Z\r\n\
DTSTART:20240108T070000\r\n\
DTEND:20240108T070500\r\n\
RRULE:FREQ=WEEKLY;BYDAY=MO,WE,FR\r\n\
SUMMARY:Flag Ceremony Reminder\r\n\
DESCRIPTION:It's time for the flag ceremony!\\nWear your uniform and be there on time.\r\n\
LOCATION:School yard\r\n\
BEGIN:VALARM\r\n\
ACTION:DISPLAY\r\n\
DESCRIPTION:Flag Ceremony Reminder\r\n\
TRIGGER:PT0M\r\n\
END:VALARM\r\n\
BEGIN:VALARM\r\n\
ACTION:DISPLAY\r\n\
DESCRIPTION:Flag Ceremony Reminder\r\n\
TRIGGER:-PT5M\r\n\
END:VALARM\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

        assert_eq!(generate(&event, Language::En), expected);
    }

    #[test]
    fn test_generate_vietnamese_text() {
        let settings = ReminderSettings::parse("07:00", [1]).unwrap();
        let event = CalendarEvent::new(&settings, monday_seven(), created());
        let ics = generate(&event, Language::Vi);

        assert!(ics.contains("SUMMARY:Nhắc nhở chào cờ\r\n"));
        assert!(ics.contains(
            "DESCRIPTION:Đã đến giờ chào cờ!\\nHãy chuẩn bị đồng phục và có mặt đúng giờ.\r\n"
        ));
        assert!(ics.contains("LOCATION:Sân trường\r\n"));
        assert!(ics.contains("RRULE:FREQ=WEEKLY;BYDAY=MO\r\n"));
    }

    #[test]
    fn test_byday_follows_week_order() {
        let settings = ReminderSettings::parse("07:00", [6, 0, 3]).unwrap();
        let event = CalendarEvent::new(&settings, monday_seven(), created());
        assert_eq!(event.rrule(), "FREQ=WEEKLY;BYDAY=SU,WE,SA");
    }

    #[test]
    fn test_dtend_crosses_midnight() {
        let settings = ReminderSettings::parse("23:58", [1]).unwrap();
        let start = NaiveDate::from_ymd_opt(2024, 1, 8)
            .unwrap()
            .and_hms_opt(23, 58, 0)
            .unwrap();
        let ics = generate(&CalendarEvent::new(&settings, start, created()), Language::En);
        assert!(ics.contains("DTEND:20240109T000300\r\n"));
    }

    #[test]
    fn test_dtend_stops_at_last_representable_time() {
        let settings = ReminderSettings::parse("23:58", [1]).unwrap();
        let start = NaiveDateTime::MAX - Duration::minutes(2);
        let event = CalendarEvent::new(&settings, start, created());
        assert_eq!(event.dtend, NaiveDateTime::MAX);
    }

    #[test]
    fn test_successive_events_get_distinct_uids() {
        let settings = ReminderSettings::parse("07:00", [1, 3, 5]).unwrap();
        let now = monday_seven() - Duration::hours(1);

        let first = CalendarEvent::next(&settings, now).unwrap();
        let second = CalendarEvent::next(&settings, now).unwrap();

        assert_ne!(first.uid, second.uid);
        assert_eq!(first.dtstart, second.dtstart);

        let a = generate(&first, Language::En);
        let b = generate(&second, Language::En);
        let field = |ics: &str, name: &str| {
            ics.lines()
                .find(|l| l.starts_with(name))
                .map(str::to_string)
        };
        assert_eq!(field(&a, "DTSTART:"), field(&b, "DTSTART:"));
        assert_eq!(field(&a, "RRULE:"), field(&b, "RRULE:"));
        assert_ne!(field(&a, "UID:"), field(&b, "UID:"));
    }

    #[test]
    fn test_creation_time_is_strictly_increasing() {
        let stamps: Vec<_> = (0..50).map(|_| creation_time()).collect();
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_escape_text_only_touches_newlines() {
        assert_eq!(escape_text("a\nb\r\nc"), "a\\nb\\nc");
        assert_eq!(escape_text("one, two; three"), "one, two; three");
    }

    #[test]
    fn test_language_codes() {
        assert_eq!(Language::from_code("vi"), Some(Language::Vi));
        assert_eq!(Language::from_code(" EN "), Some(Language::En));
        assert_eq!(Language::from_code("fr"), None);
        assert_eq!(Language::En.to_string(), "en");
    }
}
