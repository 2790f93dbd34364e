//! Weekly flag-ceremony reminders.
//!
//! This module provides:
//! - `ReminderSettings`: the user's time of day and weekdays
//! - `next_occurrence`: the next datetime matching those settings
//! - `generate`: RFC 5545 calendar text for a `CalendarEvent`
//! - `export_reminder`: the above, handed to an `ExportTransport`

pub mod export;
pub mod ics;
pub mod recurrence;
pub mod settings;

pub use export::{deliver_export, export_reminder, ExportTransport, FileTransport};
pub use ics::{creation_time, generate, CalendarEvent, Language, ICS_FILENAME, ICS_MIME_TYPE};
pub use recurrence::{next_occurrence, next_occurrence_from_local_clock};
pub use settings::{parse_time, ReminderSettings, DAY_CODES};

/// Storage key the reminder settings are saved under.
pub const SETTINGS_KEY: &str = "reminder_settings";
