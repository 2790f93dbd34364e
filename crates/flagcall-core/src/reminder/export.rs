use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use tracing::{info, warn};

use super::ics::{generate, CalendarEvent, Language, ICS_FILENAME, ICS_MIME_TYPE};
use super::settings::ReminderSettings;
use crate::error::{DataError, DataResult};

/// Hands generated file content to the platform (download, share sheet,
/// file on disk).
pub trait ExportTransport {
    fn deliver(&self, content: &str, filename: &str, mime_type: &str) -> Result<()>;

    /// Whether delivery can be attempted at all on this platform.
    fn is_available(&self) -> bool {
        true
    }
}

/// Writes exports into a directory, replacing any previous file.
#[derive(Debug, Clone)]
pub struct FileTransport {
    export_dir: PathBuf,
}

impl FileTransport {
    pub fn new(export_dir: PathBuf) -> Self {
        Self { export_dir }
    }

    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.export_dir.join(filename)
    }
}

impl ExportTransport for FileTransport {
    fn deliver(&self, content: &str, filename: &str, _mime_type: &str) -> Result<()> {
        std::fs::create_dir_all(&self.export_dir).with_context(|| {
            format!("Failed to create export directory: {}", self.export_dir.display())
        })?;
        let path = self.path_for(filename);
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write export file: {}", path.display()))?;
        info!(path = %path.display(), "Exported file");
        Ok(())
    }
}

/// Deliver `content`, reporting failure as `false` instead of an error.
pub fn deliver_export(
    transport: &dyn ExportTransport,
    content: &str,
    filename: &str,
    mime_type: &str,
) -> bool {
    let outcome = if transport.is_available() {
        transport
            .deliver(content, filename, mime_type)
            .map_err(|e| DataError::ExportFailure(format!("{:#}", e)))
    } else {
        Err(DataError::ExportFailure("transport unavailable".to_string()))
    };

    match outcome {
        Ok(()) => true,
        Err(e) => {
            warn!(filename, error = %e, "Export not delivered");
            false
        }
    }
}

/// Resolve the next reminder after `now`, render it and deliver it.
///
/// Invalid settings are returned as an error; delivery problems only turn the
/// result into `Ok(false)`.
pub fn export_reminder(
    transport: &dyn ExportTransport,
    settings: &ReminderSettings,
    language: Language,
    now: NaiveDateTime,
) -> DataResult<bool> {
    let event = CalendarEvent::next(settings, now)?;
    let content = generate(&event, language);
    Ok(deliver_export(transport, &content, ICS_FILENAME, ICS_MIME_TYPE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use chrono::NaiveDate;

    #[derive(Default)]
    struct RecordingTransport {
        delivered: RefCell<Vec<(String, String, String)>>,
        fail: bool,
        available: bool,
    }

    impl RecordingTransport {
        fn working() -> Self {
            Self {
                available: true,
                ..Self::default()
            }
        }
    }

    impl ExportTransport for RecordingTransport {
        fn deliver(&self, content: &str, filename: &str, mime_type: &str) -> Result<()> {
            if self.fail {
                anyhow::bail!("share sheet dismissed");
            }
            self.delivered.borrow_mut().push((
                content.to_string(),
                filename.to_string(),
                mime_type.to_string(),
            ));
            Ok(())
        }

        fn is_available(&self) -> bool {
            self.available
        }
    }

    fn sunday_noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 7)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_export_reminder_delivers_calendar() {
        let transport = RecordingTransport::working();
        let settings = ReminderSettings::parse("07:00", [1]).unwrap();

        let delivered = export_reminder(&transport, &settings, Language::En, sunday_noon()).unwrap();
        assert!(delivered);

        let calls = transport.delivered.borrow();
        assert_eq!(calls.len(), 1);
        let (content, filename, mime) = &calls[0];
        assert_eq!(filename, "flag-ceremony-reminder.ics");
        assert_eq!(mime, "text/calendar");
        assert!(content.contains("DTSTART:20240108T070000\r\n"));
    }

    #[test]
    fn test_transport_errors_become_false() {
        let transport = RecordingTransport {
            fail: true,
            ..RecordingTransport::working()
        };
        let settings = ReminderSettings::parse("07:00", [1]).unwrap();
        assert_eq!(
            export_reminder(&transport, &settings, Language::Vi, sunday_noon()),
            Ok(false)
        );
    }

    #[test]
    fn test_unavailable_transport_is_not_called() {
        let transport = RecordingTransport::default();
        assert!(!deliver_export(&transport, "x", "a.ics", ICS_MIME_TYPE));
        assert!(transport.delivered.borrow().is_empty());
    }

    #[test]
    fn test_invalid_settings_are_not_swallowed() {
        let transport = RecordingTransport::working();
        let settings = ReminderSettings::parse("07:00", []).unwrap();
        let result = export_reminder(&transport, &settings, Language::En, sunday_noon());
        assert!(matches!(result, Err(DataError::InvalidSettings(_))));
        assert!(transport.delivered.borrow().is_empty());
    }

    #[test]
    fn test_file_transport_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FileTransport::new(dir.path().join("exports"));

        assert!(deliver_export(&transport, "BEGIN:VCALENDAR\r\n", ICS_FILENAME, ICS_MIME_TYPE));
        let written = std::fs::read_to_string(transport.path_for(ICS_FILENAME)).unwrap();
        assert_eq!(written, "BEGIN:VCALENDAR\r\n");
    }

    #[test]
    fn test_file_transport_failure_is_reported_as_false() {
        let dir = tempfile::tempdir().unwrap();
        // A file where the export directory should be
        let blocker = dir.path().join("exports");
        std::fs::write(&blocker, "not a directory").unwrap();

        let transport = FileTransport::new(blocker);
        assert!(!deliver_export(&transport, "x", ICS_FILENAME, ICS_MIME_TYPE));
    }
}
