use thiserror::Error;

/// Errors surfaced by the local data layer.
///
/// `Clone` because a single in-flight load hands the same error to every
/// caller that joined it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataError {
    #[error("Failed to load '{key}': {message}")]
    LoadFailure { key: String, message: String },

    #[error("Failed to write '{key}': {message}")]
    WriteFailure { key: String, message: String },

    #[error("Invalid reminder settings: {0}")]
    InvalidSettings(String),

    #[error("Export failed: {0}")]
    ExportFailure(String),
}

impl DataError {
    pub fn load(key: &str, message: impl ToString) -> Self {
        DataError::LoadFailure {
            key: key.to_string(),
            message: message.to_string(),
        }
    }

    pub fn write(key: &str, message: impl ToString) -> Self {
        DataError::WriteFailure {
            key: key.to_string(),
            message: message.to_string(),
        }
    }

    /// True for runtime I/O failures the UI is expected to recover from.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, DataError::InvalidSettings(_))
    }
}

/// Errors raised by a storage adapter.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

pub type DataResult<T> = Result<T, DataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_include_key() {
        let err = DataError::load("progress", "disk on fire");
        assert_eq!(err.to_string(), "Failed to load 'progress': disk on fire");

        let err = DataError::write("settings", StoreError::Backend("quota".into()));
        assert_eq!(
            err.to_string(),
            "Failed to write 'settings': Storage backend error: quota"
        );
    }

    #[test]
    fn test_only_invalid_settings_is_fatal() {
        assert!(DataError::load("k", "x").is_recoverable());
        assert!(DataError::write("k", "x").is_recoverable());
        assert!(DataError::ExportFailure("x".into()).is_recoverable());
        assert!(!DataError::InvalidSettings("no days".into()).is_recoverable());
    }
}
