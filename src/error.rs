//! Error types surfaced by the logger
//!
//! `write` never reports failures; everything else returns `FileLoggerError`.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while configuring, listing, deleting or exporting logs.
#[derive(Debug, Error)]
pub enum FileLoggerError {
    /// The supplied policy is not usable.
    #[error("invalid logger configuration: {0}")]
    InvalidPolicy(String),

    /// The logs directory or active file could not be created or written.
    #[error("cannot prepare log file {}: {source}", .path.display())]
    Configuration {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A filesystem operation on the logs directory failed.
    #[error("{op} {}: {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The background writer exited before answering.
    #[error("log writer is not running")]
    WriterStopped,

    /// The sharing collaborator rejected the export.
    #[error("failed to share log files: {0}")]
    Share(String),
}

impl FileLoggerError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// Whether this error belongs to the configuration family
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::InvalidPolicy(_) | Self::Configuration { .. })
    }
}

pub type Result<T> = std::result::Result<T, FileLoggerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_message_names_path() {
        let err = FileLoggerError::io(
            "failed to delete",
            "/tmp/logs/app-1.log",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.to_string(), "failed to delete /tmp/logs/app-1.log: denied");
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_configuration_family() {
        assert!(FileLoggerError::InvalidPolicy("x".into()).is_configuration());
        assert!(FileLoggerError::Configuration {
            path: PathBuf::from("/nope"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        }
        .is_configuration());
        assert!(!FileLoggerError::WriterStopped.is_configuration());
    }
}
