//! Host-facing facade
//!
//! Mirrors the method surface a host application bridge calls: option
//! dictionaries in, integer level codes, path strings out.

use std::path::PathBuf;

use tracing::debug;

use crate::config::{ConfigureOptions, DEFAULT_APP_ID};
use crate::error::Result;
use crate::export::{ShareRequest, ShareTarget};
use crate::logging::{LogLevel, RotatingLogWriter};

/// File logger bound to one application identifier
pub struct FileLogger {
    app_id: String,
    writer: RotatingLogWriter,
}

impl Default for FileLogger {
    fn default() -> Self {
        Self::new(DEFAULT_APP_ID)
    }
}

impl FileLogger {
    pub fn new(app_id: impl Into<String>) -> Self {
        Self::with_writer(app_id, RotatingLogWriter::new())
    }

    /// Use a preconfigured writer (custom clock or queue capacity)
    pub fn with_writer(app_id: impl Into<String>, writer: RotatingLogWriter) -> Self {
        Self {
            app_id: app_id.into(),
            writer,
        }
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn writer(&self) -> &RotatingLogWriter {
        &self.writer
    }

    pub fn configure(&self, options: &ConfigureOptions) -> Result<()> {
        self.writer.configure(options.to_policy(&self.app_id))
    }

    /// Write a message with a bridge level code; unknown codes are ignored
    pub fn write(&self, level: i32, message: impl Into<String>) {
        match LogLevel::from_code(level) {
            Some(level) => self.writer.write(level, message),
            None => debug!(code = level, "Ignoring message with unknown level code"),
        }
    }

    /// Absolute paths of retained log files, oldest first
    pub fn get_log_file_paths(&self) -> Result<Vec<String>> {
        Ok(self
            .writer
            .list_retained_files()?
            .into_iter()
            .map(|file| absolute(file.path).to_string_lossy().into_owned())
            .collect())
    }

    /// Delete every log file and restart with the last configuration
    pub async fn delete_log_files(&self) -> Result<()> {
        self.writer.delete_all().await.map(|_| ())
    }

    /// Hand every retained file to `target` with optional email metadata
    pub async fn send_log_files_by_email(
        &self,
        request: &ShareRequest,
        target: &dyn ShareTarget,
    ) -> Result<()> {
        // Make sure the share sees everything written so far
        self.writer.flush().await?;

        let files: Vec<PathBuf> = self
            .writer
            .list_retained_files_unsorted()?
            .into_iter()
            .map(|file| absolute(file.path))
            .collect();

        debug!(count = files.len(), "Sharing log files");
        target.share(request, &files)
    }
}

fn absolute(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(&path))
        .unwrap_or(path)
}
