//! Log file listing and retention management
//!
//! Handles discovery of retained log files, their ordering for display, bulk
//! deletion and the count/size caps applied to daily archives.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, info};

use super::policy::{is_log_file_name, LogFileNames};
use crate::error::{FileLoggerError, Result};

/// A retained log file with the metadata used for ordering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFileInfo {
    /// Full path to the log file
    pub path: PathBuf,
    /// Size on disk in bytes
    pub size: u64,
    /// Last modification time
    pub modified: SystemTime,
}

/// List every `.log` / `.log.gz` file in `logs_dir`, in directory order
///
/// An absent directory is treated as empty.
pub fn list_log_files(logs_dir: &Path) -> Result<Vec<LogFileInfo>> {
    let entries = match fs::read_dir(logs_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(FileLoggerError::io("failed to list", logs_dir, e)),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| FileLoggerError::io("failed to list", logs_dir, e))?;
        let path = entry.path();

        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !is_log_file_name(name) {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            // Removed between readdir and stat
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(FileLoggerError::io("failed to stat", &path, e)),
        };
        if !metadata.is_file() {
            continue;
        }

        files.push(LogFileInfo {
            size: metadata.len(),
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            path,
        });
    }

    Ok(files)
}

/// List log files oldest first by modification time, ties broken by path
pub fn list_log_files_sorted(logs_dir: &Path) -> Result<Vec<LogFileInfo>> {
    let mut files = list_log_files(logs_dir)?;
    sort_by_modified(&mut files);
    Ok(files)
}

fn sort_by_modified(files: &mut [LogFileInfo]) {
    files.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));
}

/// Delete every log file in `logs_dir`
///
/// Stops at the first failure; files deleted before it stay deleted.
/// Returns the number of files deleted.
pub fn delete_log_files(logs_dir: &Path) -> Result<usize> {
    let mut deleted_count = 0;

    for file in list_log_files(logs_dir)? {
        match fs::remove_file(&file.path) {
            Ok(()) => deleted_count += 1,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(FileLoggerError::io("failed to delete", &file.path, e)),
        }
    }

    debug!(
        dir = %logs_dir.display(),
        deleted = deleted_count,
        "Deleted log files"
    );
    Ok(deleted_count)
}

/// Evict the oldest daily archives until both caps hold
///
/// Archives are ordered by the date and index in their name. `total_size_cap`
/// of `None` leaves the total size unbounded. Returns the number of files
/// deleted.
pub fn enforce_daily_retention(
    names: &LogFileNames,
    max_history: u32,
    total_size_cap: Option<u64>,
) -> Result<usize> {
    let mut archives: Vec<_> = list_log_files(names.directory())?
        .into_iter()
        .filter_map(|file| {
            let name = file.path.file_name()?.to_str()?;
            let key = names.parse_daily_archive(name)?;
            Some((key, file))
        })
        .collect();
    archives.sort_by(|(a, _), (b, _)| a.cmp(b));

    let mut total: u64 = archives.iter().map(|(_, f)| f.size).sum();
    let max_history = max_history as usize;
    let mut deleted_count = 0;

    for (_, file) in &archives {
        let remaining = archives.len() - deleted_count;
        let over_count = remaining > max_history;
        let over_size = total_size_cap.is_some_and(|cap| total > cap);
        if !over_count && !over_size {
            break;
        }

        match fs::remove_file(&file.path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(FileLoggerError::io("failed to evict", &file.path, e)),
        }
        total -= file.size;
        deleted_count += 1;
        info!(path = %file.path.display(), "Evicted rolled log file");
    }

    Ok(deleted_count)
}
