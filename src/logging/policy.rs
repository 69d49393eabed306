//! Rollover policy and log file naming

use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};

use crate::error::{FileLoggerError, Result};

/// Suffix of plain log files
pub const LOG_SUFFIX: &str = ".log";

/// Suffix of compressed daily archives
pub const GZ_SUFFIX: &str = ".log.gz";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// How and when the writer rolls the active file over
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPolicy {
    /// Directory holding the active and rolled files
    pub directory: PathBuf,
    /// Prefix of every file name, usually the application identifier
    pub file_prefix: String,
    /// Roll on calendar day change and compress rolled files
    pub daily_rolling: bool,
    /// Size threshold in bytes; 0 disables size-based rollover
    pub max_file_size: u64,
    /// Retention cap on rolled files
    pub max_retained_files: u32,
}

/// Rotation scheme derived from a policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloverScheme {
    /// Date-keyed gzip archives, secondarily split by size
    Daily {
        max_file_size: Option<u64>,
        max_history: u32,
        total_size_cap: Option<u64>,
    },
    /// Numbered files `1..=max_index`, shifted on every rollover
    FixedWindow { max_file_size: u64, max_index: u32 },
    /// The active file grows without bound
    Unbounded,
}

impl LogPolicy {
    /// Check the policy is usable before any filesystem work
    pub fn validate(&self) -> Result<()> {
        if self.max_retained_files == 0 {
            return Err(FileLoggerError::InvalidPolicy(
                "maximum number of files must be at least 1".to_string(),
            ));
        }
        if self.file_prefix.is_empty() {
            return Err(FileLoggerError::InvalidPolicy(
                "file prefix must not be empty".to_string(),
            ));
        }
        if self.file_prefix.contains(['/', '\\']) {
            return Err(FileLoggerError::InvalidPolicy(format!(
                "file prefix '{}' must not contain path separators",
                self.file_prefix
            )));
        }
        Ok(())
    }

    pub fn scheme(&self) -> RolloverScheme {
        if self.daily_rolling {
            let max_file_size = (self.max_file_size > 0).then_some(self.max_file_size);
            RolloverScheme::Daily {
                max_file_size,
                max_history: self.max_retained_files,
                total_size_cap: max_file_size
                    .map(|size| size.saturating_mul(u64::from(self.max_retained_files))),
            }
        } else if self.max_file_size > 0 {
            RolloverScheme::FixedWindow {
                max_file_size: self.max_file_size,
                max_index: self.max_retained_files,
            }
        } else {
            RolloverScheme::Unbounded
        }
    }

    pub fn names(&self) -> LogFileNames {
        LogFileNames::new(&self.directory, &self.file_prefix)
    }
}

impl RolloverScheme {
    /// Size threshold, if size-based rollover is active
    pub fn max_file_size(&self) -> Option<u64> {
        match self {
            RolloverScheme::Daily { max_file_size, .. } => *max_file_size,
            RolloverScheme::FixedWindow { max_file_size, .. } => Some(*max_file_size),
            RolloverScheme::Unbounded => None,
        }
    }
}

/// File names for one directory and prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFileNames {
    directory: PathBuf,
    prefix: String,
}

impl LogFileNames {
    pub fn new(directory: &Path, prefix: &str) -> Self {
        Self {
            directory: directory.to_path_buf(),
            prefix: prefix.to_string(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// `<prefix>-latest.log`
    pub fn active(&self) -> PathBuf {
        self.directory.join(format!("{}-latest{}", self.prefix, LOG_SUFFIX))
    }

    /// `<prefix>-<index>.log`
    pub fn window(&self, index: u32) -> PathBuf {
        self.directory
            .join(format!("{}-{}{}", self.prefix, index, LOG_SUFFIX))
    }

    /// `<prefix>-<yyyy-MM-dd>.<index>.log.gz`
    pub fn daily_archive(&self, date: NaiveDate, index: u32) -> PathBuf {
        self.directory.join(format!(
            "{}-{}.{}{}",
            self.prefix,
            date.format(DATE_FORMAT),
            index,
            GZ_SUFFIX
        ))
    }

    /// Parse a fixed-window file name back into its index
    pub fn parse_window(&self, file_name: &str) -> Option<u32> {
        let index = file_name
            .strip_prefix(self.prefix.as_str())?
            .strip_prefix('-')?
            .strip_suffix(LOG_SUFFIX)?;
        if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        index.parse().ok().filter(|index| *index > 0)
    }

    /// Parse a daily archive file name back into its date and index
    pub fn parse_daily_archive(&self, file_name: &str) -> Option<(NaiveDate, u32)> {
        let rest = file_name
            .strip_prefix(self.prefix.as_str())?
            .strip_prefix('-')?
            .strip_suffix(GZ_SUFFIX)?;
        let (date, index) = rest.rsplit_once('.')?;
        let date = NaiveDate::parse_from_str(date, DATE_FORMAT).ok()?;
        if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some((date, index.parse().ok()?))
    }
}

/// Whether a file name belongs to the managed set (`.log` or `.log.gz`)
pub fn is_log_file_name(name: &str) -> bool {
    name.ends_with(LOG_SUFFIX) || name.ends_with(GZ_SUFFIX)
}

/// Source of the current calendar date for daily rollover
pub trait Clock: Send + Sync + 'static {
    fn today(&self) -> NaiveDate;
}

/// Local wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}
