//! Rotation state machine
//!
//! `Roller` owns the active file and applies entries one at a time. It is
//! driven exclusively by the writer's worker thread.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, ErrorKind, Write};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate};
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{debug, info};

use super::level::LogEntry;
use super::policy::{Clock, LogFileNames, LogPolicy, RolloverScheme};
use super::retention::{delete_log_files, enforce_daily_retention};
use crate::error::{FileLoggerError, Result};

/// The file currently receiving writes
#[derive(Debug)]
struct ActiveFile {
    file: File,
    size: u64,
    /// Calendar day the content belongs to
    day: NaiveDate,
}

impl ActiveFile {
    fn open(path: &Path, clock: &dyn Clock) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let metadata = file.metadata()?;
        let size = metadata.len();

        // A file left over from an earlier run belongs to the day it was last written
        let day = if size > 0 {
            metadata
                .modified()
                .map(|modified| DateTime::<Local>::from(modified).date_naive())
                .unwrap_or_else(|_| clock.today())
        } else {
            clock.today()
        };

        Ok(Self { file, size, day })
    }

    fn append(&mut self, line: &[u8]) -> io::Result<()> {
        self.file.write_all(line)?;
        self.size += line.len() as u64;
        Ok(())
    }
}

/// Applies entries to the active file and rolls it over per policy
pub(crate) struct Roller {
    names: LogFileNames,
    scheme: RolloverScheme,
    clock: Arc<dyn Clock>,
    active: Option<ActiveFile>,
}

impl Roller {
    /// Open the active file for `policy`
    ///
    /// The directory must already exist.
    pub(crate) fn open(policy: &LogPolicy, clock: Arc<dyn Clock>) -> Result<Self> {
        let names = policy.names();
        let active_path = names.active();
        let active = ActiveFile::open(&active_path, clock.as_ref()).map_err(|source| {
            FileLoggerError::Configuration {
                path: active_path,
                source,
            }
        })?;

        Ok(Self {
            names,
            scheme: policy.scheme(),
            clock,
            active: Some(active),
        })
    }

    /// Append one entry, rolling over first if it would cross a boundary
    pub(crate) fn append(&mut self, entry: &LogEntry) -> Result<()> {
        let line = entry.line();
        let len = line.len() as u64;

        if self.active.is_none() {
            self.reopen()?;
        }
        if self.needs_rollover(len) {
            self.roll_over()?;
        }

        let path = self.names.active();
        let Some(active) = self.active.as_mut() else {
            let closed = io::Error::new(ErrorKind::NotFound, "active log file is closed");
            return Err(FileLoggerError::io("failed to append to", path, closed));
        };
        active
            .append(line.as_bytes())
            .map_err(|e| FileLoggerError::io("failed to append to", path, e))
    }

    pub(crate) fn flush(&mut self) -> Result<()> {
        match self.active.as_mut() {
            Some(active) => active
                .file
                .flush()
                .map_err(|e| FileLoggerError::io("failed to flush", self.names.active(), e)),
            None => Ok(()),
        }
    }

    /// Close the active file, delete every log file, start a fresh active file
    pub(crate) fn delete_all(&mut self) -> Result<usize> {
        self.active = None;
        let deleted = delete_log_files(self.names.directory());
        // Keep the worker usable whatever the outcome
        if let Err(e) = self.reopen() {
            tracing::warn!(error = %e, "Failed to reopen active log file after deletion");
        }
        deleted
    }

    fn reopen(&mut self) -> Result<()> {
        let path = self.names.active();
        let active = ActiveFile::open(&path, self.clock.as_ref())
            .map_err(|e| FileLoggerError::io("failed to open", path, e))?;
        self.active = Some(active);
        Ok(())
    }

    fn needs_rollover(&mut self, incoming: u64) -> bool {
        let today = self.clock.today();
        let scheme = self.scheme;
        let Some(active) = self.active.as_mut() else {
            return false;
        };

        // An empty file is never rolled; it simply moves to the new day
        if active.size == 0 {
            active.day = today;
            return false;
        }

        if matches!(scheme, RolloverScheme::Daily { .. }) && active.day != today {
            return true;
        }

        scheme
            .max_file_size()
            .is_some_and(|max| active.size + incoming > max)
    }

    fn roll_over(&mut self) -> Result<()> {
        let Some(active) = self.active.take() else {
            return Ok(());
        };
        let day = active.day;
        drop(active);

        match self.scheme {
            RolloverScheme::FixedWindow { max_index, .. } => self.shift_window(max_index)?,
            RolloverScheme::Daily {
                max_history,
                total_size_cap,
                ..
            } => {
                self.archive_day(day)?;
                enforce_daily_retention(&self.names, max_history, total_size_cap)?;
            }
            RolloverScheme::Unbounded => {}
        }

        self.reopen()
    }

    /// Drop the highest index, shift the rest up by one, move the active file to 1
    ///
    /// Only indices present on disk are touched, highest first so every
    /// rename lands on a free slot.
    fn shift_window(&self, max_index: u32) -> Result<()> {
        let mut indices = self.window_indices()?;
        indices.sort_unstable_by(|a, b| b.cmp(a));

        for index in indices {
            let from = self.names.window(index);
            if index >= max_index {
                remove_if_exists(&from)?;
            } else {
                rename_if_exists(&from, &self.names.window(index + 1))?;
            }
        }

        let active = self.names.active();
        let first = self.names.window(1);
        fs::rename(&active, &first)
            .map_err(|e| FileLoggerError::io("failed to roll over", &active, e))?;

        info!(path = %first.display(), "Rolled over log file");
        Ok(())
    }

    fn window_indices(&self) -> Result<Vec<u32>> {
        let dir = self.names.directory();
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(FileLoggerError::io("failed to list", dir, e)),
        };

        Ok(entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| self.names.parse_window(entry.file_name().to_str()?))
            .collect())
    }

    /// Compress the active file into the next archive slot for `day`
    fn archive_day(&self, day: NaiveDate) -> Result<()> {
        let index = self.next_archive_index(day)?;
        let target = self.names.daily_archive(day, index);
        let active = self.names.active();

        compress(&active, &target)
            .map_err(|e| FileLoggerError::io("failed to compress", &target, e))?;
        fs::remove_file(&active)
            .map_err(|e| FileLoggerError::io("failed to remove", &active, e))?;

        info!(path = %target.display(), "Rolled over log file");
        Ok(())
    }

    fn next_archive_index(&self, day: NaiveDate) -> Result<u32> {
        let dir = self.names.directory();
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(FileLoggerError::io("failed to list", dir, e)),
        };

        let next = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name();
                self.names.parse_daily_archive(name.to_str()?)
            })
            .filter(|(date, _)| *date == day)
            .map(|(_, index)| index + 1)
            .max()
            .unwrap_or(0);

        Ok(next)
    }
}

fn compress(source: &Path, target: &Path) -> io::Result<()> {
    let mut reader = BufReader::new(File::open(source)?);
    let mut encoder = GzEncoder::new(File::create(target)?, Compression::default());
    io::copy(&mut reader, &mut encoder)?;
    encoder.finish()?.sync_all()?;
    debug!(source = %source.display(), target = %target.display(), "Compressed log file");
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "Dropped oldest log file");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(FileLoggerError::io("failed to remove", path, e)),
    }
}

fn rename_if_exists(from: &Path, to: &Path) -> Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(FileLoggerError::io("failed to rename", from, e)),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::logging::level::LogLevel;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Clock whose date only moves when told to
    pub(crate) struct ManualClock(Mutex<NaiveDate>);

    impl ManualClock {
        pub(crate) fn new(date: NaiveDate) -> Arc<Self> {
            Arc::new(Self(Mutex::new(date)))
        }

        pub(crate) fn advance_days(&self, days: u64) {
            let mut date = self.0.lock().unwrap();
            *date = *date + chrono::Days::new(days);
        }
    }

    impl Clock for ManualClock {
        fn today(&self) -> NaiveDate {
            *self.0.lock().unwrap()
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn policy(dir: &Path, daily_rolling: bool, max_file_size: u64, max: u32) -> LogPolicy {
        LogPolicy {
            directory: dir.to_path_buf(),
            file_prefix: "app".to_string(),
            daily_rolling,
            max_file_size,
            max_retained_files: max,
        }
    }

    fn entry(message: &str) -> LogEntry {
        LogEntry::new(LogLevel::Info, message)
    }

    fn gunzip(path: &Path) -> String {
        let mut out = String::new();
        GzDecoder::new(File::open(path).unwrap())
            .read_to_string(&mut out)
            .unwrap();
        out
    }

    #[test]
    fn test_unbounded_never_rolls() {
        let temp_dir = TempDir::new().unwrap();
        let policy = policy(temp_dir.path(), false, 0, 1);
        let mut roller = Roller::open(&policy, ManualClock::new(day(1))).unwrap();

        for i in 0..100 {
            roller.append(&entry(&format!("line {i}"))).unwrap();
        }

        let files: Vec<_> = fs::read_dir(temp_dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
        let content = fs::read_to_string(policy.names().active()).unwrap();
        assert_eq!(content.lines().count(), 100);
    }

    #[test]
    fn test_fixed_window_numbering() {
        let temp_dir = TempDir::new().unwrap();
        let policy = policy(temp_dir.path(), false, 10, 3);
        let names = policy.names();
        let mut roller = Roller::open(&policy, ManualClock::new(day(1))).unwrap();

        // Each line is 10 bytes, so every append after the first rolls over
        for msg in ["aaaaaaaaa", "bbbbbbbbb", "ccccccccc"] {
            roller.append(&entry(msg)).unwrap();
        }

        assert_eq!(fs::read_to_string(names.window(1)).unwrap(), "bbbbbbbbb\n");
        assert_eq!(fs::read_to_string(names.window(2)).unwrap(), "aaaaaaaaa\n");
        assert!(!names.window(3).exists());
        assert_eq!(fs::read_to_string(names.active()).unwrap(), "ccccccccc\n");
    }

    #[test]
    fn test_fixed_window_evicts_oldest() {
        let temp_dir = TempDir::new().unwrap();
        let policy = policy(temp_dir.path(), false, 10, 2);
        let names = policy.names();
        let mut roller = Roller::open(&policy, ManualClock::new(day(1))).unwrap();

        for i in 0..6 {
            roller.append(&entry(&format!("message{i}"))).unwrap();
        }

        let count = fs::read_dir(temp_dir.path()).unwrap().count();
        assert_eq!(count, 3);
        assert_eq!(fs::read_to_string(names.active()).unwrap(), "message5\n");
        assert_eq!(fs::read_to_string(names.window(1)).unwrap(), "message4\n");
        assert_eq!(fs::read_to_string(names.window(2)).unwrap(), "message3\n");
    }

    #[test]
    fn test_fixed_window_shifts_only_existing_indices() {
        let temp_dir = TempDir::new().unwrap();
        let policy = policy(temp_dir.path(), false, 10, 1_000_000);
        let names = policy.names();
        fs::write(names.window(1), "one\n").unwrap();
        fs::write(names.window(7), "seven\n").unwrap();
        fs::write(names.window(1_000_000), "last\n").unwrap();
        let mut roller = Roller::open(&policy, ManualClock::new(day(1))).unwrap();

        roller.append(&entry("aaaaaaaaa")).unwrap();
        roller.append(&entry("bbbbbbbbb")).unwrap();

        assert_eq!(fs::read_to_string(names.window(1)).unwrap(), "aaaaaaaaa\n");
        assert_eq!(fs::read_to_string(names.window(2)).unwrap(), "one\n");
        assert_eq!(fs::read_to_string(names.window(8)).unwrap(), "seven\n");
        assert!(!names.window(7).exists());
        assert!(!names.window(1_000_000).exists());
        assert_eq!(fs::read_to_string(names.active()).unwrap(), "bbbbbbbbb\n");
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 4);
    }

    #[test]
    fn test_fixed_window_drops_indices_beyond_a_smaller_cap() {
        let temp_dir = TempDir::new().unwrap();
        let policy = policy(temp_dir.path(), false, 10, 2);
        let names = policy.names();
        fs::write(names.window(5), "stale\n").unwrap();
        let mut roller = Roller::open(&policy, ManualClock::new(day(1))).unwrap();

        roller.append(&entry("aaaaaaaaa")).unwrap();
        roller.append(&entry("bbbbbbbbb")).unwrap();

        assert!(!names.window(5).exists());
        assert_eq!(fs::read_to_string(names.window(1)).unwrap(), "aaaaaaaaa\n");
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_oversized_line_gets_its_own_file() {
        let temp_dir = TempDir::new().unwrap();
        let policy = policy(temp_dir.path(), false, 8, 3);
        let names = policy.names();
        let mut roller = Roller::open(&policy, ManualClock::new(day(1))).unwrap();

        roller.append(&entry("a very long line indeed")).unwrap();
        roller.append(&entry("x")).unwrap();

        assert_eq!(
            fs::read_to_string(names.window(1)).unwrap(),
            "a very long line indeed\n"
        );
        assert_eq!(fs::read_to_string(names.active()).unwrap(), "x\n");
    }

    #[test]
    fn test_daily_rolls_on_day_change() {
        let temp_dir = TempDir::new().unwrap();
        let policy = policy(temp_dir.path(), true, 0, 5);
        let names = policy.names();
        let clock = ManualClock::new(day(1));
        let mut roller = Roller::open(&policy, clock.clone()).unwrap();

        roller.append(&entry("first day")).unwrap();
        clock.advance_days(1);
        roller.append(&entry("second day")).unwrap();

        let archive = names.daily_archive(day(1), 0);
        assert_eq!(gunzip(&archive), "first day\n");
        assert_eq!(fs::read_to_string(names.active()).unwrap(), "second day\n");
    }

    #[test]
    fn test_daily_rolls_on_size_within_a_day() {
        let temp_dir = TempDir::new().unwrap();
        let policy = policy(temp_dir.path(), true, 10, 5);
        let names = policy.names();
        let mut roller = Roller::open(&policy, ManualClock::new(day(3))).unwrap();

        for msg in ["111111111", "222222222", "333333333"] {
            roller.append(&entry(msg)).unwrap();
        }

        assert_eq!(gunzip(&names.daily_archive(day(3), 0)), "111111111\n");
        assert_eq!(gunzip(&names.daily_archive(day(3), 1)), "222222222\n");
        assert_eq!(fs::read_to_string(names.active()).unwrap(), "333333333\n");
    }

    #[test]
    fn test_daily_index_resets_per_day() {
        let temp_dir = TempDir::new().unwrap();
        let policy = policy(temp_dir.path(), true, 10, 10);
        let names = policy.names();
        let clock = ManualClock::new(day(1));
        let mut roller = Roller::open(&policy, clock.clone()).unwrap();

        roller.append(&entry("aaaaaaaaa")).unwrap();
        roller.append(&entry("bbbbbbbbb")).unwrap();
        clock.advance_days(1);
        roller.append(&entry("ccccccccc")).unwrap();
        roller.append(&entry("ddddddddd")).unwrap();

        assert!(names.daily_archive(day(1), 0).exists());
        assert!(names.daily_archive(day(1), 1).exists());
        assert_eq!(gunzip(&names.daily_archive(day(2), 0)), "ccccccccc\n");
    }

    #[test]
    fn test_daily_retention_count_cap() {
        let temp_dir = TempDir::new().unwrap();
        let policy = policy(temp_dir.path(), true, 0, 2);
        let names = policy.names();
        let clock = ManualClock::new(day(1));
        let mut roller = Roller::open(&policy, clock.clone()).unwrap();

        for i in 0..5 {
            roller.append(&entry(&format!("day {i}"))).unwrap();
            clock.advance_days(1);
        }
        roller.append(&entry("today")).unwrap();

        assert!(!names.daily_archive(day(3), 0).exists());
        assert!(names.daily_archive(day(4), 0).exists());
        assert!(names.daily_archive(day(5), 0).exists());
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 3);
    }

    #[test]
    fn test_daily_retention_total_size_cap() {
        let temp_dir = TempDir::new().unwrap();
        let policy = policy(temp_dir.path(), true, 64, 2);
        let names = policy.names();
        let mut roller = Roller::open(&policy, ManualClock::new(day(1))).unwrap();

        let line = "z".repeat(63);
        for _ in 0..20 {
            roller.append(&entry(&line)).unwrap();

            let retained: u64 = fs::read_dir(temp_dir.path())
                .unwrap()
                .map(|e| e.unwrap().path())
                .filter(|p| p != &names.active())
                .map(|p| fs::metadata(p).unwrap().len())
                .sum();
            assert!(retained <= 128);
        }
    }

    #[test]
    fn test_empty_active_file_is_not_archived() {
        let temp_dir = TempDir::new().unwrap();
        let policy = policy(temp_dir.path(), true, 0, 5);
        let clock = ManualClock::new(day(1));
        let mut roller = Roller::open(&policy, clock.clone()).unwrap();

        clock.advance_days(2);
        roller.append(&entry("hello")).unwrap();

        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_delete_all_recreates_active() {
        let temp_dir = TempDir::new().unwrap();
        let policy = policy(temp_dir.path(), false, 10, 3);
        let names = policy.names();
        let mut roller = Roller::open(&policy, ManualClock::new(day(1))).unwrap();

        for msg in ["aaaaaaaaa", "bbbbbbbbb"] {
            roller.append(&entry(msg)).unwrap();
        }

        assert_eq!(roller.delete_all().unwrap(), 2);
        assert!(!names.window(1).exists());
        assert_eq!(fs::metadata(names.active()).unwrap().len(), 0);

        roller.append(&entry("after")).unwrap();
        assert_eq!(fs::read_to_string(names.active()).unwrap(), "after\n");
    }

    #[test]
    fn test_append_recovers_after_active_file_removed() {
        let temp_dir = TempDir::new().unwrap();
        let policy = policy(temp_dir.path(), false, 0, 1);
        let names = policy.names();
        let mut roller = Roller::open(&policy, ManualClock::new(day(1))).unwrap();
        roller.active = None;

        roller.append(&entry("reopened")).unwrap();
        assert_eq!(fs::read_to_string(names.active()).unwrap(), "reopened\n");
    }
}
