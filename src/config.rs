//! Configuration management for the file logger
//!
//! Two layers: `ConfigureOptions` is the option dictionary a host passes to
//! `configure`, `Config` is the TOML file the command-line harness reads.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::logging::{LogPolicy, DEFAULT_QUEUE_CAPACITY};

/// Default application identifier, also the default file prefix
pub const DEFAULT_APP_ID: &str = "file-logger";

/// Options accepted by `configure`, keyed the way the host bridge sends them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigureOptions {
    /// Roll on calendar day change and gzip rolled files
    pub daily_rolling: bool,
    /// Size threshold in bytes (0 disables size-based rollover)
    pub maximum_file_size: u64,
    /// Retention cap on rolled files
    pub maximum_number_of_files: u32,
    /// Directory for log files (default: platform cache dir + `/logs`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs_directory: Option<String>,
    /// File name prefix (default: the application identifier)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_prefix: Option<String>,
}

impl ConfigureOptions {
    /// Resolve defaults against `app_id` and build the writer policy
    pub fn to_policy(&self, app_id: &str) -> LogPolicy {
        let directory = match &self.logs_directory {
            Some(dir) => expand_path(dir),
            None => default_logs_dir(app_id),
        };

        LogPolicy {
            directory,
            file_prefix: self
                .file_prefix
                .clone()
                .unwrap_or_else(|| app_id.to_string()),
            daily_rolling: self.daily_rolling,
            max_file_size: self.maximum_file_size,
            max_retained_files: self.maximum_number_of_files,
        }
    }
}

/// Command-line harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application identifier; names the default logs directory and file prefix
    #[serde(default = "default_app_id")]
    pub app_id: String,

    /// Daily rolling with gzip archives (default: true)
    #[serde(default = "default_daily_rolling")]
    pub daily_rolling: bool,

    /// Maximum size of one log file in bytes (default: 1 MiB)
    #[serde(default = "default_maximum_file_size")]
    pub maximum_file_size: u64,

    /// Maximum number of rolled files kept (default: 5)
    #[serde(default = "default_maximum_number_of_files")]
    pub maximum_number_of_files: u32,

    /// Logs directory; `~` is expanded
    #[serde(default)]
    pub logs_directory: Option<String>,

    /// Capacity of the write queue before entries are dropped (default: 256)
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_app_id() -> String {
    DEFAULT_APP_ID.to_string()
}

fn default_daily_rolling() -> bool {
    true
}

fn default_maximum_file_size() -> u64 {
    1024 * 1024
}

fn default_maximum_number_of_files() -> u32 {
    5
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_id: default_app_id(),
            daily_rolling: default_daily_rolling(),
            maximum_file_size: default_maximum_file_size(),
            maximum_number_of_files: default_maximum_number_of_files(),
            logs_directory: None,
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, or defaults if not found
    pub fn load() -> Result<Self> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from `path`, or defaults if it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    /// Options to hand to `configure`
    pub fn configure_options(&self) -> ConfigureOptions {
        ConfigureOptions {
            daily_rolling: self.daily_rolling,
            maximum_file_size: self.maximum_file_size,
            maximum_number_of_files: self.maximum_number_of_files,
            logs_directory: self.logs_directory.clone(),
            file_prefix: None,
        }
    }
}

/// Get the configuration directory (<platform config dir>/file-logger)
/// Falls back to ./.file-logger if it cannot be determined
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join(DEFAULT_APP_ID))
        .unwrap_or_else(|| {
            tracing::warn!("Could not determine config directory, using current directory");
            PathBuf::from(".file-logger")
        })
}

/// Get the path to the config file
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Default logs directory for an application: <platform cache dir>/<app id>/logs
pub fn default_logs_dir(app_id: &str) -> PathBuf {
    dirs::cache_dir()
        .map(|cache| cache.join(app_id).join("logs"))
        .unwrap_or_else(|| {
            tracing::warn!("Could not determine cache directory, using current directory for logs");
            PathBuf::from("logs")
        })
}

fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}
