//! File logger - rotating file logging for application shells
//!
//! This library provides a rotating log writer with size and daily rollover,
//! retention caps, ordered retrieval of log files and export to a sharing
//! collaborator.

pub mod bridge;
pub mod config;
pub mod error;
pub mod export;
pub mod logging;

pub use bridge::FileLogger;
pub use error::{FileLoggerError, Result};
