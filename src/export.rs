//! Handing retained log files to an external sharing mechanism
//!
//! The logger only supplies a complete file list and the message metadata;
//! composing the email or share sheet is up to the `ShareTarget`.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{FileLoggerError, Result};

/// Optional message metadata accompanying an export
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareRequest {
    /// Recipient address
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

/// External collaborator that delivers log files (mail composer, share sheet, ...)
pub trait ShareTarget {
    fn share(&self, request: &ShareRequest, files: &[PathBuf]) -> Result<()>;
}

/// What `ManifestTarget` emits for one export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareManifest {
    #[serde(flatten)]
    pub request: ShareRequest,
    pub files: Vec<PathBuf>,
}

/// Writes each export as one line of JSON
pub struct ManifestTarget<W: Write> {
    out: Mutex<W>,
}

impl<W: Write> ManifestTarget<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl<W: Write> ShareTarget for ManifestTarget<W> {
    fn share(&self, request: &ShareRequest, files: &[PathBuf]) -> Result<()> {
        let manifest = ShareManifest {
            request: request.clone(),
            files: files.to_vec(),
        };
        let json =
            serde_json::to_string(&manifest).map_err(|e| FileLoggerError::Share(e.to_string()))?;

        let mut out = self
            .out
            .lock()
            .map_err(|_| FileLoggerError::Share("manifest output poisoned".to_string()))?;
        writeln!(out, "{json}").map_err(|e| FileLoggerError::Share(e.to_string()))?;
        out.flush().map_err(|e| FileLoggerError::Share(e.to_string()))
    }
}
