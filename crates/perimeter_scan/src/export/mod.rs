//! Exporters turn a finished [`ScanResult`] into an external artifact.

mod log_events;
mod tabular;

pub use log_events::LogExporter;
pub use tabular::{CsvExporter, CSV_HEADERS};

use crate::result::ScanResult;
use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_FILENAME_PREFIX: &str = "waf-scan";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("{0}")]
    Unsupported(String),
}

pub type ExportResult<T> = std::result::Result<T, ExportError>;

/// Where an exporter writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportTarget {
    File(PathBuf),
    Stdout,
    /// The exporter's own sink (log exporters)
    Default,
}

/// Where an export actually landed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportLocation {
    File(PathBuf),
    Stdout,
    Log,
}

impl std::fmt::Display for ExportLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Stdout => f.write_str("stdout"),
            Self::Log => f.write_str("log"),
        }
    }
}

pub trait ScanExporter {
    fn format_name(&self) -> &'static str;

    fn export(&self, result: &ScanResult, target: &ExportTarget) -> ExportResult<ExportLocation>;
}

/// `<prefix>-<account>-<YYYYmmdd-HHMMSS>.csv`, stamped with the scan start time.
pub fn default_output_filename(result: &ScanResult, prefix: &str) -> String {
    format!(
        "{}-{}-{}.csv",
        prefix,
        result.account_id(),
        result.started_at().format("%Y%m%d-%H%M%S")
    )
}
