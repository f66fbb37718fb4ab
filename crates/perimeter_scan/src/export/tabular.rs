//! CSV export, one row per resource.

use super::{
    default_output_filename, ExportError, ExportLocation, ExportResult, ExportTarget,
    ScanExporter, DEFAULT_FILENAME_PREFIX,
};
use crate::result::ScanResult;
use crate::types::ClassifiedResource;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const CSV_HEADERS: [&str; 14] = [
    "Account ID",
    "Region",
    "Resource Type",
    "Resource Name",
    "Resource ARN",
    "Has WAF",
    "WAF Name",
    "WAF ARN",
    "Is Public",
    "Compliance Status",
    "Scanned At",
    "Fronted By Resource",
    "Fronted By WAF",
    "Notes",
];

#[derive(Debug, Default, Clone, Copy)]
pub struct CsvExporter;

impl CsvExporter {
    pub fn new() -> Self {
        Self
    }

    /// Write header and rows to any writer.
    pub fn write_to<W: Write>(&self, result: &ScanResult, writer: W) -> ExportResult<()> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(CSV_HEADERS)?;
        for resource in result.resources() {
            csv.write_record(row(resource))?;
        }
        csv.flush().map_err(|source| ExportError::Io {
            path: "csv writer".to_string(),
            source,
        })?;
        Ok(())
    }

    fn write_file(&self, result: &ScanResult, path: &Path) -> ExportResult<PathBuf> {
        let final_path = with_csv_extension(path);
        if let Some(parent) = final_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| ExportError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }

        // Stage next to the destination, then rename into place
        let temp_path = final_path.with_extension("csv.tmp");
        let file = std::fs::File::create(&temp_path).map_err(|source| ExportError::Io {
            path: temp_path.display().to_string(),
            source,
        })?;
        if let Err(err) = self.write_to(result, file) {
            if std::fs::remove_file(&temp_path).is_err() {
                warn!(path = %temp_path.display(), "Could not remove partial CSV");
            }
            return Err(err);
        }
        std::fs::rename(&temp_path, &final_path).map_err(|source| ExportError::Io {
            path: final_path.display().to_string(),
            source,
        })?;

        info!(
            path = %final_path.display(),
            rows = result.resources().len(),
            "Wrote CSV report"
        );
        Ok(final_path)
    }
}

impl ScanExporter for CsvExporter {
    fn format_name(&self) -> &'static str {
        "CSV"
    }

    fn export(&self, result: &ScanResult, target: &ExportTarget) -> ExportResult<ExportLocation> {
        match target {
            ExportTarget::Stdout => {
                let stdout = std::io::stdout();
                self.write_to(result, stdout.lock())?;
                Ok(ExportLocation::Stdout)
            }
            ExportTarget::File(path) => self.write_file(result, path).map(ExportLocation::File),
            ExportTarget::Default => {
                let path = PathBuf::from(default_output_filename(result, DEFAULT_FILENAME_PREFIX));
                self.write_file(result, &path).map(ExportLocation::File)
            }
        }
    }
}

/// Append `.csv` unless the path already ends with it.
pub fn with_csv_extension(path: &Path) -> PathBuf {
    if path.to_string_lossy().ends_with(".csv") {
        path.to_path_buf()
    } else {
        let mut raw = path.as_os_str().to_os_string();
        raw.push(".csv");
        PathBuf::from(raw)
    }
}

fn yes_no(flag: bool) -> String {
    if flag { "Yes" } else { "No" }.to_string()
}

fn row(resource: &ClassifiedResource) -> [String; 14] {
    let record = &resource.record;
    let web_acl = record.web_acl();
    let fronted = record.fronted_by();
    [
        record.account_id.clone(),
        record.region.clone(),
        record.resource_type.display_name().to_string(),
        record.name.clone().unwrap_or_default(),
        record.arn.clone(),
        yes_no(record.has_waf()),
        web_acl.map(|a| a.name.clone()).unwrap_or_default(),
        web_acl.map(|a| a.arn.clone()).unwrap_or_default(),
        yes_no(record.is_public),
        resource.compliance_status.as_str().to_string(),
        record.scanned_at.to_rfc3339(),
        fronted.map(|f| f.distribution_arn.clone()).unwrap_or_default(),
        fronted.map(|f| f.web_acl.name.clone()).unwrap_or_default(),
        fronted.map(|f| f.note.clone()).unwrap_or_default(),
    ]
}
