//! Structured log export.
//!
//! Emits one `scan_summary` event, one `unprotected_resource` event per
//! resource without a direct Web ACL, and one `scan_error` event per
//! recorded error. Events go through `tracing` under the
//! `perimeter_scan::report` target so a JSON or file layer can pick them up.

use super::{ExportError, ExportLocation, ExportResult, ExportTarget, ScanExporter};
use crate::result::ScanResult;
use tracing::{info, warn};

pub const REPORT_TARGET: &str = "perimeter_scan::report";

#[derive(Debug, Default, Clone, Copy)]
pub struct LogExporter;

impl LogExporter {
    pub fn new() -> Self {
        Self
    }

    /// Number of events `export` emits for `result`.
    pub fn event_count(result: &ScanResult) -> usize {
        1 + result.without_waf().count() + result.errors().len()
    }
}

impl ScanExporter for LogExporter {
    fn format_name(&self) -> &'static str {
        "log"
    }

    fn export(&self, result: &ScanResult, target: &ExportTarget) -> ExportResult<ExportLocation> {
        if *target != ExportTarget::Default {
            return Err(ExportError::Unsupported(format!(
                "{} exporter only writes to the log sink",
                self.format_name()
            )));
        }

        let counters = result.counters();
        info!(
            target: REPORT_TARGET,
            event_type = "scan_summary",
            scan_id = %result.scan_id(),
            account_id = %result.account_id(),
            total_resources = counters.total,
            resources_with_waf = counters.with_waf,
            resources_without_waf = counters.without_waf,
            compliance_rate = result.compliance_rate(),
            regions_scanned = %result.regions().join(","),
            errors_count = result.errors().len(),
            "WAF scan completed"
        );

        for resource in result.without_waf() {
            let record = &resource.record;
            warn!(
                target: REPORT_TARGET,
                event_type = "unprotected_resource",
                resource_arn = %record.arn,
                resource_type = record.resource_type.as_str(),
                resource_name = record.name.as_deref().unwrap_or(""),
                region = %record.region,
                account_id = %record.account_id,
                compliance_status = resource.compliance_status.as_str(),
                fronted_by_protected_cloudfront = record.fronted_by().is_some(),
                "Resource without direct WAF"
            );
        }

        for err in result.errors() {
            warn!(
                target: REPORT_TARGET,
                event_type = "scan_error",
                region = %err.region,
                resource_type = err.resource_type.map(|t| t.as_str()).unwrap_or(""),
                kind = err.kind.as_str(),
                error_message = %err.message,
                "Scan error"
            );
        }

        Ok(ExportLocation::Log)
    }
}
