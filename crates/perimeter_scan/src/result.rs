//! Scan results and the accumulator that builds them.
//!
//! Workers never touch a [`ScanResult`]. The orchestrator pushes finished
//! resources into a [`ScanAccumulator`] one at a time, and the accumulator is
//! consumed by [`ScanAccumulator::finish`], so a result is completed exactly
//! once and its counters always agree with its resource list.

use crate::error::{CloudError, CloudErrorKind};
use crate::ids::ScanId;
use crate::types::{ClassifiedResource, ComplianceStatus, ResourceType};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Error records
// ============================================================================

/// Category of a non-fatal scan problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A listing call failed for one type in one region
    PartialDiscovery,
    /// Throttling outlasted the retry budget
    RateLimited,
    /// Permission denied for one region/type scope
    Authorization,
    /// A provider record could not be interpreted and was dropped
    MalformedData,
    /// The provider reported conflicting Web ACL bindings
    AmbiguousBinding,
    /// Work was still outstanding when the scan deadline passed
    DeadlineExceeded,
}

impl ErrorKind {
    /// Category for a non-fatal provider failure.
    pub fn for_cloud_error(err: &CloudError) -> Self {
        match err.kind {
            CloudErrorKind::Throttled => Self::RateLimited,
            CloudErrorKind::AccessDenied | CloudErrorKind::InvalidCredentials => Self::Authorization,
            CloudErrorKind::Malformed => Self::MalformedData,
            CloudErrorKind::NotFound | CloudErrorKind::Service => Self::PartialDiscovery,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PartialDiscovery => "partial_discovery",
            Self::RateLimited => "rate_limited",
            Self::Authorization => "authorization",
            Self::MalformedData => "malformed_data",
            Self::AmbiguousBinding => "ambiguous_binding",
            Self::DeadlineExceeded => "deadline_exceeded",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
        }
    }
}

/// A problem recorded during a scan that did not stop it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanErrorRecord {
    pub region: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<ResourceType>,
    pub kind: ErrorKind,
    pub severity: Severity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ScanErrorRecord {
    pub fn error(
        region: impl Into<String>,
        resource_type: Option<ResourceType>,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            region: region.into(),
            resource_type,
            kind,
            severity: Severity::Error,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn warning(
        region: impl Into<String>,
        resource_type: Option<ResourceType>,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(region, resource_type, kind, message)
        }
    }

    pub fn from_cloud_error(
        region: impl Into<String>,
        resource_type: Option<ResourceType>,
        err: &CloudError,
    ) -> Self {
        Self::error(region, resource_type, ErrorKind::for_cloud_error(err), err.to_string())
    }
}

// ============================================================================
// Counters
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanCounters {
    pub total: usize,
    /// Directly associated with a Web ACL
    pub with_waf: usize,
    pub without_waf: usize,
    pub compliant: usize,
    pub non_compliant: usize,
    /// Subset of `without_waf` protected through a distribution
    pub fronted: usize,
}

impl ScanCounters {
    fn record(&mut self, resource: &ClassifiedResource) {
        self.total += 1;
        if resource.record.has_waf() {
            self.with_waf += 1;
        } else {
            self.without_waf += 1;
        }
        if resource.compliance_status.is_compliant() {
            self.compliant += 1;
        } else {
            self.non_compliant += 1;
        }
        if resource.compliance_status == ComplianceStatus::CompliantFrontedByWaf {
            self.fronted += 1;
        }
    }
}

// ============================================================================
// Accumulator
// ============================================================================

/// Single merge point for a scan in progress.
#[derive(Debug)]
pub struct ScanAccumulator {
    scan_id: ScanId,
    account_id: String,
    started_at: DateTime<Utc>,
    regions: Vec<String>,
    resource_types: Vec<ResourceType>,
    resources: Vec<ClassifiedResource>,
    counters: ScanCounters,
    errors: Vec<ScanErrorRecord>,
}

impl ScanAccumulator {
    pub fn new(
        account_id: impl Into<String>,
        regions: Vec<String>,
        resource_types: Vec<ResourceType>,
    ) -> Self {
        Self {
            scan_id: ScanId::new(),
            account_id: account_id.into(),
            started_at: Utc::now(),
            regions,
            resource_types,
            resources: Vec::new(),
            counters: ScanCounters::default(),
            errors: Vec::new(),
        }
    }

    pub fn scan_id(&self) -> &ScanId {
        &self.scan_id
    }

    /// Finalize one resource, updating counters as it lands.
    pub fn push(&mut self, resource: ClassifiedResource) {
        self.counters.record(&resource);
        self.resources.push(resource);
    }

    pub fn record_error(&mut self, error: ScanErrorRecord) {
        self.errors.push(error);
    }

    pub fn extend_errors(&mut self, errors: impl IntoIterator<Item = ScanErrorRecord>) {
        self.errors.extend(errors);
    }

    pub fn counters(&self) -> ScanCounters {
        self.counters
    }

    pub fn finish(self) -> ScanResult {
        ScanResult {
            scan_id: self.scan_id,
            account_id: self.account_id,
            started_at: self.started_at,
            completed_at: Utc::now(),
            regions: self.regions,
            resource_types: self.resource_types,
            resources: self.resources,
            counters: self.counters,
            errors: self.errors,
        }
    }
}

// ============================================================================
// Result
// ============================================================================

/// Completed snapshot of one account's perimeter
#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    scan_id: ScanId,
    account_id: String,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    regions: Vec<String>,
    resource_types: Vec<ResourceType>,
    resources: Vec<ClassifiedResource>,
    counters: ScanCounters,
    errors: Vec<ScanErrorRecord>,
}

impl ScanResult {
    pub fn scan_id(&self) -> &ScanId {
        &self.scan_id
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    pub fn regions(&self) -> &[String] {
        &self.regions
    }

    pub fn resource_types(&self) -> &[ResourceType] {
        &self.resource_types
    }

    pub fn resources(&self) -> &[ClassifiedResource] {
        &self.resources
    }

    pub fn errors(&self) -> &[ScanErrorRecord] {
        &self.errors
    }

    pub fn counters(&self) -> ScanCounters {
        self.counters
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Percentage of resources that are compliant; 100 when nothing was found.
    pub fn compliance_rate(&self) -> f64 {
        if self.counters.total == 0 {
            return 100.0;
        }
        self.counters.compliant as f64 / self.counters.total as f64 * 100.0
    }

    /// Percentage of resources with a direct Web ACL; 0 when nothing was found.
    pub fn waf_coverage_rate(&self) -> f64 {
        if self.counters.total == 0 {
            return 0.0;
        }
        self.counters.with_waf as f64 / self.counters.total as f64 * 100.0
    }

    pub fn non_compliant(&self) -> impl Iterator<Item = &ClassifiedResource> {
        self.resources
            .iter()
            .filter(|r| !r.compliance_status.is_compliant())
    }

    pub fn without_waf(&self) -> impl Iterator<Item = &ClassifiedResource> {
        self.resources.iter().filter(|r| !r.record.has_waf())
    }

    pub fn by_type(&self) -> BTreeMap<ResourceType, Vec<&ClassifiedResource>> {
        let mut grouped: BTreeMap<ResourceType, Vec<&ClassifiedResource>> = BTreeMap::new();
        for resource in &self.resources {
            grouped
                .entry(resource.record.resource_type)
                .or_default()
                .push(resource);
        }
        grouped
    }

    pub fn by_region(&self) -> BTreeMap<&str, Vec<&ClassifiedResource>> {
        let mut grouped: BTreeMap<&str, Vec<&ClassifiedResource>> = BTreeMap::new();
        for resource in &self.resources {
            grouped
                .entry(resource.record.region.as_str())
                .or_default()
                .push(resource);
        }
        grouped
    }

    /// Recount from the resource list.
    pub fn recount(&self) -> ScanCounters {
        let mut counters = ScanCounters::default();
        for resource in &self.resources {
            counters.record(resource);
        }
        counters
    }
}
