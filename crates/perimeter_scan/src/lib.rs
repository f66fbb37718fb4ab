//! Perimeter Scan - WAF Coverage Resolver
//!
//! Discovers edge-facing resources in an account, works out which Web ACL
//! protects each one (directly, or through a CDN distribution in front of
//! it) and classifies every resource for compliance.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐     ┌────────────┐
//! │  CloudApi   │────▶│   Catalog    │────▶│   Enrich     │────▶│  Classify  │
//! │ (provider)  │     │ + WAF index  │     │ direct/front │     │  + Result  │
//! └─────────────┘     └──────────────┘     └──────────────┘     └────────────┘
//!                                                 ▲
//!                                          ┌──────┴──────┐
//!                                          │ Origin index│
//!                                          └─────────────┘
//! ```
//!
//! # Core Concepts
//!
//! - **ResourceRecord**: One discovered resource and its WAF findings
//! - **WafIndex**: Resource ARN -> Web ACL, per region and scope
//! - **OriginIndex**: Origin domain -> distributions forwarding to it
//! - **ComplianceStatus**: Verdict derived from WAF presence and exposure
//! - **Scanner**: Runs the whole pipeline for one account, or sweeps many

pub mod arn;
#[cfg(feature = "aws")]
pub mod aws;
pub mod catalog;
pub mod classify;
pub mod cloud;
pub mod config;
pub mod enrich;
pub mod error;
pub mod export;
pub mod ids;
pub mod orchestrator;
pub mod origin;
pub mod result;
pub mod retry;
pub mod snapshot;
pub mod sweep;
pub mod types;
pub mod waf_index;

// Re-exports for convenience
pub use classify::classify;
pub use cloud::{CallerIdentity, CloudApi, CloudResult};
pub use config::{FrontingTieBreak, ScanConfig};
pub use error::{ArnError, CloudError, CloudErrorKind, Result, ScanError};
pub use export::{CsvExporter, ExportLocation, ExportTarget, LogExporter, ScanExporter};
pub use ids::ScanId;
pub use orchestrator::{RoleHint, ScanFailure, ScanRequest, Scanner};
pub use result::{ErrorKind, ScanCounters, ScanErrorRecord, ScanResult, Severity};
pub use retry::RetryPolicy;
pub use snapshot::SnapshotCloud;
#[cfg(feature = "aws")]
pub use aws::AwsCloud;
pub use sweep::{SweepReport, SweepRequest};
pub use types::{
    ClassifiedResource, ComplianceStatus, FrontedBy, ResourceRecord, ResourceType, WafScope,
    WebAclRef,
};
