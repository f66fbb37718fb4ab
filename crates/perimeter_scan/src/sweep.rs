//! Multi-account sweeps.
//!
//! Each target account is scanned through an assumed role. One account
//! failing never stops the others; the report says which ones failed.

use crate::orchestrator::{RoleHint, ScanFailure, ScanRequest, Scanner};
use crate::result::ScanResult;
use crate::types::ResourceType;
use serde::Serialize;
use tracing::{error, info};

pub const DEFAULT_ROLE_NAME: &str = "PerimeterGuardScanRole";
pub const SWEEP_SESSION_NAME: &str = "perimeter-guard-sweep";

/// Accounts to scan and how to reach them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepRequest {
    /// Empty means the caller's own account
    pub accounts: Vec<String>,
    pub role_name: String,
    pub external_id: Option<String>,
    pub regions: Option<Vec<String>>,
    pub resource_types: Option<Vec<ResourceType>>,
}

impl Default for SweepRequest {
    fn default() -> Self {
        Self {
            accounts: Vec::new(),
            role_name: DEFAULT_ROLE_NAME.to_string(),
            external_id: None,
            regions: None,
            resource_types: None,
        }
    }
}

impl SweepRequest {
    /// Parse a comma-separated account list, ignoring blanks.
    pub fn parse_accounts(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn role_arn(&self, account_id: &str) -> String {
        format!("arn:aws:iam::{}:role/{}", account_id, self.role_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountSummary {
    pub account_id: String,
    pub total_resources: usize,
    pub resources_with_waf: usize,
    pub resources_without_waf: usize,
    pub non_compliant: usize,
    pub compliance_rate: f64,
    pub errors_count: usize,
}

impl AccountSummary {
    fn from_result(result: &ScanResult) -> Self {
        let counters = result.counters();
        Self {
            account_id: result.account_id().to_string(),
            total_resources: counters.total,
            resources_with_waf: counters.with_waf,
            resources_without_waf: counters.without_waf,
            non_compliant: counters.non_compliant,
            compliance_rate: result.compliance_rate(),
            errors_count: result.errors().len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountFailure {
    pub account_id: String,
    pub error: String,
}

/// Outcome of a sweep across accounts
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    /// 200 when every account was scanned, 207 otherwise
    pub status_code: u16,
    pub accounts_scanned: usize,
    pub accounts_failed: usize,
    pub total_resources: usize,
    pub resources_with_waf: usize,
    pub resources_without_waf: usize,
    /// Directly protected resources over all resources, as a percentage
    pub overall_compliance_rate: f64,
    pub results_by_account: Vec<AccountSummary>,
    pub errors: Vec<AccountFailure>,
    #[serde(skip)]
    pub results: Vec<ScanResult>,
}

impl SweepReport {
    fn build(results: Vec<ScanResult>, failures: Vec<AccountFailure>) -> Self {
        let summaries: Vec<AccountSummary> = results.iter().map(AccountSummary::from_result).collect();
        let total: usize = summaries.iter().map(|s| s.total_resources).sum();
        let protected: usize = summaries.iter().map(|s| s.resources_with_waf).sum();
        let unprotected: usize = summaries.iter().map(|s| s.resources_without_waf).sum();
        let overall = if total == 0 {
            100.0
        } else {
            protected as f64 / total as f64 * 100.0
        };
        Self {
            status_code: if failures.is_empty() { 200 } else { 207 },
            accounts_scanned: summaries.len(),
            accounts_failed: failures.len(),
            total_resources: total,
            resources_with_waf: protected,
            resources_without_waf: unprotected,
            overall_compliance_rate: overall,
            results_by_account: summaries,
            errors: failures,
            results,
        }
    }
}

impl Scanner {
    /// Scan every requested account in turn.
    pub async fn sweep(&self, request: SweepRequest) -> SweepReport {
        let mut results = Vec::new();
        let mut failures = Vec::new();

        if request.accounts.is_empty() {
            info!("No target accounts configured, scanning local account only");
            let scan = ScanRequest {
                regions: request.regions.clone(),
                resource_types: request.resource_types.clone(),
                account_id: None,
                role: None,
            };
            match self.scan(scan).await {
                Ok(result) => results.push(result),
                Err(err) => failures.push(failure("local", &err)),
            }
            return SweepReport::build(results, failures);
        }

        for account_id in &request.accounts {
            info!(account = %account_id, "Sweeping account");
            let scan = ScanRequest {
                regions: request.regions.clone(),
                resource_types: request.resource_types.clone(),
                account_id: Some(account_id.clone()),
                role: Some(RoleHint {
                    role_arn: request.role_arn(account_id),
                    external_id: request.external_id.clone(),
                    session_name: SWEEP_SESSION_NAME.to_string(),
                }),
            };
            match self.scan(scan).await {
                Ok(result) => {
                    info!(
                        account = %account_id,
                        total = result.counters().total,
                        compliance_rate = format!("{:.1}%", result.compliance_rate()),
                        "Account scan complete"
                    );
                    results.push(result);
                }
                Err(err) => failures.push(failure(account_id, &err)),
            }
        }

        let report = SweepReport::build(results, failures);
        info!(
            accounts_scanned = report.accounts_scanned,
            accounts_failed = report.accounts_failed,
            total_resources = report.total_resources,
            overall_compliance_rate = report.overall_compliance_rate,
            "Sweep complete"
        );
        report
    }
}

fn failure(account_id: &str, err: &ScanFailure) -> AccountFailure {
    error!(account = %account_id, error = %err, "Account scan failed");
    AccountFailure {
        account_id: account_id.to_string(),
        error: err.to_string(),
    }
}
