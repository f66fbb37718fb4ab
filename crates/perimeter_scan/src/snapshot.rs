//! A [`CloudApi`] backed by a JSON inventory.
//!
//! The inventory describes one account: its identity, the resources and
//! regional Web ACLs per region, the global Web ACLs and distributions, and
//! optionally further accounts reachable through `assume_role`. It is used
//! for offline scans of exported inventories and as the provider in tests.
//!
//! Faults can be injected per operation to exercise throttling, denial and
//! latency handling. Every call is counted.

use crate::arn::Arn;
use crate::cloud::{
    CallerIdentity, CloudApi, CloudResult, DistributionDetail, DistributionSummary, Page,
    ResourceSummary, WafBinding, WebAclSummary,
};
use crate::error::{CloudError, CloudErrorKind, ScanError};
use crate::types::{ResourceType, WafScope};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

// ============================================================================
// Inventory document
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inventory {
    pub identity: CallerIdentity,
    /// Items per page for every listing; unset returns everything at once
    #[serde(default)]
    pub page_size: Option<usize>,
    #[serde(default)]
    pub regions: BTreeMap<String, RegionInventory>,
    #[serde(default)]
    pub global: GlobalInventory,
    /// Accounts reachable by role, keyed by role ARN or account id
    #[serde(default)]
    pub accounts: BTreeMap<String, AccountInventory>,
    #[serde(default)]
    pub faults: Vec<Fault>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegionInventory {
    #[serde(default)]
    pub resources: Vec<ResourceSummary>,
    #[serde(default)]
    pub web_acls: Vec<WebAclEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalInventory {
    #[serde(default)]
    pub web_acls: Vec<WebAclEntry>,
    #[serde(default)]
    pub distributions: Vec<DistributionDetail>,
}

/// A Web ACL and the resources bound to it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebAclEntry {
    #[serde(flatten)]
    pub summary: WebAclSummary,
    #[serde(default)]
    pub resources: Vec<String>,
}

/// Another account's inventory plus the trust condition on its role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountInventory {
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(flatten)]
    pub inventory: Inventory,
}

/// Injected failure or latency for matching calls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Fault {
    /// Operation name, e.g. `ListWebACLs` or `ListResources`
    pub operation: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub resource_type: Option<ResourceType>,
    #[serde(default)]
    pub error: Option<CloudErrorKind>,
    #[serde(default)]
    pub delay_ms: Option<u64>,
    /// How many matching calls are affected; unset means all of them
    #[serde(default)]
    pub times: Option<usize>,
    #[serde(default)]
    pub message: Option<String>,
}

impl Fault {
    fn matches(&self, operation: &str, region: Option<&str>, resource_type: Option<ResourceType>) -> bool {
        if self.operation != operation {
            return false;
        }
        if let Some(want) = &self.region {
            if region != Some(want.as_str()) {
                return false;
            }
        }
        if let Some(want) = self.resource_type {
            if resource_type != Some(want) {
                return false;
            }
        }
        true
    }
}

// ============================================================================
// Operation names
// ============================================================================

pub const OP_CALLER_IDENTITY: &str = "GetCallerIdentity";
pub const OP_LIST_RESOURCES: &str = "ListResources";
pub const OP_LIST_WEB_ACLS: &str = "ListWebACLs";
pub const OP_LIST_RESOURCES_FOR_WEB_ACL: &str = "ListResourcesForWebACL";
pub const OP_LIST_DISTRIBUTIONS: &str = "ListDistributions";
pub const OP_GET_DISTRIBUTION: &str = "GetDistribution";
pub const OP_DESCRIBE_LOAD_BALANCERS: &str = "DescribeLoadBalancers";
pub const OP_ASSUME_ROLE: &str = "AssumeRole";

// ============================================================================
// SnapshotCloud
// ============================================================================

pub struct SnapshotCloud {
    inventory: Inventory,
    /// Remaining activations per fault, parallel to `inventory.faults`
    remaining: Mutex<Vec<Option<usize>>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl std::fmt::Debug for SnapshotCloud {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotCloud")
            .field("account", &self.inventory.identity.account)
            .field("regions", &self.inventory.regions.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SnapshotCloud {
    pub fn new(inventory: Inventory) -> Self {
        let remaining = inventory.faults.iter().map(|f| f.times).collect();
        Self {
            inventory,
            remaining: Mutex::new(remaining),
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_json_str(content: &str) -> Result<Self, ScanError> {
        let inventory: Inventory = serde_json::from_str(content)?;
        Ok(Self::new(inventory))
    }

    pub fn load(path: &Path) -> Result<Self, ScanError> {
        let content = std::fs::read_to_string(path)?;
        let cloud = Self::from_json_str(&content)?;
        debug!(path = %path.display(), account = %cloud.inventory.identity.account, "Loaded inventory");
        Ok(cloud)
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    /// Regions present in the inventory, sorted.
    pub fn regions(&self) -> Vec<String> {
        self.inventory.regions.keys().cloned().collect()
    }

    /// Calls made to `operation` so far, including failed ones.
    pub fn call_count(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.get(operation).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    async fn enter(
        &self,
        operation: &str,
        region: Option<&str>,
        resource_type: Option<ResourceType>,
    ) -> CloudResult<()> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(operation.to_string()).or_insert(0) += 1;
        }

        let fault = {
            let Ok(mut remaining) = self.remaining.lock() else {
                return Ok(());
            };
            let mut hit = None;
            for (idx, fault) in self.inventory.faults.iter().enumerate() {
                if !fault.matches(operation, region, resource_type) {
                    continue;
                }
                match remaining[idx] {
                    Some(0) => continue,
                    Some(n) => remaining[idx] = Some(n - 1),
                    None => {}
                }
                hit = Some(fault.clone());
                break;
            }
            hit
        };

        let Some(fault) = fault else {
            return Ok(());
        };
        if let Some(ms) = fault.delay_ms {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        match fault.error {
            Some(kind) => Err(CloudError::new(
                kind,
                operation,
                fault
                    .message
                    .unwrap_or_else(|| format!("injected {} fault", kind)),
            )),
            None => Ok(()),
        }
    }

    fn region(&self, region: &str) -> Option<&RegionInventory> {
        self.inventory.regions.get(region)
    }

    fn page<T: Clone>(&self, items: &[T], page_token: Option<&str>, operation: &str) -> CloudResult<Page<T>> {
        let start = match page_token {
            None => 0,
            Some(token) => token.parse::<usize>().map_err(|_| {
                CloudError::new(
                    CloudErrorKind::Malformed,
                    operation,
                    format!("unknown page token '{}'", token),
                )
            })?,
        };
        let size = self.inventory.page_size.filter(|n| *n > 0).unwrap_or(usize::MAX);
        let end = start.saturating_add(size).min(items.len());
        let slice = items.get(start..end).unwrap_or(&[]).to_vec();
        let next_token = (end < items.len()).then(|| end.to_string());
        Ok(Page {
            items: slice,
            next_token,
        })
    }

    fn web_acl_entries(&self, scope: WafScope, region: &str) -> &[WebAclEntry] {
        match scope {
            WafScope::Global => &self.inventory.global.web_acls,
            WafScope::Regional => self
                .region(region)
                .map(|r| r.web_acls.as_slice())
                .unwrap_or(&[]),
        }
    }

    fn find_web_acl(&self, arn: &str, region: &str) -> Option<(&WebAclEntry, WafScope)> {
        if let Some(entry) = self.inventory.global.web_acls.iter().find(|e| e.summary.arn == arn) {
            return Some((entry, WafScope::Global));
        }
        self.region(region)
            .and_then(|r| r.web_acls.iter().find(|e| e.summary.arn == arn))
            .map(|entry| (entry, WafScope::Regional))
    }

    fn account_for_role(&self, role_arn: &str) -> Option<&AccountInventory> {
        self.inventory.accounts.get(role_arn).or_else(|| {
            Arn::parse(role_arn)
                .ok()
                .and_then(|arn| self.inventory.accounts.get(&arn.account))
        })
    }
}

/// Binding family a resource ARN belongs to, judged from its service and path.
pub fn binding_for_arn(arn: &str) -> Option<WafBinding> {
    let parsed = Arn::parse(arn).ok()?;
    match parsed.service.as_str() {
        "elasticloadbalancing" if parsed.resource.starts_with("loadbalancer/app/") => {
            Some(WafBinding::ApplicationLoadBalancer)
        }
        "apigateway" => Some(WafBinding::ApiGateway),
        "appsync" => Some(WafBinding::AppSync),
        "cognito-idp" => Some(WafBinding::CognitoUserPool),
        "apprunner" => Some(WafBinding::AppRunnerService),
        "ec2" if parsed.resource.starts_with("verified-access-instance/") => {
            Some(WafBinding::VerifiedAccessInstance)
        }
        "cloudfront" => Some(WafBinding::Distribution),
        _ => None,
    }
}

#[async_trait]
impl CloudApi for SnapshotCloud {
    async fn caller_identity(&self) -> CloudResult<CallerIdentity> {
        self.enter(OP_CALLER_IDENTITY, None, None).await?;
        Ok(self.inventory.identity.clone())
    }

    async fn list_resources(
        &self,
        resource_type: ResourceType,
        region: &str,
        page_token: Option<&str>,
    ) -> CloudResult<Page<ResourceSummary>> {
        self.enter(OP_LIST_RESOURCES, Some(region), Some(resource_type)).await?;
        let items: Vec<ResourceSummary> = if resource_type == ResourceType::CloudfrontDistribution {
            self.inventory
                .global
                .distributions
                .iter()
                .map(|d| ResourceSummary::Distribution {
                    id: d.id.clone(),
                    arn: d.arn.clone(),
                    domain_name: d.domain_name.clone(),
                    web_acl_id: d.web_acl_id.clone(),
                })
                .collect()
        } else {
            self.region(region)
                .map(|r| {
                    r.resources
                        .iter()
                        .filter(|s| s.resource_type() == resource_type)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        };
        self.page(&items, page_token, OP_LIST_RESOURCES)
    }

    async fn list_web_acls(
        &self,
        scope: WafScope,
        region: &str,
        page_token: Option<&str>,
    ) -> CloudResult<Page<WebAclSummary>> {
        self.enter(OP_LIST_WEB_ACLS, Some(region), None).await?;
        let items: Vec<WebAclSummary> = self
            .web_acl_entries(scope, region)
            .iter()
            .map(|e| e.summary.clone())
            .collect();
        self.page(&items, page_token, OP_LIST_WEB_ACLS)
    }

    async fn list_resources_for_web_acl(
        &self,
        web_acl_arn: &str,
        region: &str,
        binding: WafBinding,
    ) -> CloudResult<Vec<String>> {
        self.enter(OP_LIST_RESOURCES_FOR_WEB_ACL, Some(region), None).await?;
        let Some((entry, scope)) = self.find_web_acl(web_acl_arn, region) else {
            return Err(CloudError::new(
                CloudErrorKind::NotFound,
                OP_LIST_RESOURCES_FOR_WEB_ACL,
                format!("Web ACL {} not found in {}", web_acl_arn, region),
            ));
        };

        let mut arns: Vec<String> = entry
            .resources
            .iter()
            .filter(|arn| binding_for_arn(arn) == Some(binding))
            .cloned()
            .collect();

        // Distributions name their Web ACL rather than the other way round
        if scope == WafScope::Global && binding == WafBinding::Distribution {
            for distribution in &self.inventory.global.distributions {
                if distribution.web_acl_id.as_deref() == Some(web_acl_arn)
                    && !arns.contains(&distribution.arn)
                {
                    arns.push(distribution.arn.clone());
                }
            }
        }
        Ok(arns)
    }

    async fn list_distributions(
        &self,
        page_token: Option<&str>,
    ) -> CloudResult<Page<DistributionSummary>> {
        self.enter(OP_LIST_DISTRIBUTIONS, None, None).await?;
        let items: Vec<DistributionSummary> = self
            .inventory
            .global
            .distributions
            .iter()
            .map(|d| DistributionSummary {
                id: d.id.clone(),
                arn: d.arn.clone(),
                domain_name: d.domain_name.clone(),
            })
            .collect();
        self.page(&items, page_token, OP_LIST_DISTRIBUTIONS)
    }

    async fn get_distribution(&self, id: &str) -> CloudResult<DistributionDetail> {
        self.enter(OP_GET_DISTRIBUTION, None, None).await?;
        self.inventory
            .global
            .distributions
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or_else(|| {
                CloudError::new(
                    CloudErrorKind::NotFound,
                    OP_GET_DISTRIBUTION,
                    format!("distribution {} not found", id),
                )
            })
    }

    async fn load_balancer_dns_name(&self, arn: &str, region: &str) -> CloudResult<Option<String>> {
        self.enter(OP_DESCRIBE_LOAD_BALANCERS, Some(region), Some(ResourceType::ApplicationLoadBalancer))
            .await?;
        let found = self.region(region).and_then(|r| {
            r.resources.iter().find_map(|s| match s {
                ResourceSummary::LoadBalancer {
                    arn: lb_arn,
                    dns_name,
                    ..
                } if lb_arn == arn => Some(dns_name.clone()),
                _ => None,
            })
        });
        found.ok_or_else(|| {
            CloudError::new(
                CloudErrorKind::NotFound,
                OP_DESCRIBE_LOAD_BALANCERS,
                format!("load balancer {} not found in {}", arn, region),
            )
        })
    }

    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
        external_id: Option<&str>,
    ) -> CloudResult<Arc<dyn CloudApi>> {
        self.enter(OP_ASSUME_ROLE, None, None).await?;
        let Some(account) = self.account_for_role(role_arn) else {
            return Err(CloudError::access_denied(
                OP_ASSUME_ROLE,
                format!("not authorized to assume {}", role_arn),
            ));
        };
        if account.external_id.is_some() && account.external_id.as_deref() != external_id {
            return Err(CloudError::access_denied(
                OP_ASSUME_ROLE,
                format!("external id mismatch for {}", role_arn),
            ));
        }
        debug!(role = %role_arn, session = %session_name, "Assumed role");
        Ok(Arc::new(SnapshotCloud::new(account.inventory.clone())))
    }
}
