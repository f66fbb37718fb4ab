//! Scan orchestration for one account.
//!
//! Discovery fans out as independent units of work, one per
//! (region, resource type) plus one Web ACL index per region and scope, on a
//! bounded pool. Unit results are merged sequentially here. Once every unit
//! has finished (or the deadline has passed) the account-wide origin index is
//! built, records are enriched, classified, and pushed into the accumulator.

use crate::catalog::{Listing, ResourceCatalog, GLOBAL_REGION_LABEL};
use crate::classify::classify;
use crate::cloud::{CloudApi, CloudResult, WafBinding};
use crate::config::ScanConfig;
use crate::enrich::{attach_direct, enrich_fronting};
use crate::error::{CloudError, CloudErrorKind, ScanError};
use crate::origin::{OriginIndex, OriginIndexBuilder, OriginMatcher};
use crate::result::{ErrorKind, ScanAccumulator, ScanErrorRecord, ScanResult};
use crate::retry::RetryPolicy;
use crate::types::{ClassifiedResource, ResourceRecord, ResourceType, WafScope};
use crate::waf_index::{WafAssociationIndex, WafIndex};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

// ============================================================================
// Request and failure types
// ============================================================================

/// Role to assume before scanning another account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleHint {
    pub role_arn: String,
    pub external_id: Option<String>,
    pub session_name: String,
}

/// What to scan. Unset lists fall back to the scanner's configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanRequest {
    pub regions: Option<Vec<String>>,
    pub resource_types: Option<Vec<ResourceType>>,
    /// Expected account; the scan is refused if the credentials resolve elsewhere
    pub account_id: Option<String>,
    pub role: Option<RoleHint>,
}

/// A scan that produced no result at all
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanFailure {
    #[error("unauthorized for account {account}: {message}")]
    Unauthorized { account: String, message: String },

    #[error("invalid scan request: {0}")]
    InvalidRequest(String),

    #[error("caller identity unavailable: {0}")]
    IdentityUnavailable(CloudError),
}

impl ScanFailure {
    fn unauthorized(account: &str, err: &CloudError) -> Self {
        Self::Unauthorized {
            account: account.to_string(),
            message: err.to_string(),
        }
    }
}

// ============================================================================
// Units of work
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnitKind {
    Catalog(ResourceType),
    WafIndex(WafScope),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct WorkUnit {
    region: String,
    kind: UnitKind,
}

impl WorkUnit {
    fn resource_type(&self) -> Option<ResourceType> {
        match self.kind {
            UnitKind::Catalog(rt) => Some(rt),
            UnitKind::WafIndex(_) => None,
        }
    }

    /// Region label used on error records
    fn error_region(&self) -> &str {
        match self.kind {
            UnitKind::Catalog(rt) if rt.is_global() => GLOBAL_REGION_LABEL,
            UnitKind::WafIndex(WafScope::Global) => GLOBAL_REGION_LABEL,
            _ => &self.region,
        }
    }

    fn describe(&self) -> String {
        match self.kind {
            UnitKind::Catalog(rt) => format!("{} in {}", rt.display_name(), self.region),
            UnitKind::WafIndex(scope) => format!("{} Web ACL index in {}", scope, self.region),
        }
    }
}

enum UnitOutput {
    Listing(Listing),
    Index(WafIndex),
}

struct UnitContext {
    cloud: Arc<dyn CloudApi>,
    retry: RetryPolicy,
    account_id: String,
    resource_types: Vec<ResourceType>,
}

/// Aborts the unit's task when the wrapper is dropped, so aborting the
/// discovery set also stops the work it spawned.
struct UnitTask(JoinHandle<CloudResult<UnitOutput>>);

impl Drop for UnitTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn run_unit(ctx: Arc<UnitContext>, unit: WorkUnit) -> CloudResult<UnitOutput> {
    match unit.kind {
        UnitKind::Catalog(rt) => {
            ResourceCatalog::new(Arc::clone(&ctx.cloud), ctx.retry, ctx.account_id.clone())
                .list(rt, &unit.region)
                .await
                .map(UnitOutput::Listing)
        }
        UnitKind::WafIndex(scope) => WafAssociationIndex::new(Arc::clone(&ctx.cloud), ctx.retry)
            .resolve(&unit.region, scope, &ctx.resource_types)
            .await
            .map(UnitOutput::Index),
    }
}

/// Units for a scan, in a stable order: per region its catalog units then
/// its regional index, followed by the account-wide global units.
fn plan_units(regions: &[String], resource_types: &[ResourceType], global_region: &str) -> Vec<WorkUnit> {
    let mut units = Vec::new();
    let wants_regional_index = !WafBinding::for_scope(WafScope::Regional, resource_types).is_empty();
    for region in regions {
        for rt in resource_types.iter().filter(|rt| !rt.is_global()) {
            units.push(WorkUnit {
                region: region.clone(),
                kind: UnitKind::Catalog(*rt),
            });
        }
        if wants_regional_index {
            units.push(WorkUnit {
                region: region.clone(),
                kind: UnitKind::WafIndex(WafScope::Regional),
            });
        }
    }
    for rt in resource_types.iter().filter(|rt| rt.is_global()) {
        units.push(WorkUnit {
            region: global_region.to_string(),
            kind: UnitKind::Catalog(*rt),
        });
    }
    if !WafBinding::for_scope(WafScope::Global, resource_types).is_empty() {
        units.push(WorkUnit {
            region: global_region.to_string(),
            kind: UnitKind::WafIndex(WafScope::Global),
        });
    }
    units
}

/// Merged output of the discovery phase
#[derive(Default)]
struct Discovery {
    records: Vec<ResourceRecord>,
    index: WafIndex,
    errors: Vec<ScanErrorRecord>,
}

// ============================================================================
// Scanner
// ============================================================================

/// Scans one account at a time against an injected cloud client.
pub struct Scanner {
    cloud: Arc<dyn CloudApi>,
    config: ScanConfig,
}

impl Scanner {
    pub fn new(cloud: Arc<dyn CloudApi>, config: ScanConfig) -> Result<Self, ScanError> {
        config.validate()?;
        Ok(Self { cloud, config })
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn cloud(&self) -> &Arc<dyn CloudApi> {
        &self.cloud
    }

    /// Run a complete scan.
    ///
    /// Everything short of losing authorization for the whole account ends
    /// up in the result's error list.
    pub async fn scan(&self, request: ScanRequest) -> Result<ScanResult, ScanFailure> {
        let regions = self.resolve_regions(request.regions)?;
        let resource_types = self.resolve_resource_types(request.resource_types)?;
        let retry = self.config.retry_policy();
        // A deadline too far out to represent is the same as none
        let deadline = self
            .config
            .deadline()
            .and_then(|d| Instant::now().checked_add(d));

        let cloud = match &request.role {
            None => Arc::clone(&self.cloud),
            Some(role) => {
                let assumed = retry
                    .run("AssumeRole", || {
                        self.cloud.assume_role(
                            &role.role_arn,
                            &role.session_name,
                            role.external_id.as_deref(),
                        )
                    })
                    .await;
                match assumed {
                    Ok(cloud) => cloud,
                    Err(err) if err.is_authorization() || err.kind == CloudErrorKind::NotFound => {
                        return Err(ScanFailure::unauthorized(&role.role_arn, &err))
                    }
                    Err(err) => return Err(ScanFailure::IdentityUnavailable(err)),
                }
            }
        };

        let identity = match retry
            .run("GetCallerIdentity", || cloud.caller_identity())
            .await
        {
            Ok(identity) => identity,
            Err(err) if err.is_authorization() => {
                let account = request.account_id.as_deref().unwrap_or("unknown");
                return Err(ScanFailure::unauthorized(account, &err));
            }
            Err(err) => return Err(ScanFailure::IdentityUnavailable(err)),
        };
        if let Some(expected) = &request.account_id {
            if expected != &identity.account {
                return Err(ScanFailure::InvalidRequest(format!(
                    "credentials resolve to account {} but {} was requested",
                    identity.account, expected
                )));
            }
        }
        let account_id = identity.account;

        info!(
            account = %account_id,
            regions = ?regions,
            resource_types = resource_types.len(),
            "Starting perimeter scan"
        );
        let mut acc = ScanAccumulator::new(account_id.clone(), regions.clone(), resource_types.clone());

        let ctx = Arc::new(UnitContext {
            cloud: Arc::clone(&cloud),
            retry,
            account_id: account_id.clone(),
            resource_types: resource_types.clone(),
        });
        let units = plan_units(&regions, &resource_types, &self.config.global_region);
        let Discovery {
            mut records,
            index,
            errors,
        } = self.discover(ctx, units, deadline, &account_id).await?;
        acc.extend_errors(errors);

        let direct = attach_direct(&mut records, &index);
        debug!(direct, records = records.len(), "Direct associations attached");

        let origin_index = self
            .build_origin_index(&cloud, retry, &account_id, &records, deadline, &mut acc)
            .await?;

        let mut matcher = OriginMatcher::new(Arc::clone(&cloud), retry);
        let tie_break = self.config.fronting_tie_break;
        let enrichment = enrich_fronting(&mut records, &origin_index, &mut matcher, tie_break);
        let enriched = match deadline {
            Some(deadline) => match timeout_at(deadline, enrichment).await {
                Ok(outcome) => Some(outcome),
                Err(_) => {
                    acc.record_error(ScanErrorRecord::error(
                        GLOBAL_REGION_LABEL,
                        None,
                        ErrorKind::DeadlineExceeded,
                        "deadline passed while matching resources to distribution origins",
                    ));
                    None
                }
            },
            None => Some(enrichment.await),
        };
        match enriched {
            Some(Ok(outcome)) => {
                debug!(fronted = outcome.fronted, "Fronted-by enrichment complete");
                acc.extend_errors(outcome.errors);
            }
            Some(Err(err)) => return Err(ScanFailure::unauthorized(&account_id, &err)),
            None => {}
        }

        for record in records {
            let compliance_status = classify(&record);
            acc.push(ClassifiedResource {
                record,
                compliance_status,
            });
        }

        let result = acc.finish();
        info!(
            account = %result.account_id(),
            total = result.counters().total,
            with_waf = result.counters().with_waf,
            non_compliant = result.counters().non_compliant,
            errors = result.errors().len(),
            compliance_rate = format!("{:.1}", result.compliance_rate()),
            "Perimeter scan complete"
        );
        Ok(result)
    }

    fn resolve_regions(&self, requested: Option<Vec<String>>) -> Result<Vec<String>, ScanFailure> {
        let raw = requested.unwrap_or_else(|| self.config.regions.clone());
        let mut regions: Vec<String> = Vec::new();
        for region in raw {
            let region = region.trim().to_string();
            if region.is_empty() {
                return Err(ScanFailure::InvalidRequest("empty region name".into()));
            }
            if !regions.contains(&region) {
                regions.push(region);
            }
        }
        if regions.is_empty() {
            return Err(ScanFailure::InvalidRequest("no regions requested".into()));
        }
        Ok(regions)
    }

    fn resolve_resource_types(
        &self,
        requested: Option<Vec<ResourceType>>,
    ) -> Result<Vec<ResourceType>, ScanFailure> {
        let raw = requested.unwrap_or_else(|| self.config.resource_types.clone());
        let mut types: Vec<ResourceType> = Vec::new();
        for rt in raw {
            if !types.contains(&rt) {
                types.push(rt);
            }
        }
        if types.is_empty() {
            return Err(ScanFailure::InvalidRequest("no resource types requested".into()));
        }
        Ok(types)
    }

    async fn discover(
        &self,
        ctx: Arc<UnitContext>,
        units: Vec<WorkUnit>,
        deadline: Option<Instant>,
        account_id: &str,
    ) -> Result<Discovery, ScanFailure> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut tasks = JoinSet::new();
        for (idx, unit) in units.iter().enumerate() {
            let ctx = Arc::clone(&ctx);
            let unit = unit.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                // Run the unit on its own task so a panic still reports which
                // unit it was.
                let mut task = UnitTask(tokio::spawn(run_unit(ctx, unit)));
                (idx, (&mut task.0).await)
            });
        }

        let mut pending: BTreeSet<usize> = (0..units.len()).collect();
        let mut outputs: Vec<Option<UnitOutput>> = (0..units.len()).map(|_| None).collect();
        let mut discovery = Discovery::default();
        let mut discovery_units = 0usize;
        let mut denied_units = 0usize;

        loop {
            let next = match deadline {
                Some(deadline) => match timeout_at(deadline, tasks.join_next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        tasks.abort_all();
                        for idx in &pending {
                            let unit = &units[*idx];
                            warn!(unit = %unit.describe(), "Deadline exceeded");
                            discovery.errors.push(ScanErrorRecord::error(
                                unit.error_region(),
                                unit.resource_type(),
                                ErrorKind::DeadlineExceeded,
                                format!("{} did not finish before the scan deadline", unit.describe()),
                            ));
                        }
                        break;
                    }
                },
                None => tasks.join_next().await,
            };
            let Some(joined) = next else { break };

            let (idx, joined_unit) = match joined {
                Ok(done) => done,
                Err(err) => {
                    error!(error = %err, "Discovery task failed");
                    discovery.errors.push(ScanErrorRecord::error(
                        GLOBAL_REGION_LABEL,
                        None,
                        ErrorKind::PartialDiscovery,
                        format!("discovery task failed: {}", err),
                    ));
                    continue;
                }
            };
            pending.remove(&idx);
            let unit = &units[idx];
            if matches!(unit.kind, UnitKind::Catalog(_)) {
                discovery_units += 1;
            }

            let outcome = match joined_unit {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!(unit = %unit.describe(), error = %err, "Discovery unit panicked");
                    discovery.errors.push(ScanErrorRecord::error(
                        unit.error_region(),
                        unit.resource_type(),
                        ErrorKind::PartialDiscovery,
                        format!("{} failed: {}", unit.describe(), err),
                    ));
                    continue;
                }
            };
            match outcome {
                Ok(output) => outputs[idx] = Some(output),
                Err(err) if err.is_fatal() => {
                    tasks.abort_all();
                    error!(unit = %unit.describe(), error = %err, "Credentials rejected, aborting scan");
                    return Err(ScanFailure::unauthorized(account_id, &err));
                }
                Err(err) => {
                    if err.kind == CloudErrorKind::AccessDenied && matches!(unit.kind, UnitKind::Catalog(_)) {
                        denied_units += 1;
                    }
                    warn!(unit = %unit.describe(), error = %err, "Discovery unit failed");
                    discovery.errors.push(ScanErrorRecord::from_cloud_error(
                        unit.error_region(),
                        unit.resource_type(),
                        &err,
                    ));
                }
            }
        }

        if discovery_units > 0 && denied_units == discovery_units {
            return Err(ScanFailure::Unauthorized {
                account: account_id.to_string(),
                message: "access denied for every resource listing".to_string(),
            });
        }

        // Merge in plan order so record order is stable across runs
        for output in outputs.into_iter().flatten() {
            match output {
                UnitOutput::Listing(listing) => {
                    discovery.records.extend(listing.records);
                    discovery.errors.extend(listing.dropped);
                }
                UnitOutput::Index(index) => discovery.index.merge(index),
            }
        }
        discovery.errors.append(&mut discovery.index.warnings);
        Ok(discovery)
    }

    async fn build_origin_index(
        &self,
        cloud: &Arc<dyn CloudApi>,
        retry: RetryPolicy,
        account_id: &str,
        records: &[ResourceRecord],
        deadline: Option<Instant>,
        acc: &mut ScanAccumulator,
    ) -> Result<OriginIndex, ScanFailure> {
        let needed = records
            .iter()
            .any(|r| !r.has_waf() && r.resource_type.can_be_fronted());
        if !needed {
            return Ok(OriginIndex::default());
        }

        let mut builder = OriginIndexBuilder::new(Arc::clone(cloud), retry, account_id);
        let built = match deadline {
            Some(deadline) => match timeout_at(deadline, builder.build()).await {
                Ok(built) => built,
                Err(_) => {
                    acc.record_error(ScanErrorRecord::error(
                        GLOBAL_REGION_LABEL,
                        Some(ResourceType::CloudfrontDistribution),
                        ErrorKind::DeadlineExceeded,
                        "origin index did not finish before the scan deadline",
                    ));
                    return Ok(OriginIndex::default());
                }
            },
            None => builder.build().await,
        };

        match built {
            Ok(build) => {
                acc.extend_errors(build.warnings);
                Ok(build.index)
            }
            Err(err) if err.is_fatal() => Err(ScanFailure::unauthorized(account_id, &err)),
            Err(err) => {
                warn!(error = %err, "Origin index unavailable; fronting will not be detected");
                acc.record_error(ScanErrorRecord::from_cloud_error(
                    GLOBAL_REGION_LABEL,
                    Some(ResourceType::CloudfrontDistribution),
                    &err,
                ));
                Ok(OriginIndex::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::{
        CallerIdentity, DistributionDetail, DistributionSummary, Page, ResourceSummary,
        WafBinding, WebAclSummary,
    };
    use crate::snapshot::SnapshotCloud;
    use async_trait::async_trait;
    use serde_json::json;

    /// Snapshot whose resource listing panics in one region.
    struct PanicsInRegion {
        inner: SnapshotCloud,
        region: &'static str,
    }

    #[async_trait]
    impl CloudApi for PanicsInRegion {
        async fn caller_identity(&self) -> CloudResult<CallerIdentity> {
            self.inner.caller_identity().await
        }

        async fn list_resources(
            &self,
            resource_type: ResourceType,
            region: &str,
            page_token: Option<&str>,
        ) -> CloudResult<Page<ResourceSummary>> {
            if region == self.region {
                panic!("listing {} blew up", region);
            }
            self.inner.list_resources(resource_type, region, page_token).await
        }

        async fn list_web_acls(
            &self,
            scope: WafScope,
            region: &str,
            page_token: Option<&str>,
        ) -> CloudResult<Page<WebAclSummary>> {
            self.inner.list_web_acls(scope, region, page_token).await
        }

        async fn list_resources_for_web_acl(
            &self,
            web_acl_arn: &str,
            region: &str,
            binding: WafBinding,
        ) -> CloudResult<Vec<String>> {
            self.inner
                .list_resources_for_web_acl(web_acl_arn, region, binding)
                .await
        }

        async fn list_distributions(
            &self,
            page_token: Option<&str>,
        ) -> CloudResult<Page<DistributionSummary>> {
            self.inner.list_distributions(page_token).await
        }

        async fn get_distribution(&self, id: &str) -> CloudResult<DistributionDetail> {
            self.inner.get_distribution(id).await
        }

        async fn load_balancer_dns_name(&self, arn: &str, region: &str) -> CloudResult<Option<String>> {
            self.inner.load_balancer_dns_name(arn, region).await
        }

        async fn assume_role(
            &self,
            role_arn: &str,
            session_name: &str,
            external_id: Option<&str>,
        ) -> CloudResult<Arc<dyn CloudApi>> {
            self.inner.assume_role(role_arn, session_name, external_id).await
        }
    }

    fn user_pool(id: &str) -> serde_json::Value {
        json!({"kind": "user_pool", "id": id, "name": id})
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicked_unit_reported_once_past_deadline() {
        let inventory = json!({
            "identity": {"account": "123456789012", "arn": "arn:aws:iam::123456789012:user/scanner", "user_id": "AIDA"},
            "regions": {
                "us-east-1": {"resources": [user_pool("us-east-1_a")], "web_acls": []},
                "eu-west-1": {"resources": [user_pool("eu-west-1_b")], "web_acls": []},
                "ap-south-1": {"resources": [user_pool("ap-south-1_c")], "web_acls": []}
            },
            "faults": [
                {"operation": "ListResources", "region": "ap-south-1", "delay_ms": 600000}
            ]
        });
        let cloud = PanicsInRegion {
            inner: SnapshotCloud::from_json_str(&inventory.to_string()).unwrap(),
            region: "eu-west-1",
        };
        let config = ScanConfig {
            regions: vec!["us-east-1".into(), "eu-west-1".into(), "ap-south-1".into()],
            resource_types: vec![ResourceType::CognitoUserPool],
            deadline_secs: Some(5),
            ..ScanConfig::default()
        };
        let scanner = Scanner::new(Arc::new(cloud), config).unwrap();
        let result = scanner.scan(ScanRequest::default()).await.unwrap();

        assert_eq!(result.resources().len(), 1);
        let failed: Vec<_> = result
            .errors()
            .iter()
            .filter(|e| e.region == "eu-west-1")
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].kind, ErrorKind::PartialDiscovery);
        assert_eq!(failed[0].resource_type, Some(ResourceType::CognitoUserPool));

        let late: Vec<_> = result
            .errors()
            .iter()
            .filter(|e| e.kind == ErrorKind::DeadlineExceeded)
            .collect();
        assert_eq!(late.len(), 1);
        assert_eq!(late[0].region, "ap-south-1");
    }

    #[test]
    fn test_plan_units_per_region_then_global() {
        let regions = vec!["us-east-1".to_string(), "eu-west-1".to_string()];
        let types = vec![
            ResourceType::ApplicationLoadBalancer,
            ResourceType::CloudfrontDistribution,
            ResourceType::ApiGatewayHttpApi,
        ];
        let units = plan_units(&regions, &types, "us-east-1");
        let kinds: Vec<_> = units.iter().map(|u| (u.region.as_str(), u.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                ("us-east-1", UnitKind::Catalog(ResourceType::ApplicationLoadBalancer)),
                ("us-east-1", UnitKind::Catalog(ResourceType::ApiGatewayHttpApi)),
                ("us-east-1", UnitKind::WafIndex(WafScope::Regional)),
                ("eu-west-1", UnitKind::Catalog(ResourceType::ApplicationLoadBalancer)),
                ("eu-west-1", UnitKind::Catalog(ResourceType::ApiGatewayHttpApi)),
                ("eu-west-1", UnitKind::WafIndex(WafScope::Regional)),
                ("us-east-1", UnitKind::Catalog(ResourceType::CloudfrontDistribution)),
                ("us-east-1", UnitKind::WafIndex(WafScope::Global)),
            ]
        );
    }

    #[test]
    fn test_plan_skips_index_when_nothing_can_bind() {
        let units = plan_units(
            &["us-east-1".to_string()],
            &[ResourceType::ApiGatewayHttpApi],
            "us-east-1",
        );
        assert_eq!(units.len(), 1);
        assert!(matches!(units[0].kind, UnitKind::Catalog(_)));
    }

    #[test]
    fn test_global_units_report_global_region() {
        let unit = WorkUnit {
            region: "us-east-1".into(),
            kind: UnitKind::Catalog(ResourceType::CloudfrontDistribution),
        };
        assert_eq!(unit.error_region(), "global");
        let unit = WorkUnit {
            region: "eu-west-1".into(),
            kind: UnitKind::Catalog(ResourceType::CognitoUserPool),
        };
        assert_eq!(unit.error_region(), "eu-west-1");
    }
}
