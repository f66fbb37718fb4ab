//! Distribution origins and the resource -> origin-domain matcher.
//!
//! The origin index is account-wide and built once per scan. The matcher is
//! pure for API Gateway resources (the hostname follows from the API id and
//! region) and needs one memoized lookup for load balancers.

use crate::arn::{distribution_arn, Arn};
use crate::catalog::GLOBAL_REGION_LABEL;
use crate::cloud::{collect_pages, CloudApi, CloudResult, DistributionDetail};
use crate::error::{CloudError, CloudErrorKind};
use crate::result::{ErrorKind, ScanErrorRecord};
use crate::retry::RetryPolicy;
use crate::types::{ResourceRecord, ResourceType, WafScope, WebAclRef};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

// ============================================================================
// Origin index
// ============================================================================

/// One distribution forwarding to an origin domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginEntry {
    pub distribution_arn: String,
    pub distribution_id: String,
    pub distribution_domain: String,
    pub web_acl: Option<WebAclRef>,
}

/// Origin domain -> distributions, in the order distributions were listed
#[derive(Debug, Default, Clone)]
pub struct OriginIndex {
    entries: HashMap<String, Vec<OriginEntry>>,
    distributions: usize,
}

impl OriginIndex {
    pub fn lookup(&self, domain: &str) -> &[OriginEntry] {
        self.entries
            .get(&normalize_domain(domain))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of distinct origin domains
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn distributions(&self) -> usize {
        self.distributions
    }

    /// Index one distribution's origins. S3 origins are skipped.
    pub fn insert_distribution(&mut self, detail: &DistributionDetail, entry: OriginEntry) {
        self.distributions += 1;
        for origin in &detail.origins {
            let domain = normalize_domain(&origin.domain_name);
            if domain.is_empty() || is_s3_origin(&domain) {
                continue;
            }
            let list = self.entries.entry(domain).or_default();
            if !list
                .iter()
                .any(|e| e.distribution_id == entry.distribution_id)
            {
                list.push(entry.clone());
            }
        }
    }
}

/// Index plus problems met while building it
#[derive(Debug, Default)]
pub struct OriginIndexBuild {
    pub index: OriginIndex,
    pub warnings: Vec<ScanErrorRecord>,
}

/// Builds the origin index, caching distribution details for its lifetime.
pub struct OriginIndexBuilder {
    cloud: Arc<dyn CloudApi>,
    retry: RetryPolicy,
    account_id: String,
    details: HashMap<String, DistributionDetail>,
}

impl OriginIndexBuilder {
    pub fn new(cloud: Arc<dyn CloudApi>, retry: RetryPolicy, account_id: impl Into<String>) -> Self {
        Self {
            cloud,
            retry,
            account_id: account_id.into(),
            details: HashMap::new(),
        }
    }

    /// Fetch a distribution's configuration once; later calls hit the cache.
    pub async fn distribution(&mut self, id: &str) -> CloudResult<&DistributionDetail> {
        if !self.details.contains_key(id) {
            let cloud = self.cloud.as_ref();
            let detail = self
                .retry
                .run("GetDistribution", || cloud.get_distribution(id))
                .await?;
            self.details.insert(id.to_string(), detail);
        }
        self.details.get(id).ok_or_else(|| {
            CloudError::new(
                CloudErrorKind::NotFound,
                "GetDistribution",
                format!("distribution {} missing from cache", id),
            )
        })
    }

    /// Enumerate every distribution once and index its origins.
    pub async fn build(&mut self) -> CloudResult<OriginIndexBuild> {
        let cloud = self.cloud.as_ref();
        let summaries = collect_pages(&self.retry, "ListDistributions", |token| async move {
            cloud.list_distributions(token.as_deref()).await
        })
        .await?;

        let mut build = OriginIndexBuild::default();
        for summary in summaries {
            let detail = match self.distribution(&summary.id).await {
                Ok(detail) => detail.clone(),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!(distribution = %summary.id, error = %err, "Skipping distribution");
                    build
                        .warnings
                        .push(ScanErrorRecord::from_cloud_error(GLOBAL_REGION_LABEL, None, &err));
                    continue;
                }
            };

            let web_acl = match detail.web_acl_id.as_deref().filter(|s| !s.is_empty()) {
                None => None,
                Some(raw) => match WebAclRef::from_arn(raw) {
                    Ok(acl) if acl.scope == WafScope::Global => Some(acl),
                    Ok(acl) => {
                        build.warnings.push(ScanErrorRecord::warning(
                            GLOBAL_REGION_LABEL,
                            Some(ResourceType::CloudfrontDistribution),
                            ErrorKind::MalformedData,
                            format!(
                                "distribution {} references {} Web ACL {}",
                                detail.id, acl.scope, raw
                            ),
                        ));
                        None
                    }
                    Err(err) => {
                        build.warnings.push(ScanErrorRecord::warning(
                            GLOBAL_REGION_LABEL,
                            Some(ResourceType::CloudfrontDistribution),
                            ErrorKind::MalformedData,
                            err.to_string(),
                        ));
                        None
                    }
                },
            };

            let arn = match Arn::parse(&detail.arn) {
                Ok(arn) if arn.service == "cloudfront" => detail.arn.clone(),
                _ => distribution_arn(&self.account_id, &detail.id),
            };
            let entry = OriginEntry {
                distribution_arn: arn,
                distribution_id: detail.id.clone(),
                distribution_domain: summary.domain_name.clone(),
                web_acl,
            };
            build.index.insert_distribution(&detail, entry);
        }

        info!(
            origins = build.index.len(),
            distributions = build.index.distributions(),
            "Origin index built"
        );
        Ok(build)
    }
}

fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_end_matches('.').to_ascii_lowercase()
}

fn is_s3_origin(domain: &str) -> bool {
    domain.contains(".s3.") || domain.contains(".s3-")
}

// ============================================================================
// Origin matcher
// ============================================================================

/// Hostname a distribution would use to reach `record`, when it follows
/// from the record alone. Load balancers need a lookup and return `None` here.
pub fn derive_origin_domain(record: &ResourceRecord) -> Option<String> {
    let marker = match record.resource_type {
        ResourceType::ApiGatewayHttpApi => "/apis/",
        ResourceType::ApiGatewayRestApi => "/restapis/",
        _ => return None,
    };
    let (_, tail) = record.arn.split_once(marker)?;
    let api_id = tail.split('/').next().filter(|id| !id.is_empty())?;
    Some(format!(
        "{}.execute-api.{}.amazonaws.com",
        api_id.to_ascii_lowercase(),
        record.region
    ))
}

/// Maps resources to origin domains, memoizing load balancer DNS lookups.
pub struct OriginMatcher {
    cloud: Arc<dyn CloudApi>,
    retry: RetryPolicy,
    dns_names: HashMap<String, Option<String>>,
}

impl OriginMatcher {
    pub fn new(cloud: Arc<dyn CloudApi>, retry: RetryPolicy) -> Self {
        Self {
            cloud,
            retry,
            dns_names: HashMap::new(),
        }
    }

    pub async fn origin_domain_for(&mut self, record: &ResourceRecord) -> CloudResult<Option<String>> {
        match record.resource_type {
            ResourceType::ApplicationLoadBalancer => self.load_balancer_dns(record).await,
            _ => Ok(derive_origin_domain(record)),
        }
    }

    async fn load_balancer_dns(&mut self, record: &ResourceRecord) -> CloudResult<Option<String>> {
        if let Some(cached) = self.dns_names.get(&record.arn) {
            return Ok(cached.clone());
        }
        let cloud = self.cloud.as_ref();
        let dns = self
            .retry
            .run("DescribeLoadBalancers", || {
                cloud.load_balancer_dns_name(&record.arn, &record.region)
            })
            .await?
            .map(|name| normalize_domain(&name));
        debug!(load_balancer = %record.arn, dns = ?dns, "Resolved load balancer DNS name");
        self.dns_names.insert(record.arn.clone(), dns.clone());
        Ok(dns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::DistributionOrigin;
    use crate::snapshot::{SnapshotCloud, OP_DESCRIBE_LOAD_BALANCERS};

    fn record(arn: &str, resource_type: ResourceType, region: &str) -> ResourceRecord {
        ResourceRecord::new(arn, resource_type, region, "123456789012", None, true)
    }

    fn detail(id: &str, origins: &[&str]) -> DistributionDetail {
        DistributionDetail {
            id: id.to_string(),
            arn: format!("arn:aws:cloudfront::123456789012:distribution/{}", id),
            domain_name: format!("{}.cloudfront.net", id.to_lowercase()),
            web_acl_id: None,
            origins: origins
                .iter()
                .map(|d| DistributionOrigin {
                    id: None,
                    domain_name: d.to_string(),
                })
                .collect(),
        }
    }

    fn entry(id: &str) -> OriginEntry {
        OriginEntry {
            distribution_arn: format!("arn:aws:cloudfront::123456789012:distribution/{}", id),
            distribution_id: id.to_string(),
            distribution_domain: format!("{}.cloudfront.net", id),
            web_acl: None,
        }
    }

    #[test]
    fn test_derive_http_and_rest_domains() {
        let http = record(
            "arn:aws:apigateway:us-east-1::/apis/o5yl95v1g1",
            ResourceType::ApiGatewayHttpApi,
            "us-east-1",
        );
        assert_eq!(
            derive_origin_domain(&http).as_deref(),
            Some("o5yl95v1g1.execute-api.us-east-1.amazonaws.com")
        );

        let rest = record(
            "arn:aws:apigateway:eu-west-1::/restapis/1jnx7rksc5",
            ResourceType::ApiGatewayRestApi,
            "eu-west-1",
        );
        assert_eq!(
            derive_origin_domain(&rest).as_deref(),
            Some("1jnx7rksc5.execute-api.eu-west-1.amazonaws.com")
        );
    }

    #[test]
    fn test_derive_returns_none_for_unfrontable_types() {
        let pool = record(
            "arn:aws:cognito-idp:us-east-1:123456789012:userpool/us-east-1_x",
            ResourceType::CognitoUserPool,
            "us-east-1",
        );
        assert!(derive_origin_domain(&pool).is_none());

        let alb = record(
            "arn:aws:elasticloadbalancing:us-east-1:123456789012:loadbalancer/app/a/1",
            ResourceType::ApplicationLoadBalancer,
            "us-east-1",
        );
        assert!(derive_origin_domain(&alb).is_none());

        let broken = record("arn:aws:apigateway:us-east-1::/apis/", ResourceType::ApiGatewayHttpApi, "us-east-1");
        assert!(derive_origin_domain(&broken).is_none());
    }

    #[test]
    fn test_index_skips_s3_and_keeps_order() {
        let mut index = OriginIndex::default();
        index.insert_distribution(
            &detail("E2", &["api.example.com", "assets.s3.amazonaws.com", "logs.s3-us-west-2.amazonaws.com"]),
            entry("E2"),
        );
        index.insert_distribution(&detail("E1", &["API.example.com."]), entry("E1"));

        assert_eq!(index.distributions(), 2);
        assert_eq!(index.len(), 1);
        let ids: Vec<_> = index
            .lookup("api.example.com")
            .iter()
            .map(|e| e.distribution_id.as_str())
            .collect();
        assert_eq!(ids, vec!["E2", "E1"]);
        assert!(index.lookup("assets.s3.amazonaws.com").is_empty());
    }

    #[test]
    fn test_index_dedupes_repeated_origin_within_distribution() {
        let mut index = OriginIndex::default();
        index.insert_distribution(&detail("E1", &["a.example.com", "a.example.com"]), entry("E1"));
        assert_eq!(index.lookup("a.example.com").len(), 1);
    }

    fn snapshot_with_load_balancer() -> Arc<SnapshotCloud> {
        let inventory = serde_json::json!({
            "identity": {"account": "123456789012", "arn": "arn:aws:iam::123456789012:user/scanner", "user_id": "AIDA"},
            "regions": {
                "us-east-1": {
                    "resources": [{
                        "kind": "load_balancer",
                        "arn": LB_ARN,
                        "name": "web",
                        "dns_name": "WEB-1234567890.us-east-1.elb.amazonaws.com.",
                        "scheme": "internet-facing"
                    }]
                }
            }
        });
        Arc::new(SnapshotCloud::from_json_str(&inventory.to_string()).unwrap())
    }

    const LB_ARN: &str =
        "arn:aws:elasticloadbalancing:us-east-1:123456789012:loadbalancer/app/web/50dc6c495c0c9188";

    #[tokio::test]
    async fn test_matcher_looks_up_each_load_balancer_once() {
        let snapshot = snapshot_with_load_balancer();
        let mut matcher = OriginMatcher::new(snapshot.clone(), RetryPolicy::default());
        let lb = record(LB_ARN, ResourceType::ApplicationLoadBalancer, "us-east-1");

        let first = matcher.origin_domain_for(&lb).await.unwrap();
        let second = matcher.origin_domain_for(&lb).await.unwrap();
        assert_eq!(first.as_deref(), Some("web-1234567890.us-east-1.elb.amazonaws.com"));
        assert_eq!(first, second);
        assert_eq!(snapshot.call_count(OP_DESCRIBE_LOAD_BALANCERS), 1);
    }

    #[tokio::test]
    async fn test_matcher_derives_api_domains_without_lookups() {
        let snapshot = snapshot_with_load_balancer();
        let mut matcher = OriginMatcher::new(snapshot.clone(), RetryPolicy::default());
        let api = record(
            "arn:aws:apigateway:eu-west-1::/apis/o5yl95v1g1",
            ResourceType::ApiGatewayHttpApi,
            "eu-west-1",
        );

        let domain = matcher.origin_domain_for(&api).await.unwrap();
        assert_eq!(domain.as_deref(), Some("o5yl95v1g1.execute-api.eu-west-1.amazonaws.com"));
        assert_eq!(snapshot.call_count(OP_DESCRIBE_LOAD_BALANCERS), 0);
    }
}
