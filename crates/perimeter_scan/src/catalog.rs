//! Resource discovery: one resource type in one region at a time.

use crate::arn::Arn;
use crate::cloud::{collect_pages, CloudApi, CloudResult, ResourceSummary};
use crate::error::ArnError;
use crate::result::{ErrorKind, ScanErrorRecord};
use crate::retry::RetryPolicy;
use crate::types::{ResourceRecord, ResourceType, WebAclRef};
use std::sync::Arc;
use tracing::{debug, warn};

/// Region label used for account-global resources
pub const GLOBAL_REGION_LABEL: &str = "global";

/// Records discovered for one (type, region) pair
#[derive(Debug, Default)]
pub struct Listing {
    pub records: Vec<ResourceRecord>,
    /// Entries dropped because the provider data could not be interpreted
    pub dropped: Vec<ScanErrorRecord>,
}

pub struct ResourceCatalog {
    cloud: Arc<dyn CloudApi>,
    retry: RetryPolicy,
    account_id: String,
}

impl ResourceCatalog {
    pub fn new(cloud: Arc<dyn CloudApi>, retry: RetryPolicy, account_id: impl Into<String>) -> Self {
        Self {
            cloud,
            retry,
            account_id: account_id.into(),
        }
    }

    /// List every resource of `resource_type` in `region`, walking all pages.
    ///
    /// Provider failures are returned to the caller, who decides whether
    /// they are fatal. Individual malformed entries never fail the listing.
    pub async fn list(&self, resource_type: ResourceType, region: &str) -> CloudResult<Listing> {
        let cloud = self.cloud.as_ref();
        let operation = format!("List{}", resource_type.as_str());
        let summaries = collect_pages(&self.retry, &operation, |token| async move {
            cloud
                .list_resources(resource_type, region, token.as_deref())
                .await
        })
        .await?;

        let record_region = if resource_type.is_global() {
            GLOBAL_REGION_LABEL
        } else {
            region
        };

        let mut listing = Listing::default();
        for summary in summaries {
            if summary.resource_type() != resource_type {
                listing.dropped.push(ScanErrorRecord::error(
                    record_region,
                    Some(resource_type),
                    ErrorKind::MalformedData,
                    format!(
                        "{} listing returned a {} entry",
                        resource_type,
                        summary.resource_type()
                    ),
                ));
                continue;
            }
            match to_record(summary, record_region, &self.account_id) {
                Ok(Some(record)) => listing.records.push(record),
                Ok(None) => {}
                Err(err) => {
                    warn!(region = record_region, resource_type = %resource_type, error = %err, "Dropping malformed resource");
                    listing.dropped.push(ScanErrorRecord::error(
                        record_region,
                        Some(resource_type),
                        ErrorKind::MalformedData,
                        err.to_string(),
                    ));
                }
            }
        }

        debug!(
            region = record_region,
            resource_type = %resource_type,
            found = listing.records.len(),
            dropped = listing.dropped.len(),
            "Catalog listing complete"
        );
        Ok(listing)
    }
}

/// Turn one provider entry into an unenriched record.
///
/// `Ok(None)` means the entry is valid but out of scope (non-application
/// load balancers).
pub fn to_record(
    summary: ResourceSummary,
    region: &str,
    account_id: &str,
) -> Result<Option<ResourceRecord>, ArnError> {
    let record = match summary {
        ResourceSummary::LoadBalancer {
            arn,
            name,
            scheme,
            load_balancer_type,
            ..
        } => {
            if load_balancer_type != "application" {
                return Ok(None);
            }
            let account = account_from_arn(&arn, "elasticloadbalancing", account_id)?;
            let is_public = scheme.as_deref() == Some("internet-facing");
            ResourceRecord::new(
                arn,
                ResourceType::ApplicationLoadBalancer,
                region,
                account,
                Some(name),
                is_public,
            )
        }
        ResourceSummary::Distribution {
            arn,
            domain_name,
            web_acl_id,
            ..
        } => {
            let account = account_from_arn(&arn, "cloudfront", account_id)?;
            let mut record = ResourceRecord::new(
                arn,
                ResourceType::CloudfrontDistribution,
                GLOBAL_REGION_LABEL,
                account,
                Some(domain_name),
                true,
            );
            // The distribution config names its own Web ACL; keep it even if
            // the global association listing later fails.
            if let Some(raw) = web_acl_id.as_deref().filter(|s| !s.is_empty()) {
                match WebAclRef::from_arn(raw) {
                    Ok(acl) => {
                        if let Err(err) = record.attach_web_acl(acl) {
                            warn!(resource = %record.arn, error = %err, "Distribution Web ACL rejected");
                        }
                    }
                    Err(err) => {
                        debug!(resource = %record.arn, web_acl_id = raw, error = %err, "Distribution Web ACL id is not an ARN");
                    }
                }
            }
            record
        }
        ResourceSummary::RestApi {
            id,
            name,
            endpoint_types,
        } => {
            check_id(&id, "REST API")?;
            let is_private = !endpoint_types.is_empty()
                && endpoint_types.iter().all(|t| t.eq_ignore_ascii_case("PRIVATE"));
            ResourceRecord::new(
                format!("arn:aws:apigateway:{}::/restapis/{}", region, id),
                ResourceType::ApiGatewayRestApi,
                region,
                account_id,
                name,
                !is_private,
            )
        }
        ResourceSummary::HttpApi { api_id, name } => {
            check_id(&api_id, "HTTP API")?;
            ResourceRecord::new(
                format!("arn:aws:apigateway:{}::/apis/{}", region, api_id),
                ResourceType::ApiGatewayHttpApi,
                region,
                account_id,
                name,
                true,
            )
        }
        ResourceSummary::GraphqlApi { arn, name } => {
            let account = account_from_arn(&arn, "appsync", account_id)?;
            ResourceRecord::new(
                arn,
                ResourceType::AppsyncGraphqlApi,
                region,
                account,
                name,
                true,
            )
        }
        ResourceSummary::UserPool { id, name } => {
            check_id(&id, "user pool")?;
            ResourceRecord::new(
                format!("arn:aws:cognito-idp:{}:{}:userpool/{}", region, account_id, id),
                ResourceType::CognitoUserPool,
                region,
                account_id,
                name,
                true,
            )
        }
        ResourceSummary::AppRunnerService { arn, name } => {
            let account = account_from_arn(&arn, "apprunner", account_id)?;
            ResourceRecord::new(
                arn,
                ResourceType::AppRunnerService,
                region,
                account,
                name,
                true,
            )
        }
        ResourceSummary::VerifiedAccessInstance { id, tags } => {
            check_id(&id, "Verified Access instance")?;
            let name = tags.get("Name").cloned();
            ResourceRecord::new(
                format!(
                    "arn:aws:ec2:{}:{}:verified-access-instance/{}",
                    region, account_id, id
                ),
                ResourceType::VerifiedAccessInstance,
                region,
                account_id,
                name,
                true,
            )
            .with_tags(tags)
        }
    };
    Ok(Some(record))
}

/// Validate a provider ARN and take its account, falling back to the caller's.
fn account_from_arn(raw: &str, service: &str, fallback: &str) -> Result<String, ArnError> {
    let arn = Arn::parse(raw)?;
    if arn.service != service {
        return Err(ArnError::new(
            raw,
            format!("expected service '{}', found '{}'", service, arn.service),
        ));
    }
    if arn.account.is_empty() {
        Ok(fallback.to_string())
    } else {
        Ok(arn.account)
    }
}

fn check_id(id: &str, what: &str) -> Result<(), ArnError> {
    if id.is_empty() || id.contains(['/', ':']) || id.chars().any(char::is_whitespace) {
        return Err(ArnError::new(id, format!("invalid {} identifier", what)));
    }
    Ok(())
}
