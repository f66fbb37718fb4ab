//! The cloud provider port.
//!
//! Everything the scanner knows about the provider goes through
//! [`CloudApi`]. Adapters translate their native responses into the plain
//! shapes below and their native failures into [`CloudError`].

use crate::error::{CloudError, CloudErrorKind};
use crate::retry::RetryPolicy;
use crate::types::{ResourceType, WafScope};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

pub type CloudResult<T> = std::result::Result<T, CloudError>;

/// One page of a paginated listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_token: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub account: String,
    pub arn: String,
    pub user_id: String,
}

/// Provider-shaped listing entry, one variant per resource family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceSummary {
    LoadBalancer {
        arn: String,
        name: String,
        #[serde(default)]
        dns_name: Option<String>,
        /// `internet-facing` or `internal`
        #[serde(default)]
        scheme: Option<String>,
        /// `application`, `network` or `gateway`
        #[serde(rename = "type", default = "default_load_balancer_type")]
        load_balancer_type: String,
    },
    Distribution {
        id: String,
        arn: String,
        domain_name: String,
        #[serde(default)]
        web_acl_id: Option<String>,
    },
    RestApi {
        id: String,
        #[serde(default)]
        name: Option<String>,
        /// `EDGE`, `REGIONAL` or `PRIVATE`
        #[serde(default)]
        endpoint_types: Vec<String>,
    },
    HttpApi {
        api_id: String,
        #[serde(default)]
        name: Option<String>,
    },
    GraphqlApi {
        arn: String,
        #[serde(default)]
        name: Option<String>,
    },
    UserPool {
        id: String,
        #[serde(default)]
        name: Option<String>,
    },
    AppRunnerService {
        arn: String,
        #[serde(default)]
        name: Option<String>,
    },
    VerifiedAccessInstance {
        id: String,
        #[serde(default)]
        tags: BTreeMap<String, String>,
    },
}

fn default_load_balancer_type() -> String {
    "application".to_string()
}

impl ResourceSummary {
    /// Resource family this entry belongs to
    pub fn resource_type(&self) -> ResourceType {
        match self {
            Self::LoadBalancer { .. } => ResourceType::ApplicationLoadBalancer,
            Self::Distribution { .. } => ResourceType::CloudfrontDistribution,
            Self::RestApi { .. } => ResourceType::ApiGatewayRestApi,
            Self::HttpApi { .. } => ResourceType::ApiGatewayHttpApi,
            Self::GraphqlApi { .. } => ResourceType::AppsyncGraphqlApi,
            Self::UserPool { .. } => ResourceType::CognitoUserPool,
            Self::AppRunnerService { .. } => ResourceType::AppRunnerService,
            Self::VerifiedAccessInstance { .. } => ResourceType::VerifiedAccessInstance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebAclSummary {
    pub arn: String,
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub managed_by_firewall_manager: bool,
}

/// Resource family queried when listing a Web ACL's associations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WafBinding {
    ApplicationLoadBalancer,
    ApiGateway,
    #[serde(rename = "APPSYNC")]
    AppSync,
    CognitoUserPool,
    AppRunnerService,
    VerifiedAccessInstance,
    /// CDN distributions (global Web ACLs only)
    Distribution,
}

impl WafBinding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApplicationLoadBalancer => "APPLICATION_LOAD_BALANCER",
            Self::ApiGateway => "API_GATEWAY",
            Self::AppSync => "APPSYNC",
            Self::CognitoUserPool => "COGNITO_USER_POOL",
            Self::AppRunnerService => "APP_RUNNER_SERVICE",
            Self::VerifiedAccessInstance => "VERIFIED_ACCESS_INSTANCE",
            Self::Distribution => "DISTRIBUTION",
        }
    }

    pub fn for_resource_type(resource_type: ResourceType) -> Self {
        match resource_type {
            ResourceType::ApplicationLoadBalancer => Self::ApplicationLoadBalancer,
            ResourceType::CloudfrontDistribution => Self::Distribution,
            ResourceType::ApiGatewayRestApi | ResourceType::ApiGatewayHttpApi => Self::ApiGateway,
            ResourceType::AppsyncGraphqlApi => Self::AppSync,
            ResourceType::CognitoUserPool => Self::CognitoUserPool,
            ResourceType::AppRunnerService => Self::AppRunnerService,
            ResourceType::VerifiedAccessInstance => Self::VerifiedAccessInstance,
        }
    }

    /// Bindings worth querying in `scope` for the requested types, deduplicated, in order.
    pub fn for_scope(scope: WafScope, resource_types: &[ResourceType]) -> Vec<Self> {
        let mut bindings = Vec::new();
        for rt in resource_types.iter().filter(|rt| rt.waf_scope() == scope) {
            if !rt.supports_direct_waf() {
                continue;
            }
            let binding = Self::for_resource_type(*rt);
            if !bindings.contains(&binding) {
                bindings.push(binding);
            }
        }
        bindings
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionSummary {
    pub id: String,
    pub arn: String,
    pub domain_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionOrigin {
    #[serde(default)]
    pub id: Option<String>,
    pub domain_name: String,
}

/// Full distribution configuration, as needed for origin matching
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionDetail {
    pub id: String,
    pub arn: String,
    pub domain_name: String,
    /// ARN of the bound global Web ACL, if any
    #[serde(default)]
    pub web_acl_id: Option<String>,
    #[serde(default)]
    pub origins: Vec<DistributionOrigin>,
}

/// Read-only discovery operations against one account.
#[async_trait]
pub trait CloudApi: Send + Sync {
    async fn caller_identity(&self) -> CloudResult<CallerIdentity>;

    async fn list_resources(
        &self,
        resource_type: ResourceType,
        region: &str,
        page_token: Option<&str>,
    ) -> CloudResult<Page<ResourceSummary>>;

    async fn list_web_acls(
        &self,
        scope: WafScope,
        region: &str,
        page_token: Option<&str>,
    ) -> CloudResult<Page<WebAclSummary>>;

    /// ARNs of the `binding` resources associated with one Web ACL.
    async fn list_resources_for_web_acl(
        &self,
        web_acl_arn: &str,
        region: &str,
        binding: WafBinding,
    ) -> CloudResult<Vec<String>>;

    async fn list_distributions(
        &self,
        page_token: Option<&str>,
    ) -> CloudResult<Page<DistributionSummary>>;

    async fn get_distribution(&self, id: &str) -> CloudResult<DistributionDetail>;

    async fn load_balancer_dns_name(&self, arn: &str, region: &str) -> CloudResult<Option<String>>;

    /// A client scoped to another account's role.
    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
        external_id: Option<&str>,
    ) -> CloudResult<Arc<dyn CloudApi>>;
}

/// Walk every page of a listing, retrying each page call under `policy`.
pub(crate) async fn collect_pages<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut fetch: F,
) -> CloudResult<Vec<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = CloudResult<Page<T>>>,
{
    let mut items = Vec::new();
    let mut token: Option<String> = None;
    loop {
        let page = policy.run(operation, || fetch(token.clone())).await?;
        items.extend(page.items);
        match page.next_token {
            Some(next) if token.as_deref() == Some(next.as_str()) => {
                return Err(CloudError::new(
                    CloudErrorKind::Malformed,
                    operation,
                    format!("pagination token '{}' repeated", next),
                ));
            }
            Some(next) => token = Some(next),
            None => return Ok(items),
        }
    }
}
