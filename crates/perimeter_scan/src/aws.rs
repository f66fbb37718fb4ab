//! Live provider adapter on the AWS SDK.
//!
//! Every call builds a client for the region it targets from one shared
//! `SdkConfig`. CDN and global Web ACL calls always go to us-east-1.

use crate::cloud::{
    CallerIdentity, CloudApi, CloudResult, DistributionDetail, DistributionOrigin,
    DistributionSummary, Page, ResourceSummary, WafBinding, WebAclSummary,
};
use crate::error::{CloudError, CloudErrorKind};
use crate::types::{ResourceType, WafScope};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_credential_types::Credentials;
use aws_sdk_apigateway as apigateway;
use aws_sdk_apigatewayv2 as apigatewayv2;
use aws_sdk_apprunner as apprunner;
use aws_sdk_appsync as appsync;
use aws_sdk_cloudfront as cloudfront;
use aws_sdk_cognitoidentityprovider as cognito;
use aws_sdk_ec2 as ec2;
use aws_sdk_elasticloadbalancingv2 as elbv2;
use aws_sdk_sts as sts;
use aws_sdk_sts::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_wafv2 as wafv2;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info};

/// Region serving CloudFront and CLOUDFRONT-scope Web ACLs
pub const CLOUDFRONT_REGION: &str = "us-east-1";

const CREDENTIALS_PROVIDER: &str = "PerimeterGuardAssumeRole";

// ============================================================================
// Reading SDK shapes
// ============================================================================

/// Required members come back as `&T`, optional ones as `Option<&T>`.
trait Member<'a, T: ?Sized> {
    fn member(self) -> Option<&'a T>;
}

impl<'a, T: ?Sized> Member<'a, T> for &'a T {
    fn member(self) -> Option<&'a T> {
        Some(self)
    }
}

impl<'a, T: ?Sized> Member<'a, T> for Option<&'a T> {
    fn member(self) -> Option<&'a T> {
        self
    }
}

fn part<'a, T: ?Sized>(value: impl Member<'a, T>) -> Option<&'a T> {
    value.member()
}

fn text<'a>(value: impl Member<'a, str>) -> String {
    value.member().unwrap_or_default().to_string()
}

fn opt_text<'a>(value: impl Member<'a, str>) -> Option<String> {
    value
        .member()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn list<'a, T>(value: impl Member<'a, [T]>) -> &'a [T] {
    value.member().unwrap_or_default()
}

// ============================================================================
// Errors
// ============================================================================

/// Provider error code -> scanner error kind
pub fn kind_for_code(code: &str) -> CloudErrorKind {
    match code {
        "Throttling"
        | "ThrottlingException"
        | "ThrottledException"
        | "TooManyRequestsException"
        | "RequestLimitExceeded" => CloudErrorKind::Throttled,
        "InvalidClientTokenId"
        | "ExpiredToken"
        | "ExpiredTokenException"
        | "UnrecognizedClientException"
        | "SignatureDoesNotMatch"
        | "InvalidSignatureException"
        | "AuthFailure" => CloudErrorKind::InvalidCredentials,
        "UnauthorizedOperation" | "UnauthorizedException" | "NotAuthorizedException" => {
            CloudErrorKind::AccessDenied
        }
        c if c.starts_with("AccessDenied") => CloudErrorKind::AccessDenied,
        c if c.contains("NotFound") || c.starts_with("NoSuch") => CloudErrorKind::NotFound,
        "WAFNonexistentItemException" => CloudErrorKind::NotFound,
        _ => CloudErrorKind::Service,
    }
}

fn sdk_error<E, R>(operation: &str, err: SdkError<E, R>) -> CloudError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let message = DisplayErrorContext(&err).to_string();
    let kind = match err.code() {
        Some(code) => kind_for_code(code),
        // No service response: credential resolution or transport failed
        None if message.to_ascii_lowercase().contains("credentials") => {
            CloudErrorKind::InvalidCredentials
        }
        None => CloudErrorKind::Service,
    };
    CloudError::new(kind, operation, message)
}

// ============================================================================
// Response mapping
// ============================================================================

fn load_balancer_summary(lb: &elbv2::types::LoadBalancer) -> ResourceSummary {
    ResourceSummary::LoadBalancer {
        arn: text(lb.load_balancer_arn()),
        name: text(lb.load_balancer_name()),
        dns_name: opt_text(lb.dns_name()),
        scheme: part(lb.scheme()).map(|s| s.as_str().to_string()),
        load_balancer_type: part(lb.r#type())
            .map(|t| t.as_str().to_string())
            .unwrap_or_default(),
    }
}

fn rest_api_summary(api: &apigateway::types::RestApi) -> ResourceSummary {
    ResourceSummary::RestApi {
        id: text(api.id()),
        name: opt_text(api.name()),
        endpoint_types: part(api.endpoint_configuration())
            .map(|config| {
                list(config.types())
                    .iter()
                    .map(|t| t.as_str().to_string())
                    .collect()
            })
            .unwrap_or_default(),
    }
}

fn verified_access_summary(instance: &ec2::types::VerifiedAccessInstance) -> ResourceSummary {
    ResourceSummary::VerifiedAccessInstance {
        id: text(instance.verified_access_instance_id()),
        tags: list(instance.tags())
            .iter()
            .filter_map(|tag| Some((opt_text(tag.key())?, text(tag.value()))))
            .collect::<BTreeMap<_, _>>(),
    }
}

fn web_acl_page(acls: &[wafv2::types::WebAclSummary], next_marker: Option<&str>) -> Page<WebAclSummary> {
    let items = acls
        .iter()
        .map(|acl| WebAclSummary {
            arn: text(acl.arn()),
            id: text(acl.id()),
            name: text(acl.name()),
            description: opt_text(acl.description()),
            managed_by_firewall_manager: false,
        })
        .collect::<Vec<_>>();
    // WAF hands back a marker on a final short page as well
    let next_token = if items.is_empty() {
        None
    } else {
        opt_text(next_marker)
    };
    Page { items, next_token }
}

/// ARNs of the distributions in `summaries` configured with `web_acl_arn`.
fn distributions_bound_to(summaries: Vec<ResourceSummary>, web_acl_arn: &str) -> Vec<String> {
    summaries
        .into_iter()
        .filter_map(|summary| match summary {
            ResourceSummary::Distribution {
                arn,
                web_acl_id: Some(acl),
                ..
            } if acl == web_acl_arn => Some(arn),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Adapter
// ============================================================================

/// `CloudApi` over live provider credentials.
#[derive(Clone)]
pub struct AwsCloud {
    sdk: SdkConfig,
}

impl AwsCloud {
    /// Resolve credentials and region from the environment, profile and
    /// instance metadata, in the SDK's usual order.
    pub async fn from_env(fallback_region: &str) -> Self {
        let region = RegionProviderChain::default_provider()
            .or_else(Region::new(fallback_region.to_string()));
        let sdk = aws_config::defaults(BehaviorVersion::latest())
            .region(region)
            .load()
            .await;
        debug!(region = ?sdk.region(), "Loaded provider configuration");
        Self { sdk }
    }

    pub fn from_sdk_config(sdk: SdkConfig) -> Self {
        Self { sdk }
    }

    fn in_region(&self, region: &str) -> SdkConfig {
        self.sdk
            .to_builder()
            .region(Region::new(region.to_string()))
            .build()
    }

    async fn list_load_balancers(
        &self,
        region: &str,
        token: Option<String>,
    ) -> CloudResult<Page<ResourceSummary>> {
        let client = elbv2::Client::new(&self.in_region(region));
        let out = client
            .describe_load_balancers()
            .set_marker(token)
            .send()
            .await
            .map_err(|e| sdk_error("DescribeLoadBalancers", e))?;
        let items = list(out.load_balancers())
            .iter()
            .map(load_balancer_summary)
            .collect();
        Ok(Page {
            items,
            next_token: opt_text(out.next_marker()),
        })
    }

    async fn list_distribution_summaries(
        &self,
        token: Option<String>,
    ) -> CloudResult<Page<ResourceSummary>> {
        let client = cloudfront::Client::new(&self.in_region(CLOUDFRONT_REGION));
        let out = client
            .list_distributions()
            .set_marker(token)
            .send()
            .await
            .map_err(|e| sdk_error("ListDistributions", e))?;
        let Some(page) = part(out.distribution_list()) else {
            return Ok(Page::last(Vec::new()));
        };
        let items = list(page.items())
            .iter()
            .map(|d| ResourceSummary::Distribution {
                id: text(d.id()),
                arn: text(d.arn()),
                domain_name: text(d.domain_name()),
                web_acl_id: opt_text(d.web_acl_id()),
            })
            .collect();
        // CloudFront sends a next marker only on truncated listings
        Ok(Page {
            items,
            next_token: opt_text(page.next_marker()),
        })
    }

    async fn list_rest_apis(
        &self,
        region: &str,
        token: Option<String>,
    ) -> CloudResult<Page<ResourceSummary>> {
        let client = apigateway::Client::new(&self.in_region(region));
        let out = client
            .get_rest_apis()
            .set_position(token)
            .limit(500)
            .send()
            .await
            .map_err(|e| sdk_error("GetRestApis", e))?;
        let items = list(out.items()).iter().map(rest_api_summary).collect();
        Ok(Page {
            items,
            next_token: opt_text(out.position()),
        })
    }

    async fn list_http_apis(
        &self,
        region: &str,
        token: Option<String>,
    ) -> CloudResult<Page<ResourceSummary>> {
        let client = apigatewayv2::Client::new(&self.in_region(region));
        let out = client
            .get_apis()
            .set_next_token(token)
            .send()
            .await
            .map_err(|e| sdk_error("GetApis", e))?;
        let items = list(out.items())
            .iter()
            .map(|api| ResourceSummary::HttpApi {
                api_id: text(api.api_id()),
                name: opt_text(api.name()),
            })
            .collect();
        Ok(Page {
            items,
            next_token: opt_text(out.next_token()),
        })
    }

    async fn list_graphql_apis(
        &self,
        region: &str,
        token: Option<String>,
    ) -> CloudResult<Page<ResourceSummary>> {
        let client = appsync::Client::new(&self.in_region(region));
        let out = client
            .list_graphql_apis()
            .set_next_token(token)
            .send()
            .await
            .map_err(|e| sdk_error("ListGraphqlApis", e))?;
        let items = list(out.graphql_apis())
            .iter()
            .map(|api| ResourceSummary::GraphqlApi {
                arn: text(api.arn()),
                name: opt_text(api.name()),
            })
            .collect();
        Ok(Page {
            items,
            next_token: opt_text(out.next_token()),
        })
    }

    async fn list_user_pools(
        &self,
        region: &str,
        token: Option<String>,
    ) -> CloudResult<Page<ResourceSummary>> {
        let client = cognito::Client::new(&self.in_region(region));
        let out = client
            .list_user_pools()
            .max_results(60)
            .set_next_token(token)
            .send()
            .await
            .map_err(|e| sdk_error("ListUserPools", e))?;
        let items = list(out.user_pools())
            .iter()
            .map(|pool| ResourceSummary::UserPool {
                id: text(pool.id()),
                name: opt_text(pool.name()),
            })
            .collect();
        Ok(Page {
            items,
            next_token: opt_text(out.next_token()),
        })
    }

    async fn list_app_runner_services(
        &self,
        region: &str,
        token: Option<String>,
    ) -> CloudResult<Page<ResourceSummary>> {
        let client = apprunner::Client::new(&self.in_region(region));
        let out = client
            .list_services()
            .max_results(20)
            .set_next_token(token)
            .send()
            .await
            .map_err(|e| sdk_error("ListServices", e))?;
        let items = list(out.service_summary_list())
            .iter()
            .map(|service| ResourceSummary::AppRunnerService {
                arn: text(service.service_arn()),
                name: opt_text(service.service_name()),
            })
            .collect();
        Ok(Page {
            items,
            next_token: opt_text(out.next_token()),
        })
    }

    async fn list_verified_access_instances(
        &self,
        region: &str,
        token: Option<String>,
    ) -> CloudResult<Page<ResourceSummary>> {
        let client = ec2::Client::new(&self.in_region(region));
        let out = client
            .describe_verified_access_instances()
            .set_next_token(token)
            .send()
            .await
            .map_err(|e| sdk_error("DescribeVerifiedAccessInstances", e))?;
        let items = list(out.verified_access_instances())
            .iter()
            .map(verified_access_summary)
            .collect();
        Ok(Page {
            items,
            next_token: opt_text(out.next_token()),
        })
    }

    /// Distributions whose configuration names `web_acl_arn`.
    async fn distributions_for_web_acl(&self, web_acl_arn: &str) -> CloudResult<Vec<String>> {
        let mut arns = Vec::new();
        let mut token = None;
        loop {
            let page = self.list_distribution_summaries(token).await?;
            arns.extend(distributions_bound_to(page.items, web_acl_arn));
            match page.next_token {
                Some(next) => token = Some(next),
                None => return Ok(arns),
            }
        }
    }
}

#[async_trait]
impl CloudApi for AwsCloud {
    async fn caller_identity(&self) -> CloudResult<CallerIdentity> {
        let client = sts::Client::new(&self.sdk);
        let out = client
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| sdk_error("GetCallerIdentity", e))?;
        Ok(CallerIdentity {
            account: text(out.account()),
            arn: text(out.arn()),
            user_id: text(out.user_id()),
        })
    }

    async fn list_resources(
        &self,
        resource_type: ResourceType,
        region: &str,
        page_token: Option<&str>,
    ) -> CloudResult<Page<ResourceSummary>> {
        let token = page_token.map(str::to_string);
        match resource_type {
            ResourceType::ApplicationLoadBalancer => self.list_load_balancers(region, token).await,
            ResourceType::CloudfrontDistribution => self.list_distribution_summaries(token).await,
            ResourceType::ApiGatewayRestApi => self.list_rest_apis(region, token).await,
            ResourceType::ApiGatewayHttpApi => self.list_http_apis(region, token).await,
            ResourceType::AppsyncGraphqlApi => self.list_graphql_apis(region, token).await,
            ResourceType::CognitoUserPool => self.list_user_pools(region, token).await,
            ResourceType::AppRunnerService => self.list_app_runner_services(region, token).await,
            ResourceType::VerifiedAccessInstance => {
                self.list_verified_access_instances(region, token).await
            }
        }
    }

    async fn list_web_acls(
        &self,
        scope: WafScope,
        region: &str,
        page_token: Option<&str>,
    ) -> CloudResult<Page<WebAclSummary>> {
        let (region, provider_scope) = match scope {
            WafScope::Regional => (region, "REGIONAL"),
            WafScope::Global => (CLOUDFRONT_REGION, "CLOUDFRONT"),
        };
        let client = wafv2::Client::new(&self.in_region(region));
        let out = client
            .list_web_acls()
            .scope(wafv2::types::Scope::from(provider_scope))
            .limit(100)
            .set_next_marker(page_token.map(str::to_string))
            .send()
            .await
            .map_err(|e| sdk_error("ListWebACLs", e))?;
        Ok(web_acl_page(list(out.web_acls()), part(out.next_marker())))
    }

    async fn list_resources_for_web_acl(
        &self,
        web_acl_arn: &str,
        region: &str,
        binding: WafBinding,
    ) -> CloudResult<Vec<String>> {
        if binding == WafBinding::Distribution {
            return self.distributions_for_web_acl(web_acl_arn).await;
        }
        let client = wafv2::Client::new(&self.in_region(region));
        let out = client
            .list_resources_for_web_acl()
            .web_acl_arn(web_acl_arn)
            .resource_type(wafv2::types::ResourceType::from(binding.as_str()))
            .send()
            .await
            .map_err(|e| sdk_error("ListResourcesForWebACL", e))?;
        Ok(list(out.resource_arns()).to_vec())
    }

    async fn list_distributions(
        &self,
        page_token: Option<&str>,
    ) -> CloudResult<Page<DistributionSummary>> {
        let page = self
            .list_distribution_summaries(page_token.map(str::to_string))
            .await?;
        let items = page
            .items
            .into_iter()
            .filter_map(|summary| match summary {
                ResourceSummary::Distribution {
                    id,
                    arn,
                    domain_name,
                    ..
                } => Some(DistributionSummary {
                    id,
                    arn,
                    domain_name,
                }),
                _ => None,
            })
            .collect();
        Ok(Page {
            items,
            next_token: page.next_token,
        })
    }

    async fn get_distribution(&self, id: &str) -> CloudResult<DistributionDetail> {
        let client = cloudfront::Client::new(&self.in_region(CLOUDFRONT_REGION));
        let out = client
            .get_distribution()
            .id(id)
            .send()
            .await
            .map_err(|e| sdk_error("GetDistribution", e))?;
        let distribution = part(out.distribution()).ok_or_else(|| {
            CloudError::new(
                CloudErrorKind::Malformed,
                "GetDistribution",
                format!("distribution {} returned no body", id),
            )
        })?;
        let config = part(distribution.distribution_config());
        let origins = config
            .and_then(|c| part(c.origins()))
            .map(|origins| {
                list(origins.items())
                    .iter()
                    .map(|origin| DistributionOrigin {
                        id: opt_text(origin.id()),
                        domain_name: text(origin.domain_name()),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(DistributionDetail {
            id: text(distribution.id()),
            arn: text(distribution.arn()),
            domain_name: text(distribution.domain_name()),
            web_acl_id: config.and_then(|c| opt_text(c.web_acl_id())),
            origins,
        })
    }

    async fn load_balancer_dns_name(&self, arn: &str, region: &str) -> CloudResult<Option<String>> {
        let client = elbv2::Client::new(&self.in_region(region));
        let out = client
            .describe_load_balancers()
            .load_balancer_arns(arn)
            .send()
            .await
            .map_err(|e| sdk_error("DescribeLoadBalancers", e))?;
        Ok(list(out.load_balancers())
            .first()
            .and_then(|lb| opt_text(lb.dns_name())))
    }

    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
        external_id: Option<&str>,
    ) -> CloudResult<Arc<dyn CloudApi>> {
        info!(role = role_arn, "Assuming role");
        let client = sts::Client::new(&self.sdk);
        let out = client
            .assume_role()
            .role_arn(role_arn)
            .role_session_name(session_name)
            .set_external_id(external_id.map(str::to_string))
            .send()
            .await
            .map_err(|e| sdk_error("AssumeRole", e))?;
        let creds = part(out.credentials()).ok_or_else(|| {
            CloudError::new(
                CloudErrorKind::Malformed,
                "AssumeRole",
                format!("{} returned no credentials", role_arn),
            )
        })?;
        let expires = part(creds.expiration()).and_then(|at| SystemTime::try_from(*at).ok());
        let credentials = Credentials::new(
            text(creds.access_key_id()),
            text(creds.secret_access_key()),
            opt_text(creds.session_token()),
            expires,
            CREDENTIALS_PROVIDER,
        );
        let sdk = self
            .sdk
            .to_builder()
            .credentials_provider(SharedCredentialsProvider::new(credentials))
            .build();
        Ok(Arc::new(Self::from_sdk_config(sdk)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_map_to_kinds() {
        let cases = [
            ("Throttling", CloudErrorKind::Throttled),
            ("TooManyRequestsException", CloudErrorKind::Throttled),
            ("RequestLimitExceeded", CloudErrorKind::Throttled),
            ("AccessDenied", CloudErrorKind::AccessDenied),
            ("AccessDeniedException", CloudErrorKind::AccessDenied),
            ("UnauthorizedOperation", CloudErrorKind::AccessDenied),
            ("ExpiredToken", CloudErrorKind::InvalidCredentials),
            ("InvalidClientTokenId", CloudErrorKind::InvalidCredentials),
            ("LoadBalancerNotFound", CloudErrorKind::NotFound),
            ("NoSuchDistribution", CloudErrorKind::NotFound),
            ("WAFNonexistentItemException", CloudErrorKind::NotFound),
            ("WAFInternalErrorException", CloudErrorKind::Service),
        ];
        for (code, kind) in cases {
            assert_eq!(kind_for_code(code), kind, "{}", code);
        }
    }

    #[test]
    fn test_members_read_required_and_optional_alike() {
        let required: &str = "web";
        let optional: Option<&str> = Some("web");
        assert_eq!(text(required), text(optional));
        assert_eq!(text(None::<&str>), "");
        assert_eq!(opt_text(Some("")), None);
        let empty: &[String] = &[];
        assert!(list(None::<&[String]>).is_empty());
        assert!(list(empty).is_empty());
    }

    #[test]
    fn test_regional_bindings_are_known_to_waf() {
        let known = wafv2::types::ResourceType::values();
        for binding in [
            WafBinding::ApplicationLoadBalancer,
            WafBinding::ApiGateway,
            WafBinding::AppSync,
            WafBinding::CognitoUserPool,
            WafBinding::AppRunnerService,
            WafBinding::VerifiedAccessInstance,
        ] {
            assert!(known.contains(&binding.as_str()), "{}", binding.as_str());
        }
    }

    #[test]
    fn test_load_balancer_summary_reads_scheme_and_type() {
        let lb = elbv2::types::LoadBalancer::builder()
            .load_balancer_arn("arn:aws:elasticloadbalancing:eu-west-1:123456789012:loadbalancer/app/web/50dc6c495c0c9188")
            .load_balancer_name("web")
            .dns_name("web-1234567890.eu-west-1.elb.amazonaws.com")
            .scheme(elbv2::types::LoadBalancerSchemeEnum::InternetFacing)
            .r#type(elbv2::types::LoadBalancerTypeEnum::Application)
            .build();
        match load_balancer_summary(&lb) {
            ResourceSummary::LoadBalancer {
                name,
                dns_name,
                scheme,
                load_balancer_type,
                ..
            } => {
                assert_eq!(name, "web");
                assert_eq!(dns_name.as_deref(), Some("web-1234567890.eu-west-1.elb.amazonaws.com"));
                assert_eq!(scheme.as_deref(), Some("internet-facing"));
                assert_eq!(load_balancer_type, "application");
            }
            other => panic!("unexpected {:?}", other),
        }

        let bare = elbv2::types::LoadBalancer::builder().load_balancer_name("bare").build();
        match load_balancer_summary(&bare) {
            ResourceSummary::LoadBalancer {
                arn, dns_name, scheme, ..
            } => {
                assert_eq!(arn, "");
                assert!(dns_name.is_none());
                assert!(scheme.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_rest_api_summary_keeps_endpoint_types() {
        let api = apigateway::types::RestApi::builder()
            .id("a1b2c3d4e5")
            .name("orders")
            .endpoint_configuration(
                apigateway::types::EndpointConfiguration::builder()
                    .types(apigateway::types::EndpointType::Regional)
                    .build(),
            )
            .build();
        assert_eq!(
            rest_api_summary(&api),
            ResourceSummary::RestApi {
                id: "a1b2c3d4e5".into(),
                name: Some("orders".into()),
                endpoint_types: vec!["REGIONAL".into()],
            }
        );

        let unnamed = apigateway::types::RestApi::builder().id("z9").name("").build();
        assert_eq!(
            rest_api_summary(&unnamed),
            ResourceSummary::RestApi {
                id: "z9".into(),
                name: None,
                endpoint_types: Vec::new(),
            }
        );
    }

    #[test]
    fn test_verified_access_summary_skips_keyless_tags() {
        let instance = ec2::types::VerifiedAccessInstance::builder()
            .verified_access_instance_id("vai-0123456789abcdef0")
            .tags(ec2::types::Tag::builder().key("env").value("prod").build())
            .tags(ec2::types::Tag::builder().value("orphan").build())
            .build();
        match verified_access_summary(&instance) {
            ResourceSummary::VerifiedAccessInstance { id, tags } => {
                assert_eq!(id, "vai-0123456789abcdef0");
                assert_eq!(tags.len(), 1);
                assert_eq!(tags.get("env").map(String::as_str), Some("prod"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_web_acl_page_drops_marker_on_empty_page() {
        let acls = vec![wafv2::types::WebAclSummary::builder()
            .arn("arn:aws:wafv2:us-east-1:123456789012:regional/webacl/api-waf/r1")
            .id("r1")
            .name("api-waf")
            .description("")
            .build()];
        let page = web_acl_page(&acls, Some("next-1"));
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].name, "api-waf");
        assert!(page.items[0].description.is_none());
        assert_eq!(page.next_token.as_deref(), Some("next-1"));

        let page = web_acl_page(&[], Some("next-2"));
        assert!(page.items.is_empty());
        assert!(page.next_token.is_none());

        assert!(web_acl_page(&acls, Some("")).next_token.is_none());
    }

    #[test]
    fn test_distributions_bound_to_matches_configured_acl() {
        let acl = "arn:aws:wafv2:us-east-1:123456789012:global/webacl/edge-waf/e1";
        let distribution = |id: &str, web_acl_id: Option<&str>| ResourceSummary::Distribution {
            id: id.to_string(),
            arn: format!("arn:aws:cloudfront::123456789012:distribution/{}", id),
            domain_name: format!("{}.cloudfront.net", id.to_lowercase()),
            web_acl_id: web_acl_id.map(str::to_string),
        };
        let summaries = vec![
            distribution("E1", Some(acl)),
            distribution("E2", None),
            distribution("E3", Some("arn:aws:wafv2:us-east-1:123456789012:global/webacl/other/o1")),
            ResourceSummary::HttpApi {
                api_id: "abc".into(),
                name: None,
            },
            distribution("E4", Some(acl)),
        ];
        assert_eq!(
            distributions_bound_to(summaries, acl),
            vec![
                "arn:aws:cloudfront::123456789012:distribution/E1".to_string(),
                "arn:aws:cloudfront::123456789012:distribution/E4".to_string(),
            ]
        );
    }

    #[test]
    fn test_region_override_keeps_credentials() {
        let sdk = SdkConfig::builder()
            .region(Region::new("eu-west-1"))
            .credentials_provider(SharedCredentialsProvider::new(Credentials::new(
                "AKIDEXAMPLE",
                "secret",
                None,
                None,
                "test",
            )))
            .build();
        let cloud = AwsCloud::from_sdk_config(sdk);
        let regional = cloud.in_region("ap-south-1");
        assert_eq!(regional.region().map(|r| r.as_ref()), Some("ap-south-1"));
        assert!(regional.credentials_provider().is_some());
    }
}
