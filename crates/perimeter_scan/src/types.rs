//! Core types for the perimeter scanner

use crate::arn::Arn;
use crate::error::{ArnError, ScanError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Resource types
// ============================================================================

/// Edge-facing resource families that can carry a Web ACL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceType {
    ApplicationLoadBalancer,
    CloudfrontDistribution,
    ApiGatewayRestApi,
    ApiGatewayHttpApi,
    AppsyncGraphqlApi,
    CognitoUserPool,
    AppRunnerService,
    VerifiedAccessInstance,
}

impl ResourceType {
    const ALL: [ResourceType; 8] = [
        Self::ApplicationLoadBalancer,
        Self::CloudfrontDistribution,
        Self::ApiGatewayRestApi,
        Self::ApiGatewayHttpApi,
        Self::AppsyncGraphqlApi,
        Self::CognitoUserPool,
        Self::AppRunnerService,
        Self::VerifiedAccessInstance,
    ];

    /// Every known type, in catalog order.
    pub fn all() -> &'static [ResourceType] {
        &Self::ALL
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApplicationLoadBalancer => "APPLICATION_LOAD_BALANCER",
            Self::CloudfrontDistribution => "CLOUDFRONT_DISTRIBUTION",
            Self::ApiGatewayRestApi => "API_GATEWAY_REST_API",
            Self::ApiGatewayHttpApi => "API_GATEWAY_HTTP_API",
            Self::AppsyncGraphqlApi => "APPSYNC_GRAPHQL_API",
            Self::CognitoUserPool => "COGNITO_USER_POOL",
            Self::AppRunnerService => "APP_RUNNER_SERVICE",
            Self::VerifiedAccessInstance => "VERIFIED_ACCESS_INSTANCE",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::ApplicationLoadBalancer => "Application Load Balancer",
            Self::CloudfrontDistribution => "CloudFront Distribution",
            Self::ApiGatewayRestApi => "API Gateway REST API",
            Self::ApiGatewayHttpApi => "API Gateway HTTP API",
            Self::AppsyncGraphqlApi => "AppSync GraphQL API",
            Self::CognitoUserPool => "Cognito User Pool",
            Self::AppRunnerService => "App Runner Service",
            Self::VerifiedAccessInstance => "Verified Access Instance",
        }
    }

    /// Service namespace used in the resource's ARN
    pub fn aws_service(&self) -> &'static str {
        match self {
            Self::ApplicationLoadBalancer => "elasticloadbalancing",
            Self::CloudfrontDistribution => "cloudfront",
            Self::ApiGatewayRestApi | Self::ApiGatewayHttpApi => "apigateway",
            Self::AppsyncGraphqlApi => "appsync",
            Self::CognitoUserPool => "cognito-idp",
            Self::AppRunnerService => "apprunner",
            Self::VerifiedAccessInstance => "ec2",
        }
    }

    /// Web ACL namespace this type binds into.
    pub fn waf_scope(&self) -> WafScope {
        match self {
            Self::CloudfrontDistribution => WafScope::Global,
            _ => WafScope::Regional,
        }
    }

    /// Catalogued once per account rather than once per region.
    pub fn is_global(&self) -> bool {
        self.waf_scope() == WafScope::Global
    }

    /// HTTP APIs cannot be associated with a Web ACL at all; they can only be
    /// protected by a distribution in front of them.
    pub fn supports_direct_waf(&self) -> bool {
        !matches!(self, Self::ApiGatewayHttpApi)
    }

    /// Types whose public hostname can appear as a distribution origin.
    pub fn can_be_fronted(&self) -> bool {
        matches!(
            self,
            Self::ApiGatewayHttpApi | Self::ApiGatewayRestApi | Self::ApplicationLoadBalancer
        )
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceType {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ScanError::UnknownResourceType(s.to_string()))
    }
}

// ============================================================================
// Web ACLs
// ============================================================================

/// Web ACL namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WafScope {
    /// Bound to resources inside one region
    Regional,
    /// Bound to CDN distributions, region-independent
    Global,
}

impl WafScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regional => "REGIONAL",
            Self::Global => "GLOBAL",
        }
    }

    /// Name the WAF API uses for this scope.
    pub fn provider_scope(&self) -> &'static str {
        match self {
            Self::Regional => "REGIONAL",
            Self::Global => "CLOUDFRONT",
        }
    }
}

impl fmt::Display for WafScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a Web ACL. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebAclRef {
    pub arn: String,
    pub id: String,
    pub name: String,
    pub scope: WafScope,
    /// Region owning the ACL (`us-east-1` for global ACLs)
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub managed_by_firewall_manager: bool,
}

impl WebAclRef {
    /// Parse `arn:<partition>:wafv2:<region>:<account>:<global|regional>/webacl/<name>/<id>`.
    pub fn from_arn(raw: &str) -> Result<Self, ArnError> {
        let arn = Arn::parse(raw)?;
        if arn.service != "wafv2" {
            return Err(ArnError::new(raw, "not a wafv2 ARN"));
        }

        let segments: Vec<&str> = arn.resource.split('/').collect();
        let (scope_segment, name, id) = match segments.as_slice() {
            [scope, "webacl", name, id] if !name.is_empty() && !id.is_empty() => {
                (*scope, *name, *id)
            }
            _ => {
                return Err(ArnError::new(
                    raw,
                    "expected <scope>/webacl/<name>/<id> resource",
                ))
            }
        };
        let scope = match scope_segment {
            "global" => WafScope::Global,
            "regional" => WafScope::Regional,
            other => {
                return Err(ArnError::new(raw, format!("unknown Web ACL scope '{}'", other)))
            }
        };

        Ok(Self {
            arn: raw.to_string(),
            id: id.to_string(),
            name: name.to_string(),
            scope,
            region: arn.region,
            description: None,
            managed_by_firewall_manager: false,
        })
    }
}

// ============================================================================
// Resource records
// ============================================================================

/// Indirect protection through a CDN distribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontedBy {
    pub distribution_arn: String,
    pub distribution_id: String,
    pub web_acl: WebAclRef,
    pub note: String,
}

impl FrontedBy {
    pub fn new(
        distribution_arn: impl Into<String>,
        distribution_id: impl Into<String>,
        web_acl: WebAclRef,
    ) -> Self {
        let distribution_arn = distribution_arn.into();
        let note = format!(
            "Fronted by CloudFront Distribution {} with WAF {}",
            distribution_arn, web_acl.name
        );
        Self {
            distribution_arn,
            distribution_id: distribution_id.into(),
            web_acl,
            note,
        }
    }
}

/// One discovered resource.
///
/// The catalog creates it with no WAF findings, except for distributions whose
/// configuration names a Web ACL. Enrichment may then attach a direct Web ACL,
/// or failing that a fronting distribution, never both.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceRecord {
    /// Globally unique identifier (ARN)
    pub arn: String,
    pub resource_type: ResourceType,
    /// Region, or `global` for distributions
    pub region: String,
    pub account_id: String,
    pub name: Option<String>,
    pub is_public: bool,
    pub scanned_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    web_acl: Option<WebAclRef>,
    fronted_by: Option<FrontedBy>,
}

impl ResourceRecord {
    pub fn new(
        arn: impl Into<String>,
        resource_type: ResourceType,
        region: impl Into<String>,
        account_id: impl Into<String>,
        name: Option<String>,
        is_public: bool,
    ) -> Self {
        Self {
            arn: arn.into(),
            resource_type,
            region: region.into(),
            account_id: account_id.into(),
            name,
            is_public,
            scanned_at: Utc::now(),
            tags: BTreeMap::new(),
            web_acl: None,
            fronted_by: None,
        }
    }

    pub fn with_tags(mut self, tags: BTreeMap<String, String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn web_acl(&self) -> Option<&WebAclRef> {
        self.web_acl.as_ref()
    }

    pub fn fronted_by(&self) -> Option<&FrontedBy> {
        self.fronted_by.as_ref()
    }

    /// Directly associated with a Web ACL.
    pub fn has_waf(&self) -> bool {
        self.web_acl.is_some()
    }

    /// Name for display, falling back to the ARN.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.arn)
    }

    /// Record the direct association. Allowed once, and only before fronting.
    pub fn attach_web_acl(&mut self, web_acl: WebAclRef) -> Result<(), ScanError> {
        if self.web_acl.is_some() {
            return Err(ScanError::InvariantViolation(format!(
                "{} already has a direct Web ACL",
                self.arn
            )));
        }
        if self.fronted_by.is_some() {
            return Err(ScanError::InvariantViolation(format!(
                "{} is already fronted; a direct Web ACL cannot be added",
                self.arn
            )));
        }
        self.web_acl = Some(web_acl);
        Ok(())
    }

    /// Record indirect protection. Rejected when a direct Web ACL exists.
    pub fn attach_fronted_by(&mut self, fronted_by: FrontedBy) -> Result<(), ScanError> {
        if self.web_acl.is_some() {
            return Err(ScanError::InvariantViolation(format!(
                "{} has a direct Web ACL and cannot be fronted",
                self.arn
            )));
        }
        if self.fronted_by.is_some() {
            return Err(ScanError::InvariantViolation(format!(
                "{} is already fronted",
                self.arn
            )));
        }
        self.fronted_by = Some(fronted_by);
        Ok(())
    }
}

// ============================================================================
// Compliance
// ============================================================================

/// Final classification label for a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceStatus {
    Compliant,
    CompliantFrontedByWaf,
    CompliantNoWafRequired,
    NonCompliant,
}

impl ComplianceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compliant => "COMPLIANT",
            Self::CompliantFrontedByWaf => "COMPLIANT_FRONTED_BY_WAF",
            Self::CompliantNoWafRequired => "COMPLIANT_NO_WAF_REQUIRED",
            Self::NonCompliant => "NON_COMPLIANT",
        }
    }

    pub fn is_compliant(&self) -> bool {
        !matches!(self, Self::NonCompliant)
    }
}

impl fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A frozen record together with its classification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedResource {
    #[serde(flatten)]
    pub record: ResourceRecord,
    pub compliance_status: ComplianceStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acl() -> WebAclRef {
        WebAclRef::from_arn("arn:aws:wafv2:us-east-1:123456789012:global/webacl/edge-waf/a1b2").unwrap()
    }

    #[test]
    fn test_resource_type_from_str_is_case_insensitive() {
        assert_eq!(
            "api_gateway_http_api".parse::<ResourceType>().unwrap(),
            ResourceType::ApiGatewayHttpApi
        );
        assert_eq!(
            " APPLICATION_LOAD_BALANCER ".parse::<ResourceType>().unwrap(),
            ResourceType::ApplicationLoadBalancer
        );
        assert!(matches!(
            "LAMBDA_FUNCTION".parse::<ResourceType>(),
            Err(ScanError::UnknownResourceType(_))
        ));
    }

    #[test]
    fn test_resource_type_serde_uses_provider_tags() {
        for t in ResourceType::all() {
            let json = serde_json::to_string(t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
        }
    }

    #[test]
    fn test_resource_type_capabilities() {
        let frontable: Vec<_> = ResourceType::all().iter().filter(|t| t.can_be_fronted()).collect();
        assert_eq!(frontable.len(), 3);

        let no_direct: Vec<_> = ResourceType::all()
            .iter()
            .filter(|t| !t.supports_direct_waf())
            .collect();
        assert_eq!(no_direct, vec![&ResourceType::ApiGatewayHttpApi]);

        assert_eq!(ResourceType::CloudfrontDistribution.waf_scope(), WafScope::Global);
        assert_eq!(ResourceType::CognitoUserPool.waf_scope(), WafScope::Regional);
        assert_eq!(WafScope::Global.provider_scope(), "CLOUDFRONT");
    }

    #[test]
    fn test_web_acl_from_arn() {
        let acl = WebAclRef::from_arn(
            "arn:aws:wafv2:eu-west-1:123456789012:regional/webacl/api-waf/3c4d5e6f",
        )
        .unwrap();
        assert_eq!(acl.name, "api-waf");
        assert_eq!(acl.id, "3c4d5e6f");
        assert_eq!(acl.scope, WafScope::Regional);
        assert_eq!(acl.region, "eu-west-1");

        assert_eq!(acl_scope("global"), Some(WafScope::Global));
        assert!(WebAclRef::from_arn("arn:aws:wafv2:us-east-1:1:regional/ipset/x/y").is_err());
        assert!(WebAclRef::from_arn("arn:aws:waf:us-east-1:1:regional/webacl/x/y").is_err());
        assert!(WebAclRef::from_arn("arn:aws:wafv2:us-east-1:1:zonal/webacl/x/y").is_err());
    }

    fn acl_scope(segment: &str) -> Option<WafScope> {
        WebAclRef::from_arn(&format!("arn:aws:wafv2:us-east-1:1:{}/webacl/n/i", segment))
            .ok()
            .map(|a| a.scope)
    }

    #[test]
    fn test_fronted_by_note() {
        let fronted = FrontedBy::new(
            "arn:aws:cloudfront::123456789012:distribution/E3T3BYVBS5ILLA",
            "E3T3BYVBS5ILLA",
            acl(),
        );
        assert_eq!(
            fronted.note,
            "Fronted by CloudFront Distribution arn:aws:cloudfront::123456789012:distribution/E3T3BYVBS5ILLA with WAF edge-waf"
        );
    }

    #[test]
    fn test_fronting_rejected_after_direct_waf() {
        let mut record = ResourceRecord::new(
            "arn:aws:apigateway:us-east-1::/restapis/abc",
            ResourceType::ApiGatewayRestApi,
            "us-east-1",
            "123456789012",
            Some("orders".to_string()),
            true,
        );
        record.attach_web_acl(acl()).unwrap();
        assert!(record.attach_web_acl(acl()).is_err());

        let fronted = FrontedBy::new("arn:aws:cloudfront::1:distribution/E1", "E1", acl());
        assert!(record.attach_fronted_by(fronted).is_err());
        assert!(record.fronted_by().is_none());
    }

    #[test]
    fn test_fronting_attaches_once() {
        let mut record = ResourceRecord::new(
            "arn:aws:apigateway:us-east-1::/apis/abc",
            ResourceType::ApiGatewayHttpApi,
            "us-east-1",
            "123456789012",
            None,
            true,
        );
        let fronted = FrontedBy::new("arn:aws:cloudfront::1:distribution/E1", "E1", acl());
        record.attach_fronted_by(fronted.clone()).unwrap();
        assert!(record.attach_fronted_by(fronted).is_err());
        assert!(record.attach_web_acl(acl()).is_err());
        assert!(!record.has_waf());
        assert_eq!(record.display_name(), "arn:aws:apigateway:us-east-1::/apis/abc");
    }

    #[test]
    fn test_compliance_status_labels() {
        assert!(ComplianceStatus::CompliantFrontedByWaf.is_compliant());
        assert!(!ComplianceStatus::NonCompliant.is_compliant());
        assert_eq!(
            serde_json::to_string(&ComplianceStatus::CompliantNoWafRequired).unwrap(),
            "\"COMPLIANT_NO_WAF_REQUIRED\""
        );
    }
}
