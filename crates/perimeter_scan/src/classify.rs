//! Compliance classification.

use crate::types::{ComplianceStatus, ResourceRecord, ResourceType};

/// Classify a frozen record. First matching rule wins:
///
/// 1. direct Web ACL -> `COMPLIANT`
/// 2. fronted by a distribution with a Web ACL -> `COMPLIANT_FRONTED_BY_WAF`
/// 3. not public -> `COMPLIANT_NO_WAF_REQUIRED`
/// 4. type cannot take a direct Web ACL -> `COMPLIANT_NO_WAF_REQUIRED`
/// 5. otherwise -> `NON_COMPLIANT`
pub fn classify(record: &ResourceRecord) -> ComplianceStatus {
    classify_facts(
        record.has_waf(),
        record.fronted_by().is_some(),
        record.is_public,
        record.resource_type,
    )
}

/// The same decision over the four facts it depends on.
pub fn classify_facts(
    has_direct_waf: bool,
    has_fronted_waf: bool,
    is_public: bool,
    resource_type: ResourceType,
) -> ComplianceStatus {
    if has_direct_waf {
        ComplianceStatus::Compliant
    } else if has_fronted_waf {
        ComplianceStatus::CompliantFrontedByWaf
    } else if !is_public || !resource_type.supports_direct_waf() {
        ComplianceStatus::CompliantNoWafRequired
    } else {
        ComplianceStatus::NonCompliant
    }
}
