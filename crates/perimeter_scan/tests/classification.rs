//! Classification table and properties.
//!
//! Covers every combination of direct WAF, fronted WAF, exposure and
//! resource type, then checks the rules hold through real records.

use perimeter_scan::classify::classify_facts;
use perimeter_scan::cloud::{DistributionDetail, DistributionOrigin};
use perimeter_scan::enrich::{attach_direct, enrich_fronting};
use perimeter_scan::origin::{OriginEntry, OriginIndex, OriginMatcher};
use perimeter_scan::snapshot::{SnapshotCloud, OP_DESCRIBE_LOAD_BALANCERS};
use perimeter_scan::waf_index::WafIndex;
use perimeter_scan::{
    classify, ComplianceStatus, FrontedBy, FrontingTieBreak, ResourceRecord, ResourceType,
    RetryPolicy, WebAclRef,
};
use proptest::prelude::*;
use std::sync::Arc;

fn expected(direct: bool, fronted: bool, public: bool, rt: ResourceType) -> ComplianceStatus {
    match (direct, fronted, public, rt.supports_direct_waf()) {
        (true, _, _, _) => ComplianceStatus::Compliant,
        (false, true, _, _) => ComplianceStatus::CompliantFrontedByWaf,
        (false, false, false, _) => ComplianceStatus::CompliantNoWafRequired,
        (false, false, true, false) => ComplianceStatus::CompliantNoWafRequired,
        (false, false, true, true) => ComplianceStatus::NonCompliant,
    }
}

#[test]
fn test_full_decision_table() {
    let mut rows = 0;
    for &rt in ResourceType::all() {
        for direct in [false, true] {
            for fronted in [false, true] {
                for public in [false, true] {
                    assert_eq!(
                        classify_facts(direct, fronted, public, rt),
                        expected(direct, fronted, public, rt),
                        "direct={} fronted={} public={} type={}",
                        direct,
                        fronted,
                        public,
                        rt
                    );
                    rows += 1;
                }
            }
        }
    }
    assert_eq!(rows, 2 * 2 * 2 * ResourceType::all().len());
}

#[test]
fn test_only_http_api_lacks_direct_waf() {
    let without: Vec<_> = ResourceType::all()
        .iter()
        .filter(|rt| !rt.supports_direct_waf())
        .collect();
    assert_eq!(without, vec![&ResourceType::ApiGatewayHttpApi]);
}

fn record(rt: ResourceType, public: bool) -> ResourceRecord {
    ResourceRecord::new(
        format!("arn:aws:test:us-east-1:123456789012:{}/x", rt.as_str().to_lowercase()),
        rt,
        "us-east-1",
        "123456789012",
        None,
        public,
    )
}

fn regional_acl() -> WebAclRef {
    WebAclRef::from_arn("arn:aws:wafv2:us-east-1:123456789012:regional/webacl/app/a1").unwrap()
}

fn edge_acl() -> WebAclRef {
    WebAclRef::from_arn("arn:aws:wafv2:us-east-1:123456789012:global/webacl/edge/e1").unwrap()
}

#[test]
fn test_direct_and_fronted_are_exclusive_on_records() {
    let mut direct = record(ResourceType::ApplicationLoadBalancer, true);
    direct.attach_web_acl(regional_acl()).unwrap();
    let fronting = FrontedBy::new("arn:aws:cloudfront::123456789012:distribution/E1", "E1", edge_acl());
    assert!(direct.attach_fronted_by(fronting.clone()).is_err());

    let mut fronted = record(ResourceType::ApiGatewayRestApi, true);
    fronted.attach_fronted_by(fronting).unwrap();
    assert!(fronted.attach_web_acl(regional_acl()).is_err());
    assert_eq!(classify(&fronted), ComplianceStatus::CompliantFrontedByWaf);
}

fn any_type() -> impl Strategy<Value = ResourceType> {
    prop::sample::select(ResourceType::all().to_vec())
}

proptest! {
    /// Records classify exactly as their facts do.
    #[test]
    fn prop_record_matches_facts(rt in any_type(), public in any::<bool>(), direct in any::<bool>(), fronted in any::<bool>()) {
        let rec = protected_record(rt, public, direct, fronted);
        let status = classify(&rec);
        prop_assert_eq!(status, classify_facts(direct, !direct && fronted, public, rt));
        prop_assert_eq!(status == ComplianceStatus::Compliant, rec.has_waf());
    }

    /// Private resources are never non-compliant.
    #[test]
    fn prop_private_never_non_compliant(rt in any_type(), direct in any::<bool>(), fronted in any::<bool>()) {
        prop_assert!(classify_facts(direct, fronted, false, rt).is_compliant());
    }

    /// Classifying twice gives the same label and leaves the record as it was.
    #[test]
    fn prop_classify_is_idempotent(rt in any_type(), public in any::<bool>(), direct in any::<bool>(), fronted in any::<bool>()) {
        let rec = protected_record(rt, public, direct, fronted);
        let before = rec.clone();
        let first = classify(&rec);
        let second = classify(&rec);
        prop_assert_eq!(first, second);
        prop_assert_eq!(&rec, &before);
    }

    /// API hostnames follow from the record alone and never hit the provider.
    #[test]
    fn prop_api_origin_needs_no_lookup(
        rt in api_type(),
        api_id in "[a-z0-9]{10}",
        region in prop::sample::select(vec!["us-east-1", "eu-west-1", "ap-southeast-2"]),
    ) {
        let snapshot = empty_snapshot();
        let mut matcher = OriginMatcher::new(snapshot.clone(), RetryPolicy::default());
        let rec = ResourceRecord::new(api_arn(rt, &api_id, region), rt, region, "123456789012", None, true);

        let (first, second) = runtime().block_on(async {
            let first = matcher.origin_domain_for(&rec).await.unwrap();
            let second = matcher.origin_domain_for(&rec).await.unwrap();
            (first, second)
        });
        let expected = format!("{}.execute-api.{}.amazonaws.com", api_id, region);
        prop_assert_eq!(first.as_deref(), Some(expected.as_str()));
        prop_assert_eq!(first, second);
        prop_assert_eq!(snapshot.call_count(OP_DESCRIBE_LOAD_BALANCERS), 0);
    }

    /// After enrichment no record carries both a direct Web ACL and a
    /// fronting distribution, and a direct association always wins.
    #[test]
    fn prop_enrichment_never_sets_both(apis in prop::collection::vec((api_type(), any::<bool>(), 0u8..3), 1..6)) {
        let mut records = Vec::new();
        let mut waf_index = WafIndex::default();
        let mut origins = OriginIndex::default();
        for (i, (rt, direct, fronting)) in apis.iter().enumerate() {
            let api_id = format!("api{:07}", i);
            let arn = api_arn(*rt, &api_id, "us-east-1");
            if *direct {
                waf_index.associations.insert(arn.clone(), regional_acl());
            }
            if *fronting > 0 {
                let acl = (*fronting == 2).then(edge_acl);
                let id = format!("E{}", i);
                let domain = format!("{}.execute-api.us-east-1.amazonaws.com", api_id);
                origins.insert_distribution(&distribution(&id, &domain, acl.as_ref()), origin_entry(&id, acl));
            }
            records.push(ResourceRecord::new(arn, *rt, "us-east-1", "123456789012", None, true));
        }

        let mut matcher = OriginMatcher::new(empty_snapshot(), RetryPolicy::default());
        attach_direct(&mut records, &waf_index);
        runtime()
            .block_on(enrich_fronting(&mut records, &origins, &mut matcher, FrontingTieBreak::IndexOrder))
            .unwrap();

        for (rec, (_, direct, fronting)) in records.iter().zip(apis.iter()) {
            prop_assert!(!(rec.web_acl().is_some() && rec.fronted_by().is_some()));
            prop_assert_eq!(rec.has_waf(), *direct);
            prop_assert_eq!(rec.fronted_by().is_some(), !*direct && *fronting == 2);
        }
    }
}

fn protected_record(rt: ResourceType, public: bool, direct: bool, fronted: bool) -> ResourceRecord {
    let mut rec = record(rt, public);
    if direct {
        rec.attach_web_acl(regional_acl()).unwrap();
    } else if fronted {
        rec.attach_fronted_by(FrontedBy::new(
            "arn:aws:cloudfront::123456789012:distribution/E1",
            "E1",
            edge_acl(),
        ))
        .unwrap();
    }
    rec
}

fn api_type() -> impl Strategy<Value = ResourceType> {
    prop::sample::select(vec![ResourceType::ApiGatewayHttpApi, ResourceType::ApiGatewayRestApi])
}

fn api_arn(rt: ResourceType, api_id: &str, region: &str) -> String {
    let collection = if rt == ResourceType::ApiGatewayHttpApi { "apis" } else { "restapis" };
    format!("arn:aws:apigateway:{}::/{}/{}", region, collection, api_id)
}

fn distribution(id: &str, origin: &str, acl: Option<&WebAclRef>) -> DistributionDetail {
    DistributionDetail {
        id: id.to_string(),
        arn: format!("arn:aws:cloudfront::123456789012:distribution/{}", id),
        domain_name: format!("{}.cloudfront.net", id.to_lowercase()),
        web_acl_id: acl.map(|a| a.arn.clone()),
        origins: vec![DistributionOrigin {
            id: None,
            domain_name: origin.to_string(),
        }],
    }
}

fn origin_entry(id: &str, web_acl: Option<WebAclRef>) -> OriginEntry {
    OriginEntry {
        distribution_arn: format!("arn:aws:cloudfront::123456789012:distribution/{}", id),
        distribution_id: id.to_string(),
        distribution_domain: format!("{}.cloudfront.net", id.to_lowercase()),
        web_acl,
    }
}

fn empty_snapshot() -> Arc<SnapshotCloud> {
    let inventory = r#"{"identity": {"account": "123456789012", "arn": "arn:aws:iam::123456789012:user/scanner", "user_id": "AIDA"}}"#;
    Arc::new(SnapshotCloud::from_json_str(inventory).unwrap())
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}
