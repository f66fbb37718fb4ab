//! Inventory builders shared by the integration tests.

#![allow(dead_code)]

use perimeter_scan::snapshot::SnapshotCloud;
use perimeter_scan::{ClassifiedResource, ResourceType, ScanConfig, ScanResult};
use serde_json::{json, Value};
use std::sync::Arc;

pub const ACCOUNT: &str = "123456789012";
pub const EDGE_WAF_ARN: &str = "arn:aws:wafv2:us-east-1:123456789012:global/webacl/edge-waf/e1";

/// Inventory with an identity and nothing else.
pub fn inventory(account: &str) -> Value {
    json!({
        "identity": {
            "account": account,
            "arn": format!("arn:aws:iam::{}:user/scanner", account),
            "user_id": "AIDAEXAMPLE"
        },
        "regions": {},
        "global": {"web_acls": [], "distributions": []},
        "accounts": {},
        "faults": []
    })
}

fn region_mut<'a>(inv: &'a mut Value, region: &str) -> &'a mut Value {
    let regions = &mut inv["regions"];
    if regions.get(region).is_none() {
        regions[region] = json!({"resources": [], "web_acls": []});
    }
    &mut regions[region]
}

fn push(target: &mut Value, item: Value) {
    if let Some(list) = target.as_array_mut() {
        list.push(item);
    }
}

pub fn add_resource(inv: &mut Value, region: &str, summary: Value) {
    push(&mut region_mut(inv, region)["resources"], summary);
}

pub fn ensure_region(inv: &mut Value, region: &str) {
    region_mut(inv, region);
}

pub fn regional_acl_arn(region: &str, name: &str) -> String {
    format!(
        "arn:aws:wafv2:{}:{}:regional/webacl/{}/{}-id",
        region, ACCOUNT, name, name
    )
}

pub fn add_regional_acl(inv: &mut Value, region: &str, name: &str, resources: &[&str]) -> String {
    let arn = regional_acl_arn(region, name);
    push(
        &mut region_mut(inv, region)["web_acls"],
        json!({
            "arn": arn,
            "id": format!("{}-id", name),
            "name": name,
            "resources": resources
        }),
    );
    arn
}

pub fn add_global_acl(inv: &mut Value, arn: &str, name: &str) {
    push(
        &mut inv["global"]["web_acls"],
        json!({"arn": arn, "id": "e1", "name": name}),
    );
}

pub fn add_distribution(inv: &mut Value, id: &str, web_acl: Option<&str>, origins: &[&str]) {
    let origins: Vec<Value> = origins
        .iter()
        .map(|domain| json!({"domain_name": domain}))
        .collect();
    push(
        &mut inv["global"]["distributions"],
        json!({
            "id": id,
            "arn": format!("arn:aws:cloudfront::{}:distribution/{}", ACCOUNT, id),
            "domain_name": format!("{}.cloudfront.net", id.to_lowercase()),
            "web_acl_id": web_acl,
            "origins": origins
        }),
    );
}

pub fn add_fault(inv: &mut Value, fault: Value) {
    push(&mut inv["faults"], fault);
}

pub fn http_api(id: &str, name: &str) -> Value {
    json!({"kind": "http_api", "api_id": id, "name": name})
}

pub fn rest_api(id: &str, endpoint: &str) -> Value {
    json!({"kind": "rest_api", "id": id, "name": id, "endpoint_types": [endpoint]})
}

pub fn alb_arn(region: &str, name: &str) -> String {
    format!(
        "arn:aws:elasticloadbalancing:{}:{}:loadbalancer/app/{}/50dc6c495c0c9188",
        region, ACCOUNT, name
    )
}

pub fn alb(region: &str, name: &str, scheme: &str) -> Value {
    json!({
        "kind": "load_balancer",
        "arn": alb_arn(region, name),
        "name": name,
        "dns_name": format!("{}-1234567890.{}.elb.amazonaws.com", name, region),
        "scheme": scheme
    })
}

pub fn user_pool(region: &str, suffix: &str) -> Value {
    json!({"kind": "user_pool", "id": format!("{}_{}", region, suffix), "name": suffix})
}

pub fn cloud(inv: &Value) -> Arc<SnapshotCloud> {
    Arc::new(SnapshotCloud::from_json_str(&inv.to_string()).expect("inventory parses"))
}

/// Fast retries so throttling tests do not wait on real backoff.
pub fn config(regions: &[&str], types: &[ResourceType]) -> ScanConfig {
    ScanConfig {
        regions: regions.iter().map(|r| r.to_string()).collect(),
        resource_types: types.to_vec(),
        retry_limit: 2,
        retry_base_delay_ms: 1,
        retry_max_delay_ms: 4,
        ..ScanConfig::default()
    }
}

pub fn find<'a>(result: &'a ScanResult, arn: &str) -> &'a ClassifiedResource {
    result
        .resources()
        .iter()
        .find(|r| r.record.arn == arn)
        .unwrap_or_else(|| panic!("{} not in result", arn))
}
