//! Direct Web ACL associations for one (region, scope).

use crate::arn::{rest_api_from_stage, Arn};
use crate::cloud::{collect_pages, CloudApi, CloudResult, WafBinding, WebAclSummary};
use crate::result::{ErrorKind, ScanErrorRecord};
use crate::retry::RetryPolicy;
use crate::types::{ResourceType, WafScope, WebAclRef};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Resource ARN -> bound Web ACL, plus whatever went wrong building it
#[derive(Debug, Default)]
pub struct WafIndex {
    pub associations: HashMap<String, WebAclRef>,
    pub warnings: Vec<ScanErrorRecord>,
}

impl WafIndex {
    pub fn get(&self, resource_arn: &str) -> Option<&WebAclRef> {
        self.associations.get(resource_arn)
    }

    pub fn len(&self) -> usize {
        self.associations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.associations.is_empty()
    }

    /// Fold another index in. Keys are disjoint across regions and scopes,
    /// so a collision here is itself an ambiguous binding.
    pub fn merge(&mut self, other: WafIndex) {
        self.warnings.extend(other.warnings);
        for (arn, acl) in other.associations {
            if let Some(previous) = self.associations.get(&arn) {
                if previous.arn != acl.arn {
                    self.warnings.push(ScanErrorRecord::warning(
                        acl.region.clone(),
                        None,
                        ErrorKind::AmbiguousBinding,
                        format!(
                            "{} bound to both {} and {}; keeping {}",
                            arn, previous.name, acl.name, acl.name
                        ),
                    ));
                }
            }
            self.associations.insert(arn, acl);
        }
    }
}

pub struct WafAssociationIndex {
    cloud: Arc<dyn CloudApi>,
    retry: RetryPolicy,
}

impl WafAssociationIndex {
    pub fn new(cloud: Arc<dyn CloudApi>, retry: RetryPolicy) -> Self {
        Self { cloud, retry }
    }

    /// Build the association map for `scope` as seen from `region`.
    ///
    /// Only bindings relevant to `resource_types` are queried. Listing the
    /// Web ACLs themselves failing is returned as an error; a single binding
    /// query failing is recorded and the rest of the index still built,
    /// unless the failure is fatal.
    pub async fn resolve(
        &self,
        region: &str,
        scope: WafScope,
        resource_types: &[ResourceType],
    ) -> CloudResult<WafIndex> {
        let mut index = WafIndex::default();
        let bindings = WafBinding::for_scope(scope, resource_types);
        if bindings.is_empty() {
            return Ok(index);
        }

        let cloud = self.cloud.as_ref();
        let summaries = collect_pages(&self.retry, "ListWebACLs", |token| async move {
            cloud.list_web_acls(scope, region, token.as_deref()).await
        })
        .await?;

        // API-level entries derived from stage bindings; first one wins
        let mut api_level: HashMap<String, WebAclRef> = HashMap::new();

        for summary in summaries {
            let acl = match web_acl_ref(&summary, region, scope) {
                Ok(acl) => acl,
                Err(message) => {
                    warn!(region, scope = %scope, %message, "Skipping Web ACL");
                    index.warnings.push(ScanErrorRecord::warning(
                        region,
                        None,
                        ErrorKind::MalformedData,
                        message,
                    ));
                    continue;
                }
            };

            let acl_arn = acl.arn.as_str();
            for &binding in &bindings {
                let arns = match self
                    .retry
                    .run("ListResourcesForWebACL", || {
                        cloud.list_resources_for_web_acl(acl_arn, region, binding)
                    })
                    .await
                {
                    Ok(arns) => arns,
                    Err(err) if err.is_fatal() => return Err(err),
                    Err(err) => {
                        warn!(region, web_acl = %acl.name, binding = binding.as_str(), error = %err, "Binding lookup failed");
                        index
                            .warnings
                            .push(ScanErrorRecord::from_cloud_error(region, None, &err));
                        continue;
                    }
                };

                for resource_arn in arns {
                    if let Err(message) = check_binding(&acl, &resource_arn) {
                        index.warnings.push(ScanErrorRecord::warning(
                            region,
                            None,
                            ErrorKind::MalformedData,
                            message,
                        ));
                        continue;
                    }
                    if let Some(api_arn) = rest_api_from_stage(&resource_arn) {
                        api_level
                            .entry(api_arn.to_string())
                            .or_insert_with(|| acl.clone());
                    }
                    insert_binding(&mut index, region, resource_arn, &acl);
                }
            }
        }

        for (api_arn, acl) in api_level {
            index.associations.entry(api_arn).or_insert(acl);
        }

        debug!(
            region,
            scope = %scope,
            associations = index.len(),
            warnings = index.warnings.len(),
            "Web ACL index built"
        );
        Ok(index)
    }
}

/// Last observation wins; a change of ACL is reported.
fn insert_binding(index: &mut WafIndex, region: &str, resource_arn: String, acl: &WebAclRef) {
    if let Some(previous) = index.associations.get(&resource_arn) {
        if previous.arn != acl.arn {
            warn!(region, resource = %resource_arn, first = %previous.name, second = %acl.name, "Ambiguous Web ACL binding");
            index.warnings.push(ScanErrorRecord::warning(
                region,
                None,
                ErrorKind::AmbiguousBinding,
                format!(
                    "{} reported under both {} and {}; keeping {}",
                    resource_arn, previous.name, acl.name, acl.name
                ),
            ));
        }
    }
    index.associations.insert(resource_arn, acl.clone());
}

fn web_acl_ref(summary: &WebAclSummary, region: &str, scope: WafScope) -> Result<WebAclRef, String> {
    let mut acl = WebAclRef::from_arn(&summary.arn).map_err(|e| e.to_string())?;
    if acl.scope != scope {
        return Err(format!(
            "Web ACL {} has scope {} but was listed under {}",
            summary.arn, acl.scope, scope
        ));
    }
    if scope == WafScope::Regional && acl.region != region {
        return Err(format!(
            "Web ACL {} belongs to {} but was listed in {}",
            summary.arn, acl.region, region
        ));
    }
    acl.id = summary.id.clone();
    acl.name = summary.name.clone();
    acl.description = summary.description.clone();
    acl.managed_by_firewall_manager = summary.managed_by_firewall_manager;
    Ok(acl)
}

/// Regional ACLs bind only inside their region; global ACLs bind only to distributions.
fn check_binding(acl: &WebAclRef, resource_arn: &str) -> Result<(), String> {
    let arn = Arn::parse(resource_arn).map_err(|e| e.to_string())?;
    match acl.scope {
        WafScope::Regional if arn.region != acl.region => Err(format!(
            "regional Web ACL {} in {} reported resource {} from {}",
            acl.name, acl.region, resource_arn, arn.region
        )),
        WafScope::Global if arn.service != "cloudfront" => Err(format!(
            "global Web ACL {} reported non-distribution resource {}",
            acl.name, resource_arn
        )),
        _ => Ok(()),
    }
}
