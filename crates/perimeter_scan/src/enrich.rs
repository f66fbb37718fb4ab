//! Attaching direct and fronted-by Web ACL findings to discovered records.

use crate::cloud::CloudResult;
use crate::config::FrontingTieBreak;
use crate::error::ScanError;
use crate::origin::{OriginEntry, OriginIndex, OriginMatcher};
use crate::result::ScanErrorRecord;
use crate::types::{FrontedBy, ResourceRecord, WebAclRef};
use crate::waf_index::WafIndex;
use tracing::{debug, warn};

/// Attach direct associations from `index`. Returns how many records matched.
///
/// Records that already carry a Web ACL from discovery are skipped.
pub fn attach_direct(records: &mut [ResourceRecord], index: &WafIndex) -> usize {
    let mut attached = 0;
    for record in records.iter_mut() {
        if record.has_waf() {
            continue;
        }
        let Some(acl) = index.get(&record.arn) else {
            continue;
        };
        match record.attach_web_acl(acl.clone()) {
            Ok(()) => attached += 1,
            Err(err) => warn!(resource = %record.arn, error = %err, "Direct association rejected"),
        }
    }
    attached
}

/// Choose the distribution whose Web ACL protects an origin.
pub fn select_fronting(
    entries: &[OriginEntry],
    tie_break: FrontingTieBreak,
) -> Option<(&OriginEntry, &WebAclRef)> {
    let mut candidates = entries
        .iter()
        .filter_map(|entry| entry.web_acl.as_ref().map(|acl| (entry, acl)));
    match tie_break {
        FrontingTieBreak::IndexOrder => candidates.next(),
        FrontingTieBreak::LowestDistributionId => {
            candidates.min_by(|a, b| a.0.distribution_id.cmp(&b.0.distribution_id))
        }
    }
}

/// Mark `record` as fronted when a distribution serving `domain` has a Web ACL.
///
/// Records with a direct Web ACL are left alone. Returns whether the record
/// was enriched.
pub fn apply_fronting(
    record: &mut ResourceRecord,
    domain: &str,
    index: &OriginIndex,
    tie_break: FrontingTieBreak,
) -> Result<bool, ScanError> {
    if record.has_waf() || record.fronted_by().is_some() {
        return Ok(false);
    }
    let Some((entry, acl)) = select_fronting(index.lookup(domain), tie_break) else {
        return Ok(false);
    };
    record.attach_fronted_by(FrontedBy::new(
        entry.distribution_arn.clone(),
        entry.distribution_id.clone(),
        acl.clone(),
    ))?;
    Ok(true)
}

#[derive(Debug, Default)]
pub struct FrontingOutcome {
    pub fronted: usize,
    pub errors: Vec<ScanErrorRecord>,
}

/// Run the matcher over every record lacking a direct Web ACL and attach
/// fronting where the origin index has a protected distribution.
pub async fn enrich_fronting(
    records: &mut [ResourceRecord],
    index: &OriginIndex,
    matcher: &mut OriginMatcher,
    tie_break: FrontingTieBreak,
) -> CloudResult<FrontingOutcome> {
    let mut outcome = FrontingOutcome::default();
    if index.is_empty() {
        return Ok(outcome);
    }

    for record in records.iter_mut() {
        if record.has_waf() || !record.resource_type.can_be_fronted() {
            continue;
        }
        let domain = match matcher.origin_domain_for(record).await {
            Ok(Some(domain)) => domain,
            Ok(None) => continue,
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                warn!(resource = %record.arn, error = %err, "Origin lookup failed");
                outcome.errors.push(ScanErrorRecord::from_cloud_error(
                    record.region.clone(),
                    Some(record.resource_type),
                    &err,
                ));
                continue;
            }
        };
        match apply_fronting(record, &domain, index, tie_break) {
            Ok(true) => {
                debug!(resource = %record.arn, origin = %domain, "Resource fronted by distribution");
                outcome.fronted += 1;
            }
            Ok(false) => {}
            Err(err) => {
                warn!(resource = %record.arn, error = %err, "Fronting rejected");
            }
        }
    }
    Ok(outcome)
}
