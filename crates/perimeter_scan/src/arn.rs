//! Minimal ARN parsing.
//!
//! Only the fields the resolver needs are extracted: the region (to keep
//! regional Web ACL bindings inside their region) and the account (to stamp
//! records whose listing API does not return it).

use crate::error::ArnError;
use std::fmt;

/// A parsed `arn:partition:service:region:account:resource` identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arn {
    pub partition: String,
    pub service: String,
    /// Empty for global services (CloudFront, IAM)
    pub region: String,
    /// Empty for some API Gateway ARNs
    pub account: String,
    /// Everything after the fifth colon, colons included
    pub resource: String,
}

impl Arn {
    pub fn parse(raw: &str) -> Result<Self, ArnError> {
        let mut parts = raw.splitn(6, ':');
        let prefix = parts.next().unwrap_or_default();
        if prefix != "arn" {
            return Err(ArnError::new(raw, "missing 'arn' prefix"));
        }

        let fields: Vec<&str> = parts.collect();
        if fields.len() != 5 {
            return Err(ArnError::new(
                raw,
                format!("expected 6 colon-separated fields, found {}", fields.len() + 1),
            ));
        }
        if fields[1].is_empty() {
            return Err(ArnError::new(raw, "empty service"));
        }
        if fields[4].is_empty() {
            return Err(ArnError::new(raw, "empty resource"));
        }

        Ok(Self {
            partition: fields[0].to_string(),
            service: fields[1].to_string(),
            region: fields[2].to_string(),
            account: fields[3].to_string(),
            resource: fields[4].to_string(),
        })
    }

    /// Last `/`-separated segment of the resource part.
    pub fn resource_id(&self) -> &str {
        self.resource.rsplit('/').next().unwrap_or(&self.resource)
    }
}

impl fmt::Display for Arn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "arn:{}:{}:{}:{}:{}",
            self.partition, self.service, self.region, self.account, self.resource
        )
    }
}

/// ARN of a CloudFront distribution.
pub fn distribution_arn(account: &str, distribution_id: &str) -> String {
    format!("arn:aws:cloudfront::{}:distribution/{}", account, distribution_id)
}

/// Strip a REST API stage suffix: `.../restapis/<id>/stages/<stage>` -> `.../restapis/<id>`.
pub fn rest_api_from_stage(arn: &str) -> Option<&str> {
    if !arn.contains("/restapis/") {
        return None;
    }
    arn.split_once("/stages/").map(|(api, _)| api)
}
