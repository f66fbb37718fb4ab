//! Scanner configuration

use crate::error::{Result, ScanError};
use crate::retry::RetryPolicy;
use crate::types::ResourceType;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Region scanned when nothing else is requested
pub const DEFAULT_REGION: &str = "us-east-1";

/// How to choose between several distributions fronting the same origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FrontingTieBreak {
    /// First distribution with a Web ACL, in the order distributions were listed
    #[default]
    IndexOrder,
    /// Lexicographically smallest distribution id with a Web ACL
    LowestDistributionId,
}

impl FrontingTieBreak {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IndexOrder => "index-order",
            Self::LowestDistributionId => "lowest-distribution-id",
        }
    }
}

impl std::str::FromStr for FrontingTieBreak {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "index-order" => Ok(Self::IndexOrder),
            "lowest-distribution-id" => Ok(Self::LowestDistributionId),
            other => Err(ScanError::Config(format!(
                "unknown fronting tie-break '{}'",
                other
            ))),
        }
    }
}

/// Options recognised by the scanner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScanConfig {
    /// Regions scanned when a request does not name any
    #[serde(default = "default_regions")]
    pub regions: Vec<String>,

    /// Resource types scanned when a request does not name any
    #[serde(default = "default_resource_types")]
    pub resource_types: Vec<ResourceType>,

    /// Maximum units of discovery work in flight
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Retries after a throttled call before the unit is given up
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Overall discovery deadline; unset means no deadline
    #[serde(default)]
    pub deadline_secs: Option<u64>,

    /// Region from which the global (CDN) namespace is resolved
    #[serde(default = "default_global_region")]
    pub global_region: String,

    #[serde(default)]
    pub fronting_tie_break: FrontingTieBreak,
}

fn default_regions() -> Vec<String> {
    vec![DEFAULT_REGION.to_string()]
}

fn default_resource_types() -> Vec<ResourceType> {
    ResourceType::all().to_vec()
}

fn default_max_concurrency() -> usize {
    4
}

fn default_retry_limit() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    200
}

fn default_retry_max_delay_ms() -> u64 {
    5_000
}

fn default_global_region() -> String {
    DEFAULT_REGION.to_string()
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            regions: default_regions(),
            resource_types: default_resource_types(),
            max_concurrency: default_max_concurrency(),
            retry_limit: default_retry_limit(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            deadline_secs: None,
            global_region: default_global_region(),
            fronting_tie_break: FrontingTieBreak::default(),
        }
    }
}

impl ScanConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ScanError::Config(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ScanError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.regions.is_empty() {
            return Err(ScanError::Config("at least one region is required".into()));
        }
        if self.regions.iter().any(|r| r.trim().is_empty()) {
            return Err(ScanError::Config("region names must not be empty".into()));
        }
        if self.resource_types.is_empty() {
            return Err(ScanError::Config(
                "at least one resource type is required".into(),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(ScanError::Config("max_concurrency must be at least 1".into()));
        }
        if self.max_concurrency > Semaphore::MAX_PERMITS {
            return Err(ScanError::Config(format!(
                "max_concurrency must not exceed {}",
                Semaphore::MAX_PERMITS
            )));
        }
        if self.global_region.trim().is_empty() {
            return Err(ScanError::Config("global_region must not be empty".into()));
        }
        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            return Err(ScanError::Config(
                "retry_base_delay_ms must not exceed retry_max_delay_ms".into(),
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry_limit,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = ScanConfig::default();
        assert_eq!(config.regions, vec!["us-east-1".to_string()]);
        assert_eq!(config.resource_types.len(), 8);
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.retry_limit, 3);
        assert_eq!(config.fronting_tie_break, FrontingTieBreak::IndexOrder);
        assert!(config.deadline().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = ScanConfig::from_toml(
            r#"
regions = ["eu-west-1", "us-west-2"]
resource_types = ["API_GATEWAY_HTTP_API"]
fronting_tie_break = "lowest-distribution-id"
deadline_secs = 30
"#,
        )
        .unwrap();
        assert_eq!(config.regions.len(), 2);
        assert_eq!(config.resource_types, vec![ResourceType::ApiGatewayHttpApi]);
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.global_region, "us-east-1");
        assert_eq!(
            config.fronting_tie_break,
            FrontingTieBreak::LowestDistributionId
        );
        assert_eq!(config.deadline(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let err = ScanConfig::from_toml("regions = [\"us-east-1\"]\nworkers = 9\n").unwrap_err();
        assert!(matches!(err, ScanError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ScanConfig::default();
        config.regions.clear();
        assert!(config.validate().is_err());

        let mut config = ScanConfig::default();
        config.max_concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = ScanConfig::default();
        config.max_concurrency = usize::MAX;
        assert!(config.validate().is_err());
        config.max_concurrency = Semaphore::MAX_PERMITS;
        assert!(config.validate().is_ok());

        let mut config = ScanConfig::default();
        config.global_region = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = ScanConfig::default();
        config.retry_base_delay_ms = 10_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("perimeter.toml");

        let mut config = ScanConfig::default();
        config.regions = vec!["ap-southeast-2".to_string()];
        config.retry_limit = 5;
        config.save(&path).unwrap();

        let loaded = ScanConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_retry_policy_from_config() {
        let policy = ScanConfig::default().retry_policy();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(200));
        assert_eq!(policy.max_delay, Duration::from_millis(5_000));
    }
}
