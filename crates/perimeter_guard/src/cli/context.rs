//! Shared setup for commands: inventory, configuration, runtime.

use super::error::HelpfulError;
use perimeter_scan::{CloudApi, ResourceType, ScanConfig, SnapshotCloud};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::debug;

pub const CONFIG_FILE_NAME: &str = "config.toml";

/// `<home>/config.toml`, when a home directory can be resolved
pub fn default_config_path() -> Option<PathBuf> {
    perimeter_logging::perimeter_home()
        .ok()
        .map(|home| home.join(CONFIG_FILE_NAME))
}

/// Cloud client for a command: the inventory snapshot when one is given,
/// otherwise the provider credentials found in the environment.
pub fn load_cloud(
    inventory: Option<&Path>,
    rt: &Runtime,
    home_region: &str,
) -> anyhow::Result<Arc<dyn CloudApi>> {
    match inventory {
        Some(path) => Ok(load_inventory(path)?),
        None => live_cloud(rt, home_region),
    }
}

pub fn load_inventory(path: &Path) -> anyhow::Result<Arc<SnapshotCloud>> {
    let cloud = SnapshotCloud::load(path)
        .map_err(|e| HelpfulError::inventory_unreadable(path, &e.to_string()))?;
    Ok(Arc::new(cloud))
}

#[cfg(feature = "aws")]
fn live_cloud(rt: &Runtime, home_region: &str) -> anyhow::Result<Arc<dyn CloudApi>> {
    debug!(region = home_region, "No inventory given, using provider credentials");
    let cloud = rt.block_on(perimeter_scan::AwsCloud::from_env(home_region));
    Ok(Arc::new(cloud))
}

#[cfg(not(feature = "aws"))]
fn live_cloud(_rt: &Runtime, _home_region: &str) -> anyhow::Result<Arc<dyn CloudApi>> {
    Err(HelpfulError::inventory_required().into())
}

/// Explicit `--config`, else `<home>/config.toml` if present, else defaults.
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<ScanConfig> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => default_config_path().filter(|p| p.exists()),
    };
    match path {
        Some(path) => {
            debug!(path = %path.display(), "Loading configuration");
            ScanConfig::load(&path)
                .map_err(|e| HelpfulError::config_invalid(Some(&path), &e.to_string()).into())
        }
        None => Ok(ScanConfig::default()),
    }
}

/// Parse `-t` values; each may itself be comma-separated.
pub fn parse_resource_types(raw: &[String]) -> anyhow::Result<Vec<ResourceType>> {
    let mut types = Vec::new();
    for item in raw.iter().flat_map(|s| s.split(',')) {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let rt: ResourceType = item
            .parse()
            .map_err(|_| HelpfulError::unknown_resource_type(item))?;
        if !types.contains(&rt) {
            types.push(rt);
        }
    }
    Ok(types)
}

/// Trimmed, de-duplicated region names; blanks dropped.
pub fn clean_regions(raw: &[String]) -> Vec<String> {
    let mut regions: Vec<String> = Vec::new();
    for region in raw.iter().flat_map(|s| s.split(',')) {
        let region = region.trim();
        if !region.is_empty() && !regions.iter().any(|r| r == region) {
            regions.push(region.to_string());
        }
    }
    regions
}

pub fn runtime() -> anyhow::Result<Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}
