//! `list-resource-types` and `list-regions`.

use super::context::{load_config, load_inventory};
use super::output::{print_table, yes_no};
use perimeter_scan::ResourceType;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, clap::Args)]
pub struct ListTypesArgs {
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, clap::Args)]
pub struct ListRegionsArgs {
    /// List the regions present in an inventory instead of the configured ones
    #[arg(long, env = "PERIMETER_GUARD_INVENTORY")]
    pub inventory: Option<PathBuf>,

    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ResourceTypeInfo {
    pub resource_type: ResourceType,
    pub display_name: &'static str,
    pub service: &'static str,
    pub waf_scope: &'static str,
    pub supports_direct_waf: bool,
    pub can_be_fronted: bool,
}

impl From<ResourceType> for ResourceTypeInfo {
    fn from(rt: ResourceType) -> Self {
        Self {
            resource_type: rt,
            display_name: rt.display_name(),
            service: rt.aws_service(),
            waf_scope: rt.waf_scope().as_str(),
            supports_direct_waf: rt.supports_direct_waf(),
            can_be_fronted: rt.can_be_fronted(),
        }
    }
}

pub fn resource_type_infos() -> Vec<ResourceTypeInfo> {
    ResourceType::all().iter().copied().map(ResourceTypeInfo::from).collect()
}

pub fn run_list_types(args: ListTypesArgs) -> anyhow::Result<()> {
    let infos = resource_type_infos();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
        return Ok(());
    }
    let rows = infos
        .iter()
        .map(|info| {
            vec![
                info.resource_type.as_str().to_string(),
                info.display_name.to_string(),
                info.waf_scope.to_string(),
                yes_no(info.supports_direct_waf).to_string(),
                yes_no(info.can_be_fronted).to_string(),
            ]
        })
        .collect();
    print_table(
        &["Type", "Name", "WAF Scope", "Direct WAF", "CDN Frontable"],
        rows,
    );
    Ok(())
}

pub fn run_list_regions(args: ListRegionsArgs) -> anyhow::Result<()> {
    let (source, regions) = match args.inventory.as_deref() {
        Some(path) => ("inventory", load_inventory(path)?.regions()),
        None => ("config", load_config(args.config.as_deref())?.regions),
    };
    if args.json {
        println!(
            "{}",
            serde_json::json!({ "source": source, "regions": regions })
        );
    } else {
        for region in &regions {
            println!("{}", region);
        }
    }
    Ok(())
}
