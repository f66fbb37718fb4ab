//! `whoami`: show which account the credentials resolve to.

use super::context::{load_cloud, runtime};
use perimeter_scan::config::DEFAULT_REGION;
use std::path::PathBuf;

#[derive(Debug, clap::Args)]
pub struct WhoamiArgs {
    #[arg(long, env = "PERIMETER_GUARD_INVENTORY")]
    pub inventory: Option<PathBuf>,

    #[arg(long)]
    pub json: bool,
}

pub fn run(args: WhoamiArgs) -> anyhow::Result<()> {
    let rt = runtime()?;
    let cloud = load_cloud(args.inventory.as_deref(), &rt, DEFAULT_REGION)?;
    let identity = rt.block_on(cloud.caller_identity())?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&identity)?);
    } else {
        println!("Account:  {}", identity.account);
        println!("ARN:      {}", identity.arn);
        println!("User ID:  {}", identity.user_id);
    }
    Ok(())
}
