//! `config`: show paths and the effective configuration.

use super::context::{default_config_path, load_config, CONFIG_FILE_NAME};
use super::error::HelpfulError;
use perimeter_scan::ScanConfig;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, clap::Args)]
pub struct ConfigArgs {
    /// Configuration file to show instead of `<home>/config.toml`
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write a default configuration file if none exists
    #[arg(long)]
    pub init: bool,

    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct ConfigJson<'a> {
    home: Option<String>,
    config_path: Option<String>,
    config_exists: bool,
    logs_dir: Option<String>,
    config: &'a ScanConfig,
}

/// Write the default configuration to `path`, refusing to overwrite.
pub fn init_config(path: &Path) -> anyhow::Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    ScanConfig::default()
        .save(path)
        .map_err(|e| HelpfulError::config_invalid(Some(path), &e.to_string()))?;
    Ok(true)
}

pub fn run(args: ConfigArgs) -> anyhow::Result<()> {
    let home = perimeter_logging::perimeter_home().ok();
    let path = args
        .config
        .clone()
        .or_else(|| home.as_ref().map(|h| h.join(CONFIG_FILE_NAME)))
        .or_else(default_config_path);

    if args.init {
        let path = path
            .as_deref()
            .ok_or_else(|| HelpfulError::new("Cannot determine where to write the configuration")
                .with_suggestion("TRY: perimeter-guard config --init --config ./config.toml"))?;
        if init_config(path)? {
            eprintln!("Wrote default configuration to {}", path.display());
        } else {
            eprintln!("Configuration already exists: {}", path.display());
        }
    }

    let config = load_config(args.config.as_deref())?;
    let logs_dir = perimeter_logging::logs_dir().ok();
    let exists = path.as_deref().map(Path::exists).unwrap_or(false);

    if args.json {
        let body = ConfigJson {
            home: home.as_ref().map(|p| p.display().to_string()),
            config_path: path.as_ref().map(|p| p.display().to_string()),
            config_exists: exists,
            logs_dir: logs_dir.as_ref().map(|p| p.display().to_string()),
            config: &config,
        };
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let show = |p: &Option<PathBuf>| {
        p.as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string())
    };
    println!("Home:     {}", show(&home));
    println!(
        "Config:   {}{}",
        show(&path),
        if exists { "" } else { " (not found, using defaults)" }
    );
    println!("Logs:     {}", show(&logs_dir));
    println!();
    print!("{}", config.to_toml()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_writes_loadable_default() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("config.toml");

        assert!(init_config(&path).unwrap());
        assert_eq!(ScanConfig::load(&path).unwrap(), ScanConfig::default());

        // second init leaves the file alone
        fs::write(&path, "regions = [\"eu-west-1\"]\n").unwrap();
        assert!(!init_config(&path).unwrap());
        assert_eq!(ScanConfig::load(&path).unwrap().regions, vec!["eu-west-1"]);
    }
}
