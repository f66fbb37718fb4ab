//! `scan`: one account, one report.

use super::context::{clean_regions, load_cloud, load_config, parse_resource_types, runtime};
use super::error::HelpfulError;
use super::output::{color_for_status, format_number, format_percent, print_table, print_table_colored};
use perimeter_scan::export::{CsvExporter, ExportLocation, ExportTarget, LogExporter, ScanExporter};
use perimeter_scan::{RoleHint, ScanConfig, ScanRequest, ScanResult, Scanner};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

pub const SCAN_SESSION_NAME: &str = "perimeter-guard-scan";

#[derive(Debug, clap::Args)]
pub struct ScanArgs {
    /// Regions to scan (comma-separated or repeated)
    #[arg(short = 'r', long = "regions", env = "SCAN_REGIONS", value_delimiter = ',')]
    pub regions: Vec<String>,

    /// Resource types to scan, e.g. APPLICATION_LOAD_BALANCER
    #[arg(short = 't', long = "types")]
    pub types: Vec<String>,

    /// CSV output path; `.csv` is appended when missing
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Write the CSV to stdout instead of a file
    #[arg(long, conflicts_with = "json")]
    pub stdout: bool,

    /// Print the full result as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Also emit structured report events to the log
    #[arg(long)]
    pub log_events: bool,

    /// Role to assume before scanning
    #[arg(long)]
    pub role_arn: Option<String>,

    #[arg(long, env = "EXTERNAL_ID")]
    pub external_id: Option<String>,

    /// Expected account id; the scan is refused if credentials resolve elsewhere
    #[arg(long)]
    pub account: Option<String>,

    /// Configuration file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Cloud inventory snapshot (JSON); live provider credentials are used when omitted
    #[arg(long, env = "PERIMETER_GUARD_INVENTORY")]
    pub inventory: Option<PathBuf>,

    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// Retries after a throttled call
    #[arg(long)]
    pub retry_limit: Option<u32>,

    /// Overall scan deadline in seconds
    #[arg(long)]
    pub deadline_secs: Option<u64>,
}

/// Apply command-line overrides on top of the loaded configuration.
pub fn apply_overrides(
    mut config: ScanConfig,
    regions: &[String],
    types: &[String],
    max_concurrency: Option<usize>,
    retry_limit: Option<u32>,
    deadline_secs: Option<u64>,
) -> anyhow::Result<ScanConfig> {
    let regions = clean_regions(regions);
    if !regions.is_empty() {
        config.regions = regions;
    }
    let types = parse_resource_types(types)?;
    if !types.is_empty() {
        config.resource_types = types;
    }
    if let Some(n) = max_concurrency {
        config.max_concurrency = n;
    }
    if let Some(n) = retry_limit {
        config.retry_limit = n;
    }
    if deadline_secs.is_some() {
        config.deadline_secs = deadline_secs;
    }
    config
        .validate()
        .map_err(|e| HelpfulError::config_invalid(None, &e.to_string()))?;
    Ok(config)
}

#[derive(Serialize)]
struct ScanJson<'a> {
    #[serde(flatten)]
    result: &'a ScanResult,
    compliance_rate: f64,
    waf_coverage_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
}

pub fn run(args: ScanArgs, quiet: bool) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let config = apply_overrides(
        config,
        &args.regions,
        &args.types,
        args.max_concurrency,
        args.retry_limit,
        args.deadline_secs,
    )?;
    let rt = runtime()?;
    let cloud = load_cloud(args.inventory.as_deref(), &rt, &config.global_region)?;
    let scanner = Scanner::new(cloud, config)?;

    let request = ScanRequest {
        regions: None,
        resource_types: None,
        account_id: args.account.clone(),
        role: args.role_arn.as_ref().map(|role_arn| RoleHint {
            role_arn: role_arn.clone(),
            external_id: args.external_id.clone(),
            session_name: SCAN_SESSION_NAME.to_string(),
        }),
    };

    let result = rt.block_on(scanner.scan(request))?;

    // CSV goes out unless JSON was asked for without an explicit path
    let target = if args.stdout {
        Some(ExportTarget::Stdout)
    } else if let Some(path) = &args.output {
        Some(ExportTarget::File(path.clone()))
    } else if args.json {
        None
    } else {
        Some(ExportTarget::Default)
    };
    let location = match target {
        Some(target) => Some(export_csv(&result, &target)?),
        None => None,
    };

    if args.log_events {
        LogExporter::new()
            .export(&result, &ExportTarget::Default)
            .map_err(|e| HelpfulError::export_failed("log", &e.to_string()))?;
    }

    if args.json {
        let body = ScanJson {
            result: &result,
            compliance_rate: result.compliance_rate(),
            waf_coverage_rate: result.waf_coverage_rate(),
            output: location.as_ref().map(|l| l.to_string()),
        };
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else if !args.stdout && !quiet {
        print_summary(&result, location.as_ref());
    }
    Ok(())
}

fn export_csv(result: &ScanResult, target: &ExportTarget) -> anyhow::Result<ExportLocation> {
    let exporter = CsvExporter::new();
    let location = exporter
        .export(result, target)
        .map_err(|e| HelpfulError::export_failed(&target_label(target), &e.to_string()))?;
    info!(format = exporter.format_name(), location = %location, "Report exported");
    Ok(location)
}

fn target_label(target: &ExportTarget) -> String {
    match target {
        ExportTarget::File(path) => path.display().to_string(),
        ExportTarget::Stdout => "stdout".to_string(),
        ExportTarget::Default => "the current directory".to_string(),
    }
}

/// Human-readable report on stdout.
pub fn print_summary(result: &ScanResult, location: Option<&ExportLocation>) {
    let counters = result.counters();
    println!("WAF PERIMETER SCAN");
    println!("==================");
    println!();
    println!("Account:          {}", result.account_id());
    println!("Scan ID:          {}", result.scan_id());
    println!("Regions:          {}", result.regions().join(", "));
    println!("Resources:        {}", format_number(counters.total));
    println!(
        "With WAF:         {} ({})",
        format_number(counters.with_waf),
        format_percent(result.waf_coverage_rate())
    );
    println!("Without WAF:      {}", format_number(counters.without_waf));
    println!("Fronted by CDN:   {}", format_number(counters.fronted));
    println!("Compliance rate:  {}", format_percent(result.compliance_rate()));
    println!("Errors:           {}", result.errors().len());
    if let Some(location) = location {
        println!("Report:           {}", location);
    }

    let by_type = result.by_type();
    if !by_type.is_empty() {
        println!();
        let rows = by_type
            .iter()
            .map(|(rt, resources)| {
                let with_waf = resources.iter().filter(|r| r.record.has_waf()).count();
                let non_compliant = resources
                    .iter()
                    .filter(|r| !r.compliance_status.is_compliant())
                    .count();
                vec![
                    rt.display_name().to_string(),
                    format_number(resources.len()),
                    format_number(with_waf),
                    format_number(non_compliant),
                ]
            })
            .collect();
        print_table(&["Resource Type", "Total", "With WAF", "Non-compliant"], rows);
    }

    let flagged: Vec<_> = result.non_compliant().collect();
    if !flagged.is_empty() {
        println!();
        println!("NON-COMPLIANT RESOURCES");
        let rows = flagged
            .iter()
            .map(|r| {
                vec![
                    (r.record.display_name().to_string(), None),
                    (r.record.resource_type.display_name().to_string(), None),
                    (r.record.region.clone(), None),
                    (
                        r.compliance_status.as_str().to_string(),
                        Some(color_for_status(r.compliance_status)),
                    ),
                ]
            })
            .collect();
        print_table_colored(&["Name", "Type", "Region", "Status"], rows);
    }

    if result.has_errors() {
        println!();
        println!("SCAN ERRORS");
        let rows = result
            .errors()
            .iter()
            .map(|e| {
                vec![
                    e.region.clone(),
                    e.resource_type
                        .map(|t| t.display_name().to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    e.kind.as_str().to_string(),
                    e.message.clone(),
                ]
            })
            .collect();
        print_table(&["Region", "Type", "Kind", "Message"], rows);
    }
}
