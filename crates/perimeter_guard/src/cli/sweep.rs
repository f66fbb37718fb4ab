//! `sweep`: scan several accounts through an assumed role.

use super::context::{clean_regions, load_cloud, load_config, parse_resource_types, runtime};
use super::error::HelpfulError;
use super::output::{format_number, format_percent, print_table};
use perimeter_scan::export::{CsvExporter, ExportTarget, ScanExporter, DEFAULT_FILENAME_PREFIX};
use perimeter_scan::sweep::DEFAULT_ROLE_NAME;
use perimeter_scan::{Scanner, SweepReport, SweepRequest};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, clap::Args)]
pub struct SweepArgs {
    /// Target account ids (comma-separated); empty scans the local account
    #[arg(long, env = "TARGET_ACCOUNTS", default_value = "")]
    pub accounts: String,

    /// Role assumed in each target account
    #[arg(long, env = "ASSUME_ROLE_NAME", default_value = DEFAULT_ROLE_NAME)]
    pub role_name: String,

    #[arg(long, env = "EXTERNAL_ID")]
    pub external_id: Option<String>,

    #[arg(short = 'r', long = "regions", env = "SCAN_REGIONS", value_delimiter = ',')]
    pub regions: Vec<String>,

    #[arg(short = 't', long = "types")]
    pub types: Vec<String>,

    /// Write one CSV per scanned account into this directory
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Print the sweep report as JSON
    #[arg(long)]
    pub json: bool,

    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long, env = "PERIMETER_GUARD_INVENTORY")]
    pub inventory: Option<PathBuf>,
}

impl SweepArgs {
    fn request(&self) -> anyhow::Result<SweepRequest> {
        let regions = clean_regions(&self.regions);
        let types = parse_resource_types(&self.types)?;
        Ok(SweepRequest {
            accounts: SweepRequest::parse_accounts(&self.accounts),
            role_name: self.role_name.trim().to_string(),
            external_id: self.external_id.clone().filter(|id| !id.is_empty()),
            regions: (!regions.is_empty()).then_some(regions),
            resource_types: (!types.is_empty()).then_some(types),
        })
    }
}

/// Exit code for a finished sweep: failure only when nothing was scanned.
pub fn sweep_failed(report: &SweepReport) -> bool {
    report.accounts_scanned == 0 && report.accounts_failed > 0
}

pub fn run(args: SweepArgs, quiet: bool) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let request = args.request()?;
    let rt = runtime()?;
    let cloud = load_cloud(args.inventory.as_deref(), &rt, &config.global_region)?;
    let scanner = Scanner::new(cloud, config)?;

    let report = rt.block_on(scanner.sweep(request));

    if let Some(dir) = &args.output_dir {
        let exporter = CsvExporter::new();
        for result in &report.results {
            let path = dir.join(perimeter_scan::export::default_output_filename(
                result,
                DEFAULT_FILENAME_PREFIX,
            ));
            let location = exporter
                .export(result, &ExportTarget::File(path.clone()))
                .map_err(|e| HelpfulError::export_failed(&path.display().to_string(), &e.to_string()))?;
            info!(account = result.account_id(), location = %location, "Account report exported");
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if !quiet {
        print_report(&report);
    }

    if sweep_failed(&report) {
        anyhow::bail!(
            "Sweep failed: none of {} account(s) could be scanned",
            report.accounts_failed
        );
    }
    Ok(())
}

fn print_report(report: &SweepReport) {
    println!("WAF PERIMETER SWEEP");
    println!("===================");
    println!();
    println!("Accounts scanned:  {}", report.accounts_scanned);
    println!("Accounts failed:   {}", report.accounts_failed);
    println!("Resources:         {}", format_number(report.total_resources));
    println!("With WAF:          {}", format_number(report.resources_with_waf));
    println!("Without WAF:       {}", format_number(report.resources_without_waf));
    println!(
        "Overall coverage:  {}",
        format_percent(report.overall_compliance_rate)
    );

    if !report.results_by_account.is_empty() {
        println!();
        let rows = report
            .results_by_account
            .iter()
            .map(|s| {
                vec![
                    s.account_id.clone(),
                    format_number(s.total_resources),
                    format_number(s.resources_with_waf),
                    format_number(s.non_compliant),
                    format_percent(s.compliance_rate),
                    s.errors_count.to_string(),
                ]
            })
            .collect();
        print_table(
            &["Account", "Resources", "With WAF", "Non-compliant", "Compliance", "Errors"],
            rows,
        );
    }

    if !report.errors.is_empty() {
        println!();
        println!("FAILED ACCOUNTS");
        let rows = report
            .errors
            .iter()
            .map(|f| vec![f.account_id.clone(), f.error.clone()])
            .collect();
        print_table(&["Account", "Error"], rows);
    }
}
