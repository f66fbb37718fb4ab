//! Perimeter Guard
//!
//! Reports which internet-facing resources in an account are protected by
//! a Web ACL, directly or through a CDN distribution in front of them.

use clap::{Parser, Subcommand};
use perimeter_logging::{init_logging, LogConfig, Verbosity};
use std::process::ExitCode;
use tracing::debug;

mod cli;

#[derive(Parser, Debug)]
#[command(
    name = "perimeter-guard",
    version,
    about = "WAF perimeter coverage scanner"
)]
struct Cli {
    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Only print errors; suppresses the human summary
    #[arg(short = 'q', long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan one account and export a coverage report
    Scan(cli::scan::ScanArgs),

    /// Scan several accounts through an assumed role
    Sweep(cli::sweep::SweepArgs),

    /// Show the account the credentials resolve to
    Whoami(cli::identity::WhoamiArgs),

    /// List the resource types that can be scanned
    ListResourceTypes(cli::catalog::ListTypesArgs),

    /// List regions from an inventory or the configuration
    ListRegions(cli::catalog::ListRegionsArgs),

    /// Show paths and the effective configuration
    Config(cli::config::ConfigArgs),
}

fn command_wants_json(command: &Commands) -> bool {
    match command {
        Commands::Scan(args) => args.json,
        Commands::Sweep(args) => args.json,
        Commands::Whoami(args) => args.json,
        Commands::ListResourceTypes(args) => args.json,
        Commands::ListRegions(args) => args.json,
        Commands::Config(args) => args.json,
    }
}

fn run_command(cli: Cli) -> anyhow::Result<()> {
    let quiet = cli.quiet;
    match cli.command {
        Commands::Scan(args) => cli::scan::run(args, quiet),
        Commands::Sweep(args) => cli::sweep::run(args, quiet),
        Commands::Whoami(args) => cli::identity::run(args),
        Commands::ListResourceTypes(args) => cli::catalog::run_list_types(args),
        Commands::ListRegions(args) => cli::catalog::run_list_regions(args),
        Commands::Config(args) => cli::config::run(args),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let json_mode = command_wants_json(&cli.command);

    let _log_guard = match init_logging(LogConfig {
        app_name: "perimeter-guard",
        verbosity: Verbosity::from_flags(cli.verbose, cli.quiet),
        file_logging: true,
    }) {
        Ok(guard) => {
            if let Some(dir) = &guard.log_dir {
                debug!(log_dir = %dir.display(), "File logging enabled");
            }
            Some(guard)
        }
        Err(err) => {
            eprintln!("Warning: logging unavailable: {:#}", err);
            None
        }
    };

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if json_mode {
                cli::error::print_json_error(&err);
            } else {
                eprintln!("{}", err);
            }
            ExitCode::from(1)
        }
    }
}
