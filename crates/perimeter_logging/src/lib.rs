//! Shared logging setup for Perimeter Guard binaries.
//!
//! Console output goes to stderr so stdout stays free for reports. When a
//! home directory is available a daily rolling file is written as well.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Overrides the home directory (`~/.perimeter_guard`)
pub const HOME_ENV: &str = "PERIMETER_GUARD_HOME";

const DEFAULT_LOG_FILTER: &str = "perimeter_guard=info,perimeter_scan=info";
const VERBOSE_LOG_FILTER: &str = "perimeter_guard=debug,perimeter_scan=debug";
const QUIET_LOG_FILTER: &str = "error";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

impl Verbosity {
    /// `quiet` wins over `verbose`.
    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        if quiet {
            Self::Quiet
        } else if verbose {
            Self::Verbose
        } else {
            Self::Normal
        }
    }

    fn default_directive(&self) -> &'static str {
        match self {
            Self::Quiet => QUIET_LOG_FILTER,
            Self::Normal => DEFAULT_LOG_FILTER,
            Self::Verbose => VERBOSE_LOG_FILTER,
        }
    }
}

/// Logging configuration shared by Perimeter Guard binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbosity: Verbosity,
    /// Also write to `<home>/logs/<app_name>.log.<date>`
    pub file_logging: bool,
}

/// Keeps the background file writer alive; drop it last.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
    pub log_dir: Option<PathBuf>,
}

/// Initialize tracing with stderr output and an optional daily log file.
///
/// `RUST_LOG` replaces the default filter except in quiet mode, which
/// always limits the console to errors.
pub fn init_logging(config: LogConfig<'_>) -> Result<LoggingGuard> {
    let env_filter = EnvFilter::try_from_default_env().ok();
    let console_filter = match (config.verbosity, &env_filter) {
        (Verbosity::Quiet, _) | (_, None) => EnvFilter::new(config.verbosity.default_directive()),
        (_, Some(filter)) => filter.clone(),
    };

    let mut file_guard = None;
    let mut log_dir = None;
    let file_layer = if config.file_logging {
        match ensure_logs_dir() {
            Ok(dir) => {
                let appender =
                    tracing_appender::rolling::daily(&dir, format!("{}.log", config.app_name));
                let (writer, guard) = tracing_appender::non_blocking(appender);
                file_guard = Some(guard);
                log_dir = Some(dir);
                let file_filter = env_filter.unwrap_or_else(|| {
                    EnvFilter::new(match config.verbosity {
                        Verbosity::Verbose => VERBOSE_LOG_FILTER,
                        _ => DEFAULT_LOG_FILTER,
                    })
                });
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_filter(file_filter),
                )
            }
            Err(err) => {
                eprintln!("Warning: file logging disabled: {:#}", err);
                None
            }
        }
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(console_filter),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
        log_dir,
    })
}

/// Home directory: `$PERIMETER_GUARD_HOME`, else `~/.perimeter_guard`.
pub fn perimeter_home() -> Result<PathBuf> {
    resolve_home(std::env::var(HOME_ENV).ok(), dirs::home_dir())
}

fn resolve_home(override_path: Option<String>, home: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = override_path.filter(|p| !p.trim().is_empty()) {
        return Ok(PathBuf::from(path));
    }
    home.map(|h| h.join(".perimeter_guard"))
        .context("Could not determine home directory; set PERIMETER_GUARD_HOME")
}

/// Logs directory: `<home>/logs`
pub fn logs_dir() -> Result<PathBuf> {
    Ok(perimeter_home()?.join("logs"))
}

/// Ensure the logs directory exists.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir()?;
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_from_flags() {
        assert_eq!(Verbosity::from_flags(false, false), Verbosity::Normal);
        assert_eq!(Verbosity::from_flags(true, false), Verbosity::Verbose);
        assert_eq!(Verbosity::from_flags(true, true), Verbosity::Quiet);
    }

    #[test]
    fn test_resolve_home_prefers_override() {
        let home = resolve_home(Some("/srv/pg".into()), Some(PathBuf::from("/home/u"))).unwrap();
        assert_eq!(home, PathBuf::from("/srv/pg"));

        let home = resolve_home(Some("  ".into()), Some(PathBuf::from("/home/u"))).unwrap();
        assert_eq!(home, PathBuf::from("/home/u/.perimeter_guard"));

        assert!(resolve_home(None, None).is_err());
    }

    #[test]
    fn test_default_directives() {
        assert_eq!(Verbosity::Quiet.default_directive(), "error");
        assert!(Verbosity::Verbose.default_directive().contains("debug"));
        assert!(Verbosity::Normal.default_directive().contains("perimeter_scan=info"));
    }
}
