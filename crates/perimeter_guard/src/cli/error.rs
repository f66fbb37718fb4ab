//! Helpful error types for CLI commands
//!
//! Every error includes:
//! - What went wrong
//! - Context about the situation
//! - Suggestions for how to fix it

use std::fmt;
use std::path::Path;

/// An error with helpful context and suggestions
#[derive(Debug)]
pub struct HelpfulError {
    pub message: String,
    pub context: Option<String>,
    pub suggestions: Vec<String>,
}

impl HelpfulError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            suggestions: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_suggestions(mut self, suggestions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.suggestions.extend(suggestions.into_iter().map(|s| s.into()));
        self
    }

    // === Common error constructors ===

    /// No inventory was given for a command that needs provider data
    pub fn inventory_required() -> Self {
        Self::new("No cloud inventory specified")
            .with_context("This build reads provider data from a JSON inventory snapshot only")
            .with_suggestions([
                "TRY: perimeter-guard scan --inventory ./inventory.json",
                "TRY: export PERIMETER_GUARD_INVENTORY=./inventory.json",
            ])
    }

    pub fn inventory_unreadable(path: &Path, reason: &str) -> Self {
        Self::new(format!("Cannot load inventory: {}", path.display()))
            .with_context(reason.to_string())
            .with_suggestions([
                format!("TRY: Check the file exists: ls -la {}", path.display()),
                "TRY: Validate the JSON: python -m json.tool FILE".to_string(),
            ])
    }

    pub fn config_invalid(path: Option<&Path>, reason: &str) -> Self {
        let err = Self::new(format!("Invalid configuration: {}", reason));
        let err = match path {
            Some(path) => err.with_context(format!("While loading {}", path.display())),
            None => err,
        };
        err.with_suggestions([
            "TRY: perimeter-guard config   # show the effective configuration",
            "TRY: perimeter-guard config --init   # write a default config file",
        ])
    }

    pub fn unknown_resource_type(raw: &str) -> Self {
        Self::new(format!("Unknown resource type: '{}'", raw))
            .with_context("Resource types are given by their provider tag")
            .with_suggestion("TRY: perimeter-guard list-resource-types")
    }

    pub fn export_failed(target: &str, reason: &str) -> Self {
        Self::new(format!("Failed to write report to {}", target))
            .with_context(reason.to_string())
            .with_suggestions([
                "TRY: Check that the output directory is writable",
                "TRY: Use --stdout to write the CSV to standard output",
            ])
    }
}

impl fmt::Display for HelpfulError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ERROR: {}", self.message)?;

        if let Some(ctx) = &self.context {
            writeln!(f, "CONTEXT: {}", ctx)?;
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            for suggestion in &self.suggestions {
                writeln!(f, "  {}", suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for HelpfulError {}

/// JSON form of a command failure, for `--json` callers.
pub fn json_error(err: &anyhow::Error) -> serde_json::Value {
    match err.downcast_ref::<HelpfulError>() {
        Some(helpful) => serde_json::json!({
            "error": helpful.message,
            "context": helpful.context,
            "suggestions": helpful.suggestions,
        }),
        None => serde_json::json!({
            "error": format!("{:#}", err),
            "context": null,
            "suggestions": [],
        }),
    }
}

pub fn print_json_error(err: &anyhow::Error) {
    println!("{}", json_error(err));
}
