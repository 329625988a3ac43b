use std::path::Path;

use {
    anyhow::Result,
    clap::Subcommand,
    trinity_config::{Diagnostic, Severity, TrinityConfig, ValidationResult, validate},
};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors and warnings.
    Check,
    /// Print the effective configuration as JSON, with secrets redacted.
    Show,
}

pub fn handle_config(action: ConfigAction, path: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Check => check(path),
        ConfigAction::Show => show(path),
    }
}

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn resolve(path: Option<&Path>) -> Option<std::path::PathBuf> {
    path.map(Path::to_path_buf)
        .or_else(trinity_config::find_config_file)
}

fn check(path: Option<&Path>) -> Result<()> {
    let result = match resolve(path) {
        Some(path) => {
            eprintln!("Checking {}\n", path.display());
            validate(&path)
        },
        None => {
            eprintln!("No config file found; checking defaults.\n");
            ValidationResult {
                diagnostics: validate::check(&TrinityConfig::default()),
                config_path: None,
            }
        },
    };

    for d in &result.diagnostics {
        eprintln!("  {}", render(d));
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);

    if !result.diagnostics.is_empty() {
        eprintln!();
    }

    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if result.has_errors() {
        std::process::exit(1);
    }

    Ok(())
}

fn render(d: &Diagnostic) -> String {
    let color = match d.severity {
        Severity::Error => RED,
        Severity::Warning => YELLOW,
    };
    if d.path.is_empty() {
        format!("{BOLD}{color}{}{RESET} {}", d.severity, d.message)
    } else {
        format!("{BOLD}{color}{}{RESET} {}: {}", d.severity, d.path, d.message)
    }
}

fn show(path: Option<&Path>) -> Result<()> {
    let cfg = match path {
        Some(path) => trinity_config::load_config(path)?,
        None => trinity_config::discover_and_load(),
    };
    println!("{}", serde_json::to_string_pretty(&redacted(&cfg)?)?);
    Ok(())
}

/// The config as JSON with the provider key masked.
fn redacted(cfg: &TrinityConfig) -> Result<serde_json::Value> {
    let mut value = serde_json::to_value(cfg)?;
    if let Some(key) = value.pointer_mut("/provider/api_key")
        && !key.is_null()
    {
        *key = serde_json::Value::String("[REDACTED]".into());
    }
    Ok(value)
}
