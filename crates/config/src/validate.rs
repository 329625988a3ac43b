//! Configuration validation.
//!
//! Flags unknown or misspelled keys in the raw document and values the
//! runtime cannot work with.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use crate::{
    loader::{load_config, load_config_value},
    schema::{AGENT_NAMES, TrinityConfig},
};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// "syntax", "unknown-field", "unknown-agent", "value", "file-ref"
    pub category: &'static str,
    /// Dotted path, e.g. "scheduler.idle_interval_secs"
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn error(category: &'static str, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            category,
            path: path.into(),
            message: message.into(),
        }
    }

    fn warning(
        category: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity: Severity::Warning,
            category,
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result of validating a configuration file.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

const IDENTITY_KEYS: &[&str] = &["name"];
const PROVIDER_KEYS: &[&str] = &["base_url", "model", "api_key", "api_key_env", "temperature"];
const SCHEDULER_KEYS: &[&str] = &["idle_interval_secs", "policy"];
const MEMORY_KEYS: &[&str] = &["backend", "db_path", "history_limit", "recall_limit"];
const CHANNELS_KEYS: &[&str] = &["placeholder", "trace"];
const METRICS_KEYS: &[&str] = &["enabled", "prometheus"];

fn known_sections() -> HashMap<&'static str, &'static [&'static str]> {
    HashMap::from([
        ("identity", IDENTITY_KEYS),
        ("provider", PROVIDER_KEYS),
        ("scheduler", SCHEDULER_KEYS),
        ("memory", MEMORY_KEYS),
        ("channels", CHANNELS_KEYS),
        ("metrics", METRICS_KEYS),
        ("agents", AGENT_NAMES),
    ])
}

const AGENT_KEYS: &[&str] = &["model", "prompt_path", "temperature"];

/// Validate a config file on disk: unknown keys, then semantic checks.
pub fn validate(path: &Path) -> ValidationResult {
    let mut diagnostics = Vec::new();

    match load_config_value(path) {
        Ok(value) => diagnostics.extend(unknown_keys(&value)),
        Err(e) => diagnostics.push(Diagnostic::error("syntax", "", e.to_string())),
    }

    if !diagnostics.iter().any(|d| d.category == "syntax") {
        match load_config(path) {
            Ok(cfg) => diagnostics.extend(check(&cfg)),
            Err(e) => diagnostics.push(Diagnostic::error("syntax", "", e.to_string())),
        }
    }

    ValidationResult {
        diagnostics,
        config_path: Some(path.to_path_buf()),
    }
}

fn unknown_keys(value: &serde_json::Value) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    let Some(root) = value.as_object() else {
        return out;
    };
    let sections = known_sections();

    for (section, body) in root {
        let Some(fields) = sections.get(section.as_str()) else {
            out.push(Diagnostic::warning(
                "unknown-field",
                section.clone(),
                format!("unknown section `{section}`"),
            ));
            continue;
        };
        let Some(body) = body.as_object() else {
            continue;
        };
        if section == "agents" {
            for (agent, entry) in body {
                if !AGENT_NAMES.contains(&agent.as_str()) {
                    out.push(Diagnostic::warning(
                        "unknown-agent",
                        format!("agents.{agent}"),
                        format!("no pipeline agent named `{agent}`"),
                    ));
                }
                for key in entry.as_object().into_iter().flat_map(|o| o.keys()) {
                    if !AGENT_KEYS.contains(&key.as_str()) {
                        out.push(Diagnostic::warning(
                            "unknown-field",
                            format!("agents.{agent}.{key}"),
                            format!("unknown key `{key}`"),
                        ));
                    }
                }
            }
            continue;
        }
        for key in body.keys() {
            if !fields.contains(&key.as_str()) {
                out.push(Diagnostic::warning(
                    "unknown-field",
                    format!("{section}.{key}"),
                    format!("unknown key `{key}`"),
                ));
            }
        }
    }
    out
}

/// Semantic checks on an already-parsed config.
pub fn check(cfg: &TrinityConfig) -> Vec<Diagnostic> {
    let mut out = Vec::new();

    if cfg.scheduler.idle_interval_secs == 0 {
        out.push(Diagnostic::error(
            "value",
            "scheduler.idle_interval_secs",
            "idle interval must be at least one second",
        ));
    }
    if cfg.memory.history_limit == 0 {
        out.push(Diagnostic::warning(
            "value",
            "memory.history_limit",
            "history limit of 0 sends no history to any agent",
        ));
    }
    if cfg.identity.name.trim().is_empty() {
        out.push(Diagnostic::error(
            "value",
            "identity.name",
            "bot name must not be empty",
        ));
    }
    if cfg.channels.placeholder.is_empty() {
        out.push(Diagnostic::warning(
            "value",
            "channels.placeholder",
            "empty placeholder: most platforms reject empty messages",
        ));
    }
    if cfg.provider.resolve_api_key().is_none() {
        out.push(Diagnostic::warning(
            "value",
            "provider.api_key",
            format!(
                "no API key configured and `{}` is unset",
                cfg.provider.api_key_env
            ),
        ));
    }

    let temps = std::iter::once(("provider.temperature".to_string(), cfg.provider.temperature))
        .chain(
            cfg.agents
                .iter()
                .map(|(name, a)| (format!("agents.{name}.temperature"), a.temperature)),
        );
    for (path, temp) in temps {
        if let Some(t) = temp
            && !(0.0..=2.0).contains(&t)
        {
            out.push(Diagnostic::error(
                "value",
                path,
                format!("temperature {t} outside 0.0..=2.0"),
            ));
        }
    }

    for (name, agent) in &cfg.agents {
        if let Some(prompt) = &agent.prompt_path
            && !prompt.exists()
        {
            out.push(Diagnostic::error(
                "file-ref",
                format!("agents.{name}.prompt_path"),
                format!("prompt file {} does not exist", prompt.display()),
            ));
        }
    }

    out
}
