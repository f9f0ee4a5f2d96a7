//! Config command - View and manage fitsync configuration
//!
//! Provides the `fitsync config` CLI command which:
//! 1. Shows the current configuration (YAML or JSON, secrets masked)
//! 2. Sets individual configuration values via dot-notation keys
//! 3. Validates the configuration file and reports errors

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use fitsync_core::config::Config;
use tracing::info;

use crate::output::{get_formatter, OutputFormat};

const MASK: &str = "********";

const SUPPORTED_KEYS: &[(&str, &str)] = &[
    ("store.database_path", "SQLite database file"),
    ("store.atomic_enqueue", "true|false, write record and queue entry together"),
    ("remote.base_url", "Remote REST endpoint"),
    ("remote.api_key", "API key (\"none\" to clear)"),
    ("remote.access_token", "Bearer token (\"none\" to clear)"),
    ("connectivity.probe_url", "Reachability probe URL"),
    ("connectivity.probe_timeout_secs", "Probe timeout, 1-9 seconds"),
    ("sync.periodic_interval_secs", "Seconds between periodic drains"),
    ("sync.debounce_secs", "Trigger cooldown, 1-9 seconds"),
    ("sync.max_retries", "Retry ceiling (\"none\" for unlimited)"),
    ("auth.trainer_id", "Tenant id (\"none\" to clear)"),
    ("logging.level", "trace|debug|info|warn|error"),
    ("logging.json", "true|false"),
];

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "sync.debounce_secs")
        key: String,
        /// New value
        value: String,
    },
    /// Validate configuration file
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        match self {
            ConfigCommand::Show => execute_show(format, config_path),
            ConfigCommand::Set { key, value } => execute_set(key, value, format, config_path),
            ConfigCommand::Validate => execute_validate(format, config_path),
        }
    }
}

fn masked(config: &Config) -> Config {
    let mut config = config.clone();
    if config.remote.api_key.is_some() {
        config.remote.api_key = Some(MASK.to_string());
    }
    if config.remote.access_token.is_some() {
        config.remote.access_token = Some(MASK.to_string());
    }
    config
}

fn execute_show(format: OutputFormat, config_path: &Path) -> Result<()> {
    let formatter = get_formatter(format);
    let config = masked(&Config::load_or_default(config_path));

    info!(config_path = %config_path.display(), "Showing configuration");

    if format.is_json() {
        let json =
            serde_json::to_value(&config).context("Failed to serialize configuration to JSON")?;
        formatter.print_json(&json);
    } else {
        formatter.success(&format!("Configuration ({})", config_path.display()));
        formatter.info("");
        let yaml =
            serde_yaml::to_string(&config).context("Failed to serialize configuration to YAML")?;
        for line in yaml.lines() {
            formatter.info(line);
        }
    }
    Ok(())
}

fn execute_set(key: &str, value: &str, format: OutputFormat, config_path: &Path) -> Result<()> {
    let formatter = get_formatter(format);
    let mut config = Config::load_or_default(config_path);

    info!(key = %key, "Setting configuration value");

    if let Err(e) = apply_config_value(&mut config, key, value) {
        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": false,
                "key": key,
                "error": e.to_string(),
            }));
        } else {
            formatter.error(&format!("Failed to set '{key}': {e}"));
            formatter.info("");
            formatter.info("Supported keys:");
            for (name, help) in SUPPORTED_KEYS {
                formatter.info(&format!("  {name:<34} - {help}"));
            }
        }
        return Ok(());
    }

    let errors: Vec<String> = config.validate().iter().map(|e| e.to_string()).collect();
    if !errors.is_empty() {
        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": false,
                "key": key,
                "errors": errors,
            }));
        } else {
            formatter.error(&format!("Invalid value for '{key}': {}", errors.join("; ")));
        }
        return Ok(());
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create configuration directory")?;
    }
    let yaml = serde_yaml::to_string(&config).context("Failed to serialize configuration")?;
    std::fs::write(config_path, yaml).context("Failed to write configuration file")?;

    if format.is_json() {
        formatter.print_json(&serde_json::json!({
            "success": true,
            "key": key,
            "config_path": config_path.display().to_string(),
        }));
    } else {
        formatter.success(&format!("Set {key}"));
        formatter.info(&format!("Saved to {}", config_path.display()));
    }
    Ok(())
}

fn execute_validate(format: OutputFormat, config_path: &Path) -> Result<()> {
    let formatter = get_formatter(format);

    if !config_path.exists() {
        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "valid": true,
                "config_path": config_path.display().to_string(),
                "errors": [],
                "defaults": true,
            }));
        } else {
            formatter.info(&format!(
                "Configuration file not found at {}",
                config_path.display()
            ));
            formatter.info("Using default configuration. Run 'fitsync config set <key> <value>' to create one.");
        }
        return Ok(());
    }

    let config = match Config::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            if format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "valid": false,
                    "config_path": config_path.display().to_string(),
                    "errors": [format!("Failed to parse configuration: {e}")],
                }));
            } else {
                formatter.error(&format!("Failed to parse configuration: {e}"));
                formatter.info(&format!("File: {}", config_path.display()));
            }
            return Ok(());
        }
    };

    info!(config_path = %config_path.display(), "Validating configuration");
    let errors = config.validate();

    if format.is_json() {
        let error_strings: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        formatter.print_json(&serde_json::json!({
            "valid": errors.is_empty(),
            "config_path": config_path.display().to_string(),
            "errors": error_strings,
        }));
    } else if errors.is_empty() {
        formatter.success("Configuration is valid");
        formatter.info(&format!("File: {}", config_path.display()));
    } else {
        formatter.error(&format!(
            "Configuration has {} error{}:",
            errors.len(),
            if errors.len() == 1 { "" } else { "s" }
        ));
        formatter.info(&format!("File: {}", config_path.display()));
        formatter.info("");
        for error in &errors {
            formatter.info(&format!("  {} - {}", error.field, error.message));
        }
    }
    Ok(())
}

fn optional(value: &str) -> Option<String> {
    if value.is_empty() || value == "none" {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    value
        .parse::<bool>()
        .with_context(|| format!("Expected true or false for {key}"))
}

fn parse_secs(key: &str, value: &str) -> Result<u64> {
    value
        .parse::<u64>()
        .with_context(|| format!("Expected a positive integer for {key}"))
}

/// Apply a dot-notation key/value pair to a Config struct
fn apply_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        // --- store ---
        "store.database_path" => config.store.database_path = PathBuf::from(value),
        "store.atomic_enqueue" => config.store.atomic_enqueue = parse_bool(key, value)?,

        // --- remote ---
        "remote.base_url" => config.remote.base_url = value.to_string(),
        "remote.api_key" => config.remote.api_key = optional(value),
        "remote.access_token" => config.remote.access_token = optional(value),

        // --- connectivity ---
        "connectivity.probe_url" => config.connectivity.probe_url = value.to_string(),
        "connectivity.probe_timeout_secs" => {
            config.connectivity.probe_timeout_secs = parse_secs(key, value)?;
        }

        // --- sync ---
        "sync.periodic_interval_secs" => {
            config.sync.periodic_interval_secs = parse_secs(key, value)?;
        }
        "sync.debounce_secs" => config.sync.debounce_secs = parse_secs(key, value)?,
        "sync.max_retries" => {
            config.sync.max_retries = match optional(value) {
                None => None,
                Some(v) => Some(
                    v.parse::<u32>()
                        .context("Expected a positive integer or \"none\" for sync.max_retries")?,
                ),
            };
        }

        // --- auth ---
        "auth.trainer_id" => config.auth.trainer_id = optional(value),

        // --- logging ---
        "logging.level" => config.logging.level = value.to_string(),
        "logging.json" => config.logging.json = parse_bool(key, value)?,

        _ => anyhow::bail!("Unknown configuration key: '{key}'"),
    }
    Ok(())
}
