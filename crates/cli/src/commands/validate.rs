//! `validate` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;
use crate::error::load_config;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    topic_count: usize,
    keepalive_ms: Option<u64>,
    broadcast_on_timeout: bool,
    source_kind: String,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    match load_config(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", config.version),
                    topic_count: config.topics.len(),
                    keepalive_ms: config.dispatcher.keepalive_interval_ms,
                    broadcast_on_timeout: config.dispatcher.broadcast_on_timeout,
                    source_kind: format!("{:?}", config.source.kind),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &contracts::NotifyCondConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.topics.is_empty() {
        warnings.push("No topics configured - no consumer will ever wake up".to_string());
    }

    if config.dispatcher.broadcast_on_timeout && config.dispatcher.keepalive_interval_ms.is_none()
    {
        warnings.push(
            "dispatcher.broadcast_on_timeout has no effect without keepalive_interval_ms"
                .to_string(),
        );
    }

    if config.dispatcher.keepalive_interval_ms.is_none() {
        warnings.push("Keepalive disabled - a dead connection will go unnoticed".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Topics: {}", summary.topic_count);
            match summary.keepalive_ms {
                Some(ms) => println!("  Keepalive: {} ms", ms),
                None => println!("  Keepalive: disabled"),
            }
            println!("  Broadcast on timeout: {}", summary.broadcast_on_timeout);
            println!("  Source: {}", summary.source_kind);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
