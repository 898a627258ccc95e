// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `validate` command.

use tagwatch_config::TagwatchConfig;

use crate::cli::{Cli, OutputFormat, ValidateArgs};
use crate::error::{BinError, BinResult};

/// Executes the `validate` command to validate configuration.
pub fn validate(cli: &Cli, args: ValidateArgs) -> BinResult<()> {
    let config_path = &cli.config;

    if !config_path.exists() {
        return Err(BinError::Configuration(format!(
            "Configuration file not found: {}",
            config_path.display()
        )));
    }

    let config =
        tagwatch_config::load_config(config_path).map_err(|e| BinError::load(config_path, e))?;
    let registry = config.registry()?;
    let warnings = collect_warnings(&config);
    let opcua = &config.opcua;

    match args.format {
        OutputFormat::Text => {
            println!("✓ Configuration is valid: {}", config_path.display());
            println!();
            println!("Summary:");
            println!("  Endpoint:            {}", opcua.endpoint);
            println!(
                "  Security:            {} / {}",
                opcua.security_mode.name(),
                opcua.security_policy.name()
            );
            println!("  Namespace:           {}", opcua.namespace_index);
            println!(
                "  Tags:                {}{}",
                registry.len(),
                if config.uses_builtin_tags() { " (built-in)" } else { "" }
            );
            println!(
                "  Publishing interval: {}",
                humantime::format_duration(opcua.subscription.publishing_interval)
            );
            println!(
                "  Sampling interval:   {}",
                humantime::format_duration(opcua.monitoring.sampling_interval)
            );
            println!("  Retry budget:        {}", retry_budget(&config));

            if !warnings.is_empty() {
                println!();
                println!("Warnings:");
                for warning in &warnings {
                    println!("  ⚠ {}", warning);
                }
            }

            if args.show_config {
                println!();
                println!("Parsed configuration:");
                println!("{}", to_json(&config)?);
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "valid": true,
                "config_path": config_path.display().to_string(),
                "summary": {
                    "endpoint": opcua.endpoint,
                    "security_mode": opcua.security_mode.name(),
                    "security_policy": opcua.security_policy.name(),
                    "namespace_index": opcua.namespace_index,
                    "tag_count": registry.len(),
                    "builtin_tags": config.uses_builtin_tags(),
                    "retry_budget": retry_budget(&config),
                },
                "warnings": warnings,
                "config": if args.show_config { Some(&config) } else { None },
            });
            println!("{}", to_json(&output)?);
        }
    }

    Ok(())
}

fn retry_budget(config: &TagwatchConfig) -> String {
    let retry = &config.opcua.connection;
    match retry.max_attempts() {
        Some(attempts) => format!("{} attempts ({:?} backoff)", attempts, retry.strategy),
        None => format!("unbounded ({:?} backoff)", retry.strategy),
    }
}

fn collect_warnings(config: &TagwatchConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.uses_builtin_tags() {
        warnings.push("No tags configured, monitoring the built-in tag list".to_string());
    }
    if config.opcua.connection.retry_indefinitely {
        warnings.push("Connection retries are unbounded, an unreachable server never stops the monitor".to_string());
    }
    if config.opcua.security_mode == tagwatch_opcua::SecurityMode::None {
        warnings.push("Security mode is None, traffic is unencrypted".to_string());
    }

    warnings
}

fn to_json<T: serde::Serialize>(value: &T) -> BinResult<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warnings_for_defaults() {
        let warnings = collect_warnings(&TagwatchConfig::default());
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("built-in"));
    }

    #[test]
    fn test_retry_budget() {
        let mut config = TagwatchConfig::default();
        config.opcua.connection.max_retries = 2;
        assert!(retry_budget(&config).starts_with("3 attempts"));

        config.opcua.connection.retry_indefinitely = true;
        assert!(retry_budget(&config).starts_with("unbounded"));
    }
}
