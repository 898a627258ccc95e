// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI argument parsing and command definitions.
//!
//! - `run`: Monitor the configured tags (default)
//! - `validate`: Validate configuration file
//! - `tags`: List the resolved tag to node id mapping
//! - `version`: Show version information

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

const DEFAULT_SIM_INTERVAL: Duration = Duration::from_secs(1);

// =============================================================================
// Main CLI Structure
// =============================================================================

/// tagwatch - OPC UA tag change monitor
///
/// Connects to an OPC UA server, subscribes to a fixed list of tags and
/// reports every value change. Connection loss is recovered automatically.
#[derive(Parser, Debug)]
#[command(
    name = "tagwatch",
    author = "Sylvex <contact@sylvex.io>",
    version = tagwatch_opcua::VERSION,
    about = "OPC UA tag change monitor",
    long_about = None,
    propagate_version = true
)]
pub struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "tagwatch.yaml",
        env = "TAGWATCH_CONFIG",
        global = true
    )]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error); defaults to the configured level
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Log format; defaults to the configured format
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    /// Enable quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

// =============================================================================
// Subcommands
// =============================================================================

/// Available subcommands for the tagwatch CLI.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Monitor the configured tags
    ///
    /// This is the default command when no subcommand is specified.
    /// Runs until interrupted or until the server is unreachable.
    Run(RunArgs),

    /// Validate the configuration file
    ///
    /// Parses and validates the configuration file without connecting.
    Validate(ValidateArgs),

    /// List the tags that would be monitored
    Tags(TagsArgs),

    /// Show detailed version information
    Version,
}

// =============================================================================
// Command Arguments
// =============================================================================

/// Arguments for the `run` command.
#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Use an in-memory server that publishes synthetic values
    #[arg(long)]
    pub simulate: bool,

    /// Override the configured endpoint
    #[arg(short, long)]
    pub endpoint: Option<String>,

    /// Interval between synthetic values in simulation mode [default: 1s]
    #[arg(long, value_parser = humantime::parse_duration)]
    pub sim_interval: Option<Duration>,
}

impl RunArgs {
    /// Interval between synthetic values.
    pub fn sim_interval(&self) -> Duration {
        self.sim_interval.unwrap_or(DEFAULT_SIM_INTERVAL)
    }
}

/// Arguments for the `validate` command.
#[derive(Args, Debug, Clone, Default)]
pub struct ValidateArgs {
    /// Show parsed configuration after validation
    #[arg(short, long)]
    pub show_config: bool,

    /// Output format for validation results
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

/// Arguments for the `tags` command.
#[derive(Args, Debug, Clone, Default)]
pub struct TagsArgs {
    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

// =============================================================================
// Enums
// =============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for structured logging
    Json,
    /// Compact format for minimal output
    Compact,
}

impl From<tagwatch_config::LogFormat> for LogFormat {
    fn from(format: tagwatch_config::LogFormat) -> Self {
        match format {
            tagwatch_config::LogFormat::Text => LogFormat::Text,
            tagwatch_config::LogFormat::Json => LogFormat::Json,
            tagwatch_config::LogFormat::Compact => LogFormat::Compact,
        }
    }
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for programmatic parsing
    Json,
}

// =============================================================================
// Helper Methods
// =============================================================================

impl Cli {
    /// Parse CLI arguments from the command line.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the effective command, defaulting to `Run` if none specified.
    pub fn effective_command(&self) -> Commands {
        self.command
            .clone()
            .unwrap_or_else(|| Commands::Run(RunArgs::default()))
    }

    /// Check if verbose logging is enabled.
    pub fn is_verbose(&self) -> bool {
        self.verbose && !self.quiet
    }

    /// Get the effective log level based on flags, falling back to `configured`.
    pub fn effective_log_level<'a>(&'a self, configured: &'a str) -> &'a str {
        if self.quiet {
            "warn"
        } else if self.verbose {
            "debug"
        } else {
            self.log_level.as_deref().unwrap_or(configured)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command() {
        let cli = Cli::parse_from(["tagwatch"]);
        assert!(cli.command.is_none());
        assert!(matches!(cli.effective_command(), Commands::Run(_)));
    }

    #[test]
    fn test_run_command() {
        let cli = Cli::parse_from(["tagwatch", "run", "--simulate"]);
        match cli.command {
            Some(Commands::Run(args)) => {
                assert!(args.simulate);
                assert_eq!(args.sim_interval(), Duration::from_secs(1));
            }
            other => panic!("Expected Run command, got {other:?}"),
        }
    }

    #[test]
    fn test_run_endpoint_override() {
        let cli = Cli::parse_from(["tagwatch", "run", "-e", "opc.tcp://plc:4840"]);
        match cli.command {
            Some(Commands::Run(args)) => {
                assert_eq!(args.endpoint.as_deref(), Some("opc.tcp://plc:4840"));
                assert!(!args.simulate);
            }
            other => panic!("Expected Run command, got {other:?}"),
        }
    }

    #[test]
    fn test_sim_interval() {
        let cli = Cli::parse_from(["tagwatch", "run", "--simulate", "--sim-interval", "250ms"]);
        match cli.command {
            Some(Commands::Run(args)) => {
                assert_eq!(args.sim_interval(), Duration::from_millis(250))
            }
            other => panic!("Expected Run command, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_command() {
        let cli = Cli::parse_from(["tagwatch", "validate", "--show-config", "-f", "json"]);
        match cli.command {
            Some(Commands::Validate(args)) => {
                assert!(args.show_config);
                assert_eq!(args.format, OutputFormat::Json);
            }
            other => panic!("Expected Validate command, got {other:?}"),
        }
    }

    #[test]
    fn test_tags_command() {
        let cli = Cli::parse_from(["tagwatch", "tags"]);
        assert!(matches!(cli.command, Some(Commands::Tags(_))));
    }

    #[test]
    fn test_config_path() {
        let cli = Cli::parse_from(["tagwatch", "-c", "/etc/tagwatch/plant.yaml"]);
        assert_eq!(cli.config, PathBuf::from("/etc/tagwatch/plant.yaml"));
    }

    #[test]
    fn test_log_level() {
        let cli = Cli::parse_from(["tagwatch", "-l", "debug"]);
        assert_eq!(cli.effective_log_level("info"), "debug");

        let cli = Cli::parse_from(["tagwatch"]);
        assert_eq!(cli.effective_log_level("error"), "error");
    }

    #[test]
    fn test_quiet_mode() {
        let cli = Cli::parse_from(["tagwatch", "-q"]);
        assert!(cli.quiet);
        assert_eq!(cli.effective_log_level("info"), "warn");
    }

    #[test]
    fn test_verbose_mode() {
        let cli = Cli::parse_from(["tagwatch", "-v"]);
        assert!(cli.is_verbose());
        assert_eq!(cli.effective_log_level("info"), "debug");
    }
}
