// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration schema definitions for tagwatch.
//!
//! # Schema Structure
//!
//! ```text
//! TagwatchConfig
//! ├── opcua: ClientConfig
//! ├── tags: Vec<TagEntry>
//! └── logging: LoggingConfig
//! ```
//!
//! An absent or empty `tags` list selects the built-in machine tag list.

use serde::{Deserialize, Serialize};
use tagwatch_opcua::{ClientConfig, NodeId, TagDefinition, TagRegistry};

use crate::error::{ConfigError, ConfigResult};

// =============================================================================
// Constants
// =============================================================================

/// Endpoint used when no configuration file is present.
pub const DEFAULT_ENDPOINT: &str = "opc.tcp://localhost:4840";

// =============================================================================
// Top-Level Configuration
// =============================================================================

/// The root configuration structure for tagwatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TagwatchConfig {
    /// OPC UA client configuration.
    #[serde(default = "default_client")]
    pub opcua: ClientConfig,

    /// Tags to monitor.
    #[serde(default)]
    pub tags: Vec<TagEntry>,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_client() -> ClientConfig {
    ClientConfig::new(DEFAULT_ENDPOINT)
}

impl Default for TagwatchConfig {
    fn default() -> Self {
        Self {
            opcua: default_client(),
            tags: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }
}

impl TagwatchConfig {
    /// Validates the entire configuration.
    ///
    /// Checks the client settings and that the tag list resolves to a
    /// registry (non-empty, unique names).
    pub fn validate(&self) -> ConfigResult<()> {
        self.opcua.validate()?;
        self.registry()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Returns `true` if the built-in tag list is in use.
    pub fn uses_builtin_tags(&self) -> bool {
        self.tags.is_empty()
    }

    /// Resolves the tag list into a registry.
    pub fn registry(&self) -> ConfigResult<TagRegistry> {
        let namespace = self.opcua.namespace_index;
        if self.uses_builtin_tags() {
            return Ok(TagRegistry::builtin(namespace));
        }

        let definitions = self.tags.iter().cloned().map(TagDefinition::from);
        TagRegistry::new(namespace, definitions).map_err(ConfigError::from)
    }
}

// =============================================================================
// Tag Entries
// =============================================================================

/// A tag as written in the configuration file.
///
/// ```yaml
/// tags:
///   - ActLineSpeed
///   - name: T2m
///     node_id: "ns=2;s=Weather.T2m"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagEntry {
    /// A bare tag name addressed as `ns=<namespace>;s=<name>`.
    Name(String),

    /// A tag with an optional explicit node id.
    Detailed {
        /// Tag name.
        name: String,
        /// Explicit node id.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        node_id: Option<NodeId>,
    },
}

impl TagEntry {
    /// The tag name.
    pub fn name(&self) -> &str {
        match self {
            TagEntry::Name(name) => name,
            TagEntry::Detailed { name, .. } => name,
        }
    }
}

impl From<TagEntry> for TagDefinition {
    fn from(entry: TagEntry) -> Self {
        match entry {
            TagEntry::Name(name) => TagDefinition::named(name),
            TagEntry::Detailed { name, node_id } => TagDefinition { name, node_id },
        }
    }
}

// =============================================================================
// Logging Configuration
// =============================================================================

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Log format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include span targets in logs.
    #[serde(default = "default_enabled")]
    pub with_target: bool,

    /// Include thread IDs in logs.
    #[serde(default)]
    pub with_thread_ids: bool,
}

fn default_enabled() -> bool {
    true
}

impl LoggingConfig {
    /// Validates the logging configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            format: LogFormat::default(),
            with_target: true,
            with_thread_ids: false,
        }
    }
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// The filter directive for this level.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Parses a level name, accepting `warning` for `warn`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Compact single-line output.
    Compact,
    /// JSON for log aggregation.
    Json,
}

impl LogFormat {
    /// Parses a format name.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "text" | "pretty" => Some(LogFormat::Text),
            "compact" => Some(LogFormat::Compact),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tagwatch_opcua::BUILTIN_TAGS;

    #[test]
    fn test_default_config() {
        let config = TagwatchConfig::default();
        assert_eq!(config.opcua.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.opcua.namespace_index, 4);
        assert!(config.uses_builtin_tags());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builtin_tags_when_empty() {
        let registry = TagwatchConfig::default().registry().unwrap();
        assert_eq!(registry.len(), BUILTIN_TAGS.len());
        assert_eq!(
            registry.node_id("ActLineSpeed").unwrap().to_string(),
            "ns=4;s=ActLineSpeed"
        );
    }

    #[test]
    fn test_tag_entries() {
        let config = TagwatchConfig {
            tags: vec![
                TagEntry::Name("T2m".into()),
                TagEntry::Detailed {
                    name: "RH2m".into(),
                    node_id: Some("ns=2;i=1001".parse().unwrap()),
                },
            ],
            ..Default::default()
        };

        let registry = config.registry().unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.node_id("T2m").unwrap().to_string(), "ns=4;s=T2m");
        assert_eq!(registry.node_id("RH2m").unwrap().to_string(), "ns=2;i=1001");
    }

    #[test]
    fn test_duplicate_tags_rejected() {
        let config = TagwatchConfig {
            tags: vec![TagEntry::Name("T2m".into()), TagEntry::Name("T2m".into())],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::DuplicateTag { .. })));
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let mut config = TagwatchConfig::default();
        config.opcua.endpoint = "http://localhost:4840".into();
        assert!(matches!(config.validate(), Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_tag_entry_deserialize() {
        let entries: Vec<TagEntry> =
            serde_json::from_str(r#"["T2m", {"name": "RH2m", "node_id": "ns=2;s=RH"}]"#).unwrap();
        assert_eq!(entries[0].name(), "T2m");
        assert!(matches!(&entries[1], TagEntry::Detailed { node_id: Some(_), .. }));
    }

    #[test]
    fn test_log_parsing() {
        assert_eq!(LogLevel::parse("WARNING"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("nope"), None);
        assert_eq!(LogFormat::parse("json"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("xml"), None);
    }
}
