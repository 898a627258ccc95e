// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration loading and processing for tagwatch.
//!
//! # Loading Pipeline
//!
//! 1. Read the file and pick the format from its extension
//! 2. Resolve `${VAR}` / `${VAR:default}` placeholders
//! 3. Parse YAML, TOML or JSON into [`TagwatchConfig`]
//! 4. Apply environment variable overrides
//! 5. Validate
//!
//! # Environment Variable Override
//!
//! ```text
//! TAGWATCH_ENDPOINT=opc.tcp://172.30.10.2:4840
//! TAGWATCH_MAX_RETRIES=10
//! TAGWATCH_LOG_LEVEL=debug
//! TAGWATCH_LOG_FORMAT=json
//! ```

use std::env;
use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::schema::{LogFormat, LogLevel, TagwatchConfig};

/// Default environment variable prefix.
pub const DEFAULT_ENV_PREFIX: &str = "TAGWATCH";

// =============================================================================
// ConfigLoader
// =============================================================================

/// Configuration loader for tagwatch.
///
/// # Examples
///
/// ```no_run
/// use tagwatch_config::loader::ConfigLoader;
///
/// let loader = ConfigLoader::new();
/// let config = loader.load("tagwatch.yaml").unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Environment variable prefix.
    env_prefix: String,

    /// Whether to resolve environment variables in values.
    resolve_env_vars: bool,
}

impl ConfigLoader {
    /// Creates a new configuration loader with default settings.
    pub fn new() -> Self {
        Self {
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            resolve_env_vars: true,
        }
    }

    /// Creates a builder for configuring the loader.
    pub fn builder() -> ConfigLoaderBuilder {
        ConfigLoaderBuilder::new()
    }

    /// Sets the environment variable prefix.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Enables or disables placeholders and overrides.
    pub fn with_env_vars(mut self, enabled: bool) -> Self {
        self.resolve_env_vars = enabled;
        self
    }

    /// Loads configuration from a file.
    ///
    /// The file format is determined by the file extension:
    /// - `.yaml` or `.yml` - YAML format
    /// - `.toml` - TOML format
    /// - `.json` - JSON format
    pub fn load(&self, path: impl AsRef<Path>) -> ConfigResult<TagwatchConfig> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let format = ConfigFormat::from_path(path)?;
        let content = self.read_file(path)?;

        let content = if self.resolve_env_vars {
            self.resolve_env_placeholders(&content)
        } else {
            content
        };

        let mut config: TagwatchConfig = parse_str(&content, format).map_err(|e| match e {
            ConfigError::Serialization { message } => ConfigError::parse(path, message),
            other => other,
        })?;

        self.finish(&mut config)?;

        info!(
            endpoint = %config.opcua.endpoint,
            builtin_tags = config.uses_builtin_tags(),
            "Configuration loaded successfully"
        );
        debug!(tags = config.tags.len(), "Configured tag entries");

        Ok(config)
    }

    /// Loads configuration from a string.
    pub fn load_from_str(&self, content: &str, format: ConfigFormat) -> ConfigResult<TagwatchConfig> {
        let content = if self.resolve_env_vars {
            self.resolve_env_placeholders(content)
        } else {
            content.to_string()
        };

        let mut config = parse_str(&content, format)?;
        self.finish(&mut config)?;
        Ok(config)
    }

    /// Loads `path` if it exists, otherwise returns the defaults.
    ///
    /// Overrides still apply to the defaults.
    pub fn load_or_default(&self, path: impl AsRef<Path>) -> ConfigResult<TagwatchConfig> {
        let path = path.as_ref();
        if path.exists() {
            return self.load(path);
        }

        warn!(path = %path.display(), "Configuration file not found, using defaults");
        let mut config = TagwatchConfig::default();
        self.finish(&mut config)?;
        Ok(config)
    }

    fn finish(&self, config: &mut TagwatchConfig) -> ConfigResult<()> {
        if self.resolve_env_vars {
            self.apply_env_overrides(config)?;
        }
        config.validate()
    }

    fn read_file(&self, path: &Path) -> ConfigResult<String> {
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))
    }

    /// Resolves environment variable placeholders in content.
    ///
    /// Supports the format: `${VAR_NAME}` or `${VAR_NAME:default}`
    fn resolve_env_placeholders(&self, content: &str) -> String {
        let mut result = String::with_capacity(content.len());
        let mut chars = content.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '$' || chars.peek() != Some(&'{') {
                result.push(c);
                continue;
            }
            chars.next();

            let mut var_content = String::new();
            let mut found_close = false;
            for c in chars.by_ref() {
                if c == '}' {
                    found_close = true;
                    break;
                }
                var_content.push(c);
            }

            if !found_close {
                result.push_str("${");
                result.push_str(&var_content);
                continue;
            }

            let (var_name, default_value) = match var_content.split_once(':') {
                Some((name, default)) => (name, Some(default)),
                None => (var_content.as_str(), None),
            };

            match (env::var(var_name), default_value) {
                (Ok(value), _) => result.push_str(&value),
                (Err(_), Some(default)) => result.push_str(default),
                (Err(_), None) => {
                    warn!(variable = var_name, "Environment variable not found");
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        }

        result
    }

    fn env_var(&self, suffix: &str) -> (String, Option<String>) {
        let name = format!("{}_{}", self.env_prefix, suffix);
        let value = env::var(&name).ok();
        (name, value)
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&self, config: &mut TagwatchConfig) -> ConfigResult<()> {
        if let (_, Some(value)) = self.env_var("ENDPOINT") {
            debug!(endpoint = %value, "Endpoint overridden from environment");
            config.opcua.endpoint = value;
        }

        if let (name, Some(value)) = self.env_var("MAX_RETRIES") {
            config.opcua.connection.max_retries = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid_env_var(name, "expected a non-negative integer"))?;
        }

        if let (name, Some(value)) = self.env_var("LOG_LEVEL") {
            config.logging.level = LogLevel::parse(&value)
                .ok_or_else(|| ConfigError::invalid_env_var(name, "expected trace|debug|info|warn|error"))?;
        }

        if let (name, Some(value)) = self.env_var("LOG_FORMAT") {
            config.logging.format = LogFormat::parse(&value)
                .ok_or_else(|| ConfigError::invalid_env_var(name, "expected text|compact|json"))?;
        }

        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// ConfigLoaderBuilder
// =============================================================================

/// Builder for ConfigLoader.
#[derive(Debug, Default)]
pub struct ConfigLoaderBuilder {
    env_prefix: Option<String>,
    resolve_env_vars: Option<bool>,
}

impl ConfigLoaderBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the environment prefix.
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Enables or disables environment variable resolution.
    pub fn resolve_env_vars(mut self, enabled: bool) -> Self {
        self.resolve_env_vars = Some(enabled);
        self
    }

    /// Builds the ConfigLoader.
    pub fn build(self) -> ConfigLoader {
        let mut loader = ConfigLoader::new();

        if let Some(prefix) = self.env_prefix {
            loader.env_prefix = prefix;
        }
        if let Some(resolve_env_vars) = self.resolve_env_vars {
            loader.resolve_env_vars = resolve_env_vars;
        }

        loader
    }
}

// =============================================================================
// ConfigFormat
// =============================================================================

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format.
    Yaml,
    /// TOML format.
    Toml,
    /// JSON format.
    Json,
}

impl ConfigFormat {
    /// Determines the format from a file path.
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match ext.as_deref() {
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("json") => Ok(ConfigFormat::Json),
            Some(other) => Err(ConfigError::unsupported_format(other)),
            None => Err(ConfigError::unsupported_format("(no extension)")),
        }
    }

    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Yaml => "yaml",
            ConfigFormat::Toml => "toml",
            ConfigFormat::Json => "json",
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn parse_str<T: DeserializeOwned>(content: &str, format: ConfigFormat) -> ConfigResult<T> {
    match format {
        ConfigFormat::Yaml => yaml_parse(content),
        ConfigFormat::Toml => {
            toml::from_str(content).map_err(|e| ConfigError::serialization(e.to_string()))
        }
        ConfigFormat::Json => {
            serde_json::from_str(content).map_err(|e| ConfigError::serialization(e.to_string()))
        }
    }
}

/// YAML parsing through the config crate.
fn yaml_parse<T: DeserializeOwned>(content: &str) -> ConfigResult<T> {
    let config = config::Config::builder()
        .add_source(config::File::from_str(content, config::FileFormat::Yaml))
        .build()
        .map_err(|e| ConfigError::serialization(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| ConfigError::serialization(e.to_string()))
}

// =============================================================================
// Convenience Functions
// =============================================================================

/// Loads configuration from a file with default settings.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<TagwatchConfig> {
    ConfigLoader::new().load(path)
}

/// Loads configuration from a string with the specified format.
pub fn load_config_str(content: &str, format: ConfigFormat) -> ConfigResult<TagwatchConfig> {
    ConfigLoader::new().load_from_str(content, format)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    const YAML: &str = r#"
opcua:
  endpoint: opc.tcp://172.30.10.2:4840
  namespace_index: 4
  connection:
    initial_delay: 2s
    max_retries: 3
  subscription:
    publishing_interval: 5s

tags:
  - ActLineSpeed
  - name: T2m
    node_id: "ns=2;s=Weather.T2m"

logging:
  level: debug
  format: json
"#;

    fn write_temp(suffix: &str, content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::with_suffix(suffix).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    /// A loader whose overrides cannot collide with the real environment.
    fn isolated(prefix: &str) -> ConfigLoader {
        ConfigLoader::builder().env_prefix(prefix).build()
    }

    #[test]
    fn test_load_yaml() {
        let file = write_temp(".yaml", YAML);
        let config = isolated("TW_TEST_YAML").load(file.path()).unwrap();

        assert_eq!(config.opcua.endpoint, "opc.tcp://172.30.10.2:4840");
        assert_eq!(config.opcua.connection.initial_delay, Duration::from_secs(2));
        assert_eq!(config.opcua.connection.max_retries, 3);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Json);

        let registry = config.registry().unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.node_id("T2m").unwrap().to_string(), "ns=2;s=Weather.T2m");
    }

    #[test]
    fn test_load_toml() {
        let toml = r#"
tags = ["T2m", "RH2m"]

[opcua]
endpoint = "opc.tcp://plc:4840"

[opcua.monitoring]
sampling_interval = "250ms"
"#;
        let file = write_temp(".toml", toml);
        let config = isolated("TW_TEST_TOML").load(file.path()).unwrap();

        assert_eq!(config.opcua.endpoint, "opc.tcp://plc:4840");
        assert_eq!(config.opcua.monitoring.sampling_interval, Duration::from_millis(250));
        assert_eq!(config.tags.len(), 2);
    }

    #[test]
    fn test_load_json_without_tags_uses_builtin() {
        let file = write_temp(".json", r#"{"opcua": {"endpoint": "opc.tcp://plc:4840"}}"#);
        let config = isolated("TW_TEST_JSON").load(file.path()).unwrap();
        assert!(config.uses_builtin_tags());
        assert_eq!(
            config.registry().unwrap().len(),
            tagwatch_opcua::BUILTIN_TAGS.len()
        );
    }

    #[test]
    fn test_config_format_from_path() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("tagwatch.yaml")).unwrap(),
            ConfigFormat::Yaml
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("tagwatch.yml")).unwrap(),
            ConfigFormat::Yaml
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("tagwatch.toml")).unwrap(),
            ConfigFormat::Toml
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("tagwatch.json")).unwrap(),
            ConfigFormat::Json
        );
        assert!(ConfigFormat::from_path(Path::new("tagwatch.ini")).is_err());
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let file = write_temp(".ini", "endpoint=opc.tcp://x");
        let err = ConfigLoader::new().load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_env_placeholder_with_default() {
        let loader = ConfigLoader::new();
        let result = loader.resolve_env_placeholders("endpoint: ${TAGWATCH_TEST_UNSET_VAR:opc.tcp://fallback:4840}");
        assert_eq!(result, "endpoint: opc.tcp://fallback:4840");
    }

    #[test]
    fn test_env_placeholder_unset_kept() {
        let loader = ConfigLoader::new();
        let result = loader.resolve_env_placeholders("value: ${TAGWATCH_TEST_UNSET_VAR}");
        assert_eq!(result, "value: ${TAGWATCH_TEST_UNSET_VAR}");

        let result = loader.resolve_env_placeholders("value: ${unterminated");
        assert_eq!(result, "value: ${unterminated");
    }

    #[test]
    fn test_env_placeholder_resolved() {
        env::set_var("TAGWATCH_TEST_PLACEHOLDER_HOST", "plc-7");
        let loader = ConfigLoader::new();
        let result = loader.resolve_env_placeholders("opc.tcp://${TAGWATCH_TEST_PLACEHOLDER_HOST:x}:4840");
        assert_eq!(result, "opc.tcp://plc-7:4840");
    }

    #[test]
    fn test_env_overrides() {
        env::set_var("TW_TEST_OVR_ENDPOINT", "opc.tcp://override:4840");
        env::set_var("TW_TEST_OVR_MAX_RETRIES", "9");
        env::set_var("TW_TEST_OVR_LOG_LEVEL", "warn");
        env::set_var("TW_TEST_OVR_LOG_FORMAT", "compact");

        let config = isolated("TW_TEST_OVR")
            .load_from_str(YAML, ConfigFormat::Yaml)
            .unwrap();

        assert_eq!(config.opcua.endpoint, "opc.tcp://override:4840");
        assert_eq!(config.opcua.connection.max_retries, 9);
        assert_eq!(config.logging.level, LogLevel::Warn);
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn test_invalid_env_override() {
        env::set_var("TW_TEST_BAD_MAX_RETRIES", "many");
        let err = isolated("TW_TEST_BAD")
            .load_from_str(YAML, ConfigFormat::Yaml)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar { .. }));
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let yaml = "opcua:\n  endpoint: http://plc:4840\n";
        let err = isolated("TW_TEST_EP")
            .load_from_str(yaml, ConfigFormat::Yaml)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn test_unknown_field_is_parse_error() {
        let file = write_temp(".yaml", "opcua:\n  endpoint: opc.tcp://plc:4840\nbogus: 1\n");
        let err = isolated("TW_TEST_UNK").load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_load_or_default() {
        let config = isolated("TW_TEST_DEF")
            .load_or_default("/nonexistent/path/tagwatch.yaml")
            .unwrap();
        assert_eq!(config, TagwatchConfig::default());
    }

    #[test]
    fn test_loader_builder() {
        let loader = ConfigLoader::builder()
            .env_prefix("MYAPP")
            .resolve_env_vars(false)
            .build();

        assert_eq!(loader.env_prefix, "MYAPP");
        assert!(!loader.resolve_env_vars);
    }

    #[test]
    fn test_file_not_found() {
        let result = ConfigLoader::new().load("/nonexistent/path/tagwatch.yaml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }
}
