// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration error types for tagwatch-config.

use std::path::PathBuf;

use tagwatch_opcua::{ConfigurationError, OpcUaError};
use thiserror::Error;

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to parse configuration file.
    #[error("Failed to parse config file '{path}': {message}")]
    Parse {
        /// Path to the configuration file.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Validation failed for '{field}': {message}")]
    Validation {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// File I/O error.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        /// Path to the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Duplicate tag name.
    #[error("Duplicate tag: {tag}")]
    DuplicateTag {
        /// The duplicated tag.
        tag: String,
    },

    /// Invalid node id.
    #[error("Invalid node id '{value}': {message}")]
    InvalidNodeId {
        /// The raw node id.
        value: String,
        /// Error message.
        message: String,
    },

    /// Invalid environment variable value.
    #[error("Invalid environment variable value for '{name}': {message}")]
    InvalidEnvVar {
        /// The environment variable name.
        name: String,
        /// Error message.
        message: String,
    },

    /// File not found.
    #[error("File not found: {path}")]
    FileNotFound {
        /// The path that was not found.
        path: PathBuf,
    },

    /// Unsupported configuration format.
    #[error("Unsupported configuration format: {format}")]
    UnsupportedFormat {
        /// The unsupported format.
        format: String,
    },

    /// Serialization error.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message.
        message: String,
    },
}

impl ConfigError {
    /// Creates a parse error.
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid environment variable error.
    pub fn invalid_env_var(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEnvVar {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates a file not found error.
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Creates an unsupported format error.
    pub fn unsupported_format(format: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    /// Creates a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Returns a user-friendly error message in Korean.
    pub fn user_message(&self) -> String {
        match self {
            ConfigError::Parse { path, message } => {
                format!("설정 파일 파싱 실패 ({}): {}", path.display(), message)
            }
            ConfigError::Validation { field, message } => {
                format!("설정 검증 실패 ({}): {}", field, message)
            }
            ConfigError::Io { path, .. } => {
                format!("설정 파일 읽기 실패: {}", path.display())
            }
            ConfigError::DuplicateTag { tag } => format!("중복된 태그: {}", tag),
            ConfigError::InvalidNodeId { value, message } => {
                format!("잘못된 노드 ID ({}): {}", value, message)
            }
            ConfigError::InvalidEnvVar { name, message } => {
                format!("잘못된 환경 변수 값 ({}): {}", name, message)
            }
            ConfigError::FileNotFound { path } => {
                format!("파일을 찾을 수 없습니다: {}", path.display())
            }
            ConfigError::UnsupportedFormat { format } => {
                format!("지원하지 않는 설정 형식: {}", format)
            }
            ConfigError::Serialization { message } => {
                format!("직렬화 오류: {}", message)
            }
        }
    }

    /// Returns `true` if this error is related to file I/O.
    pub fn is_io_error(&self) -> bool {
        matches!(self, ConfigError::Io { .. } | ConfigError::FileNotFound { .. })
    }

    /// Returns the error type as a string for logging.
    pub fn error_type(&self) -> &'static str {
        match self {
            ConfigError::Parse { .. } => "parse",
            ConfigError::Validation { .. } => "validation",
            ConfigError::Io { .. } => "io",
            ConfigError::DuplicateTag { .. } => "duplicate_tag",
            ConfigError::InvalidNodeId { .. } => "invalid_node_id",
            ConfigError::InvalidEnvVar { .. } => "invalid_env_var",
            ConfigError::FileNotFound { .. } => "file_not_found",
            ConfigError::UnsupportedFormat { .. } => "unsupported_format",
            ConfigError::Serialization { .. } => "serialization",
        }
    }
}

impl From<OpcUaError> for ConfigError {
    fn from(err: OpcUaError) -> Self {
        match err {
            OpcUaError::Configuration(ConfigurationError::Invalid { field, message }) => {
                Self::Validation { field, message }
            }
            OpcUaError::Configuration(ConfigurationError::InvalidNodeId { value, reason }) => {
                Self::InvalidNodeId {
                    value,
                    message: reason,
                }
            }
            OpcUaError::Configuration(ConfigurationError::DuplicateTag { tag }) => {
                Self::DuplicateTag { tag }
            }
            other => Self::validation("opcua", other.to_string()),
        }
    }
}

/// A Result type with ConfigError.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_creation() {
        let error = ConfigError::validation("opcua.endpoint", "must start with opc.tcp://");
        assert!(matches!(error, ConfigError::Validation { .. }));
        assert_eq!(error.error_type(), "validation");

        let error = ConfigError::unsupported_format("ini");
        assert_eq!(error.error_type(), "unsupported_format");
    }

    #[test]
    fn test_config_error_user_message() {
        let error = ConfigError::validation("tags", "must not be empty");
        let msg = error.user_message();
        assert!(msg.contains("설정 검증 실패"));
        assert!(msg.contains("tags"));
    }

    #[test]
    fn test_config_error_is_io_error() {
        let error = ConfigError::io(
            "tagwatch.yaml",
            std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        );
        assert!(error.is_io_error());
        assert!(ConfigError::file_not_found("tagwatch.yaml").is_io_error());
        assert!(!ConfigError::validation("tags", "x").is_io_error());
    }

    #[test]
    fn test_from_client_error() {
        let err: ConfigError = OpcUaError::invalid_config("endpoint", "Endpoint is required").into();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "endpoint"));

        let err: ConfigError = OpcUaError::configuration(ConfigurationError::DuplicateTag {
            tag: "ActLineSpeed".into(),
        })
        .into();
        assert!(matches!(err, ConfigError::DuplicateTag { .. }));
    }
}
