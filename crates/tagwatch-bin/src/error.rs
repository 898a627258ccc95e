// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for the tagwatch binary.
//!
//! Every variant maps to a distinct process exit code so a supervisor can
//! tell a bad configuration apart from a server that stayed unreachable.

use std::path::{Path, PathBuf};

use tagwatch_config::ConfigError;
use tagwatch_opcua::{FatalReason, OpcUaError};
use thiserror::Error;

/// Result type alias for tagwatch-bin operations.
pub type BinResult<T> = Result<T, BinError>;

/// Errors surfaced by the `tagwatch` commands.
#[derive(Debug, Error)]
pub enum BinError {
    /// The configuration was rejected before anything connected.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A configuration file could not be loaded.
    #[error("Failed to load {}: {source}", path.display())]
    Load {
        /// The file that was read.
        path: PathBuf,
        /// Why loading failed.
        #[source]
        source: ConfigError,
    },

    /// Configuration values that failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Logging or signal handling could not be installed.
    #[error("Initialization error: {0}")]
    Initialization(String),

    /// The monitor could not be set up.
    #[error("OPC UA error: {0}")]
    OpcUa(#[from] OpcUaError),

    /// The monitor stopped on its own.
    #[error("Monitor stopped: {0}")]
    Fatal(FatalReason),

    /// Command output could not be rendered.
    #[error("Failed to render output: {0}")]
    Output(#[from] serde_json::Error),
}

impl BinError {
    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates an initialization error.
    pub fn init(msg: impl Into<String>) -> Self {
        Self::Initialization(msg.into())
    }

    /// Wraps a load failure for `path`.
    pub fn load(path: impl AsRef<Path>, source: ConfigError) -> Self {
        Self::Load {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Process exit code.
    ///
    /// | code | meaning |
    /// |------|---------|
    /// | 1 | configuration |
    /// | 2 | initialization |
    /// | 3 | monitor setup |
    /// | 4 | output rendering |
    /// | 8 | fatal stop |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) | Self::Load { .. } | Self::Config(_) => 1,
            Self::Initialization(_) => 2,
            Self::OpcUa(_) => 3,
            Self::Output(_) => 4,
            Self::Fatal(_) => 8,
        }
    }
}

impl From<FatalReason> for BinError {
    fn from(reason: FatalReason) -> Self {
        Self::Fatal(reason)
    }
}

// =============================================================================
// Error Reporting
// =============================================================================

/// Prints `error` and its causes to stderr.
///
/// Logging may not be installed yet, so this never goes through tracing.
pub fn report_error(error: &BinError) {
    eprintln!("Error: {}", error);

    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        eprintln!("  Caused by: {}", cause);
        source = cause.source();
    }
}

/// Reports an error and exits with its code.
pub fn report_error_and_exit(error: BinError) -> ! {
    report_error(&error);
    std::process::exit(error.exit_code())
}

// =============================================================================
// Tests
// =============================================================================
