// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # tagwatch-config
//!
//! Configuration file handling for tagwatch.
//!
//! ## Features
//!
//! - **Schema Definition**: client settings, tag list and logging
//! - **Multi-Format Support**: YAML, TOML, and JSON configuration files
//! - **Environment Overrides**: Override config values via environment variables
//!
//! ## Quick Start
//!
//! ```no_run
//! use tagwatch_config::loader::load_config;
//!
//! let config = load_config("tagwatch.yaml").unwrap();
//! let registry = config.registry().unwrap();
//!
//! println!("Endpoint: {}", config.opcua.endpoint);
//! println!("Tags: {}", registry.len());
//! ```
//!
//! ## Configuration Schema
//!
//! ```yaml
//! opcua:
//!   endpoint: "${PLC_ENDPOINT:opc.tcp://172.30.10.2:4840}"
//!   namespace_index: 4
//!   connection:
//!     initial_delay: 1s
//!     max_retries: 5
//! tags:
//!   - ActLineSpeed
//!   - name: T2m
//!     node_id: "ns=2;s=Weather.T2m"
//! logging:
//!   level: info
//!   format: text
//! ```
//!
//! Leaving out `tags` monitors the built-in machine tag list.
//!
//! ## Environment Variables
//!
//! ```text
//! TAGWATCH_ENDPOINT=opc.tcp://plc:4840
//! TAGWATCH_MAX_RETRIES=10
//! TAGWATCH_LOG_LEVEL=debug
//! TAGWATCH_LOG_FORMAT=json
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod error;
pub mod loader;
pub mod schema;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    load_config, load_config_str, ConfigFormat, ConfigLoader, ConfigLoaderBuilder,
    DEFAULT_ENV_PREFIX,
};
pub use schema::{
    LogFormat, LogLevel, LoggingConfig, TagEntry, TagwatchConfig, DEFAULT_ENDPOINT,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");

// =============================================================================
// Prelude
// =============================================================================

/// Convenience re-exports for common use cases.
pub mod prelude {
    pub use crate::error::{ConfigError, ConfigResult};
    pub use crate::loader::{load_config, ConfigLoader};
    pub use crate::schema::{TagEntry, TagwatchConfig};
}
