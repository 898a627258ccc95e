// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # tagwatch-bin
//!
//! Command line front end for the tagwatch OPC UA tag monitor.
//!
//! - CLI argument parsing with clap
//! - Monitor runtime orchestration
//! - Graceful shutdown on SIGINT, SIGTERM and SIGQUIT
//! - Logging initialization
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │                 main.rs                  │
//! └────────────────────┬─────────────────────┘
//!                      │
//!               ┌──────▼──────┐
//!               │    cli.rs   │
//!               └──────┬──────┘
//!                      │
//!          ┌───────────┼───────────┐
//!          ▼           ▼           ▼
//!   ┌──────────┐ ┌──────────┐ ┌──────────┐
//!   │ commands │ │ runtime  │ │ logging  │
//!   └──────────┘ └────┬─────┘ └──────────┘
//!                     │
//!              ┌──────▼──────┐
//!              │  shutdown   │
//!              └──────┬──────┘
//!                     │
//!              ┌──────▼──────┐
//!              │ TagMonitor  │
//!              └─────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Monitor the tags in tagwatch.yaml (default command)
//! tagwatch
//!
//! # Point at another server
//! tagwatch run --endpoint opc.tcp://172.30.10.2:4840
//!
//! # Try it without a server
//! tagwatch run --simulate --sim-interval 500ms
//!
//! # Check a configuration file
//! tagwatch -c /etc/tagwatch/plant.yaml validate --show-config
//!
//! # List the tags and their node ids
//! tagwatch tags
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod shutdown;

// =============================================================================
// Re-exports
// =============================================================================

pub use cli::{Cli, Commands};
pub use error::{BinError, BinResult};
pub use logging::init_logging;
pub use runtime::{LoggingListener, MonitorRuntime, RuntimeBuilder};
pub use shutdown::{ShutdownCoordinator, ShutdownSignal};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
