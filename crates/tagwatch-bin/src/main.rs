// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! tagwatch - OPC UA tag change monitor.

use tagwatch_bin::cli::{Cli, LogFormat};
use tagwatch_bin::error::report_error_and_exit;
use tagwatch_bin::{commands, init_logging};
use tagwatch_config::{ConfigLoader, LoggingConfig};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    // Errors in the file are reported by the command itself.
    let logging = ConfigLoader::new()
        .load_or_default(&cli.config)
        .map(|config| config.logging)
        .unwrap_or_else(|_| LoggingConfig::default());

    let level = cli.effective_log_level(logging.level.as_str()).to_string();
    let format = cli.log_format.unwrap_or_else(|| LogFormat::from(logging.format));
    if let Err(e) = init_logging(&level, format) {
        report_error_and_exit(e);
    }

    if let Err(e) = commands::execute(cli).await {
        report_error_and_exit(e);
    }
}
