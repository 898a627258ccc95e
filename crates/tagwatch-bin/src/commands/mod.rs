// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI command implementations.
//!
//! - `run`: Monitor the configured tags
//! - `validate`: Validate configuration file
//! - `tags`: List the resolved tags
//! - `version`: Show version information

mod run;
mod tags;
mod validate;
mod version;

pub use run::run;
pub use tags::tags;
pub use validate::validate;
pub use version::version;

use crate::cli::{Cli, Commands};
use crate::error::BinResult;

/// Executes the appropriate command based on CLI arguments.
pub async fn execute(cli: Cli) -> BinResult<()> {
    match cli.effective_command() {
        Commands::Run(args) => run::run(&cli, args).await,
        Commands::Validate(args) => validate::validate(&cli, args),
        Commands::Tags(args) => tags::tags(&cli, args),
        Commands::Version => version::version(&cli),
    }
}
