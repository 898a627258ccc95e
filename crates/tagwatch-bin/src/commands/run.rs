// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `run` command.

use crate::cli::{Cli, RunArgs};
use crate::error::BinResult;
use crate::runtime::RuntimeBuilder;
use crate::shutdown::ShutdownCoordinator;

/// Executes the `run` command.
pub async fn run(cli: &Cli, args: RunArgs) -> BinResult<()> {
    let shutdown = ShutdownCoordinator::new();
    let _handlers = shutdown.install_signal_handlers()?;

    let runtime = RuntimeBuilder::new()
        .config_path(&cli.config)
        .endpoint(args.endpoint.clone())
        .simulate(args.simulate.then(|| args.sim_interval()))
        .shutdown(shutdown)
        .build()?;

    runtime.run().await
}
