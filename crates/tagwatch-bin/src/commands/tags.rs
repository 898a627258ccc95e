// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `tags` command.

use tagwatch_config::ConfigLoader;

use crate::cli::{Cli, OutputFormat, TagsArgs};
use crate::error::BinResult;

/// Prints the tag to node id mapping that `run` would subscribe to.
pub fn tags(cli: &Cli, args: TagsArgs) -> BinResult<()> {
    let config = ConfigLoader::new().load_or_default(&cli.config)?;
    let registry = config.registry()?;

    match args.format {
        OutputFormat::Text => {
            let width = registry.tags().map(|t| t.as_str().len()).max().unwrap_or(0);
            for (tag, node_id) in registry.iter() {
                println!("{:width$}  {}", tag.as_str(), node_id, width = width);
            }
            if !cli.quiet {
                println!();
                println!(
                    "{} tags{}",
                    registry.len(),
                    if config.uses_builtin_tags() { " (built-in list)" } else { "" }
                );
            }
        }
        OutputFormat::Json => {
            let entries: Vec<_> = registry
                .iter()
                .map(|(tag, node_id)| {
                    serde_json::json!({ "tag": tag.as_str(), "node_id": node_id.to_string() })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
    }

    Ok(())
}
