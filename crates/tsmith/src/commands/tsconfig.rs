//! Config command - create and edit tsconfig.json.

use anyhow::{Context as _, Result};
use clap::{Args, Subcommand};
use serde_json::{Map, Value};
use std::path::PathBuf;

use super::Context;

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Write a new tsconfig.json with default compiler options
    Init {
        /// Project directory
        #[arg(default_value = ".")]
        dir: PathBuf,

        /// Compiler option to set, e.g. --set target=ES2022 (repeatable)
        #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_assignment)]
        set: Vec<(String, Value)>,
    },

    /// Change compiler options of an existing tsconfig.json
    Update {
        /// Configuration file or the directory holding it
        path: PathBuf,

        /// Compiler option to set; `KEY=null` removes it (repeatable)
        #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_assignment, required = true)]
        set: Vec<(String, Value)>,
    },
}

/// Parse `KEY=VALUE`. The value is read as JSON when it parses, else as a string.
pub fn parse_assignment(input: &str) -> Result<(String, Value), String> {
    let (key, raw) = input
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", input))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing option name in '{}'", input));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

fn to_map(assignments: &[(String, Value)]) -> Map<String, Value> {
    assignments.iter().cloned().collect()
}

impl ConfigCommand {
    pub fn run(&self, ctx: &Context) -> Result<bool> {
        match &self.action {
            ConfigAction::Init { dir, set } => {
                let options = to_map(set);
                let written = ctx
                    .toolchain
                    .create_config(dir, (!options.is_empty()).then_some(&options))
                    .with_context(|| format!("failed to create configuration in {}", dir.display()))?;
                if ctx.json {
                    ctx.print_json(&written)?;
                } else {
                    println!("Created {}", written.path.display());
                }
            }
            ConfigAction::Update { path, set } => {
                let written = ctx
                    .toolchain
                    .update_config(path, &to_map(set))
                    .with_context(|| format!("failed to update {}", path.display()))?;
                if ctx.json {
                    ctx.print_json(&written)?;
                } else {
                    println!("Updated {} ({} option(s))", written.path.display(), set.len());
                }
            }
        }
        Ok(true)
    }
}
