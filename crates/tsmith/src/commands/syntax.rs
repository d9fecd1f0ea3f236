//! Syntax command - parse-only validation of one file.

use anyhow::{Context as _, Result};
use clap::Args;
use std::path::PathBuf;

use super::Context;

#[derive(Args)]
pub struct SyntaxCommand {
    /// File to validate
    pub file: PathBuf,
}

impl SyntaxCommand {
    pub async fn run(&self, ctx: &Context) -> Result<bool> {
        let validation = ctx
            .toolchain
            .validate_syntax(&self.file)
            .await
            .with_context(|| format!("failed to validate {}", self.file.display()))?;

        if ctx.json {
            ctx.print_json(&validation)?;
        } else if validation.is_valid {
            println!("No syntax errors in {}", self.file.display());
        } else {
            ctx.print_diagnostics(&validation.errors);
        }
        Ok(validation.is_valid)
    }
}
