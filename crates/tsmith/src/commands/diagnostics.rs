//! Diagnostics command - print type-check diagnostics in a chosen format.

use anyhow::{Context as _, Result};
use clap::Args;
use std::path::PathBuf;
use tsmith_core::{OutputFormat, TypeCheckRequest};

use super::Context;

#[derive(Args)]
pub struct DiagnosticsCommand {
    /// File or project directory to check
    pub path: PathBuf,

    /// json, text or formatted (defaults to the settings file, then text)
    #[arg(long, short = 'f')]
    pub format: Option<OutputFormat>,
}

impl DiagnosticsCommand {
    /// Prints the rendered diagnostics. Exits successfully whenever the check
    /// ran; use `check` for an exit code that reflects errors.
    pub async fn run(&self, ctx: &Context) -> Result<bool> {
        let format = self.format.unwrap_or_else(|| ctx.output_format());
        let request = TypeCheckRequest::new(&self.path).with_format(format);

        let rendered = ctx
            .toolchain
            .get_diagnostics(&request)
            .await
            .with_context(|| format!("failed to collect diagnostics for {}", self.path.display()))?;

        if !rendered.is_empty() {
            println!("{}", rendered);
        }
        Ok(true)
    }
}
