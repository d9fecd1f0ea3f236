//! Check command - type check a file or project without emitting.

use anyhow::{Context as _, Result};
use clap::Args;
use std::path::PathBuf;
use tsmith_core::TypeCheckRequest;

use super::Context;

#[derive(Args)]
pub struct CheckCommand {
    /// File or project directory to check
    pub path: PathBuf,

    /// Force strict mode on
    #[arg(long)]
    pub strict: bool,

    /// Also check declaration files (turns skipLibCheck off)
    #[arg(long)]
    pub include_declarations: bool,
}

impl CheckCommand {
    pub fn request(&self) -> TypeCheckRequest {
        let mut request = TypeCheckRequest::new(&self.path);
        if self.strict {
            request = request.with_strict(true);
        }
        if self.include_declarations {
            request = request.with_include_declarations(true);
        }
        request
    }

    pub async fn run(&self, ctx: &Context) -> Result<bool> {
        let result = ctx
            .toolchain
            .check_types(&self.request())
            .await
            .with_context(|| format!("failed to type check {}", self.path.display()))?;

        if ctx.json {
            ctx.print_json(&result)?;
        } else {
            ctx.print_diagnostics(&result.diagnostics);
        }
        Ok(result.success)
    }
}
