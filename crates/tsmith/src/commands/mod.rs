//! CLI command implementations.

pub mod check;
pub mod compile;
pub mod diagnostics;
pub mod syntax;
pub mod tsconfig;

use anyhow::Result;
use serde::Serialize;
use tsmith_core::{NormalizedDiagnostic, OutputFormat, Toolchain, render, render_summary, summarize};

use crate::config::Settings;

/// Shared state handed to every command.
pub struct Context {
    pub toolchain: Toolchain,
    pub settings: Settings,
    /// Print result envelopes as JSON.
    pub json: bool,
}

impl Context {
    pub fn output_format(&self) -> OutputFormat {
        self.settings.output_format(self.json)
    }

    /// Print `value` as pretty JSON on stdout.
    pub fn print_json<T: Serialize>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    /// Print diagnostics in the configured format followed by a summary line.
    pub fn print_diagnostics(&self, diagnostics: &[NormalizedDiagnostic]) {
        if !diagnostics.is_empty() {
            println!("{}", render(diagnostics, self.output_format()));
        }
        println!("{}", render_summary(&summarize(diagnostics)));
    }
}
