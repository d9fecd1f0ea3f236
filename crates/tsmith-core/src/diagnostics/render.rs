//! Rendering of normalized diagnostics.

use super::{DiagnosticSummary, NormalizedDiagnostic, Severity};
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::str::FromStr;

const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// Output format for [`render`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    #[default]
    Text,
    Formatted,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" => Ok(Self::Text),
            "formatted" => Ok(Self::Formatted),
            other => Err(format!(
                "unknown output format '{}' (expected json, text or formatted)",
                other
            )),
        }
    }
}

/// Render diagnostics in the given format.
pub fn render(diagnostics: &[NormalizedDiagnostic], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => render_json(diagnostics),
        OutputFormat::Text => render_text(diagnostics),
        OutputFormat::Formatted => render_formatted(diagnostics),
    }
}

fn render_json(diagnostics: &[NormalizedDiagnostic]) -> String {
    // Plain structs of strings and integers always serialize
    serde_json::to_string_pretty(diagnostics).unwrap_or_else(|_| "[]".to_string())
}

/// One line per diagnostic. Chained message lines are joined with spaces.
fn render_text(diagnostics: &[NormalizedDiagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| {
            let message = d
                .message
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            format!(
                "{}:{}:{} - {}: {} ({})",
                d.file, d.line, d.column, d.severity, message, d.code
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_formatted(diagnostics: &[NormalizedDiagnostic]) -> String {
    let blocks: Vec<String> = diagnostics
        .iter()
        .map(|d| {
            let (icon, color) = match d.severity {
                Severity::Error => ("✖", RED),
                Severity::Warning => ("⚠", YELLOW),
                Severity::Info => ("ℹ", CYAN),
            };
            let mut block = String::new();
            writeln!(
                block,
                "{}{} {}{} {}:{}:{}",
                color, icon, d.severity, RESET, d.file, d.line, d.column
            )
            .ok();
            for line in d.message.lines() {
                writeln!(block, "  {}", line).ok();
            }
            write!(block, "  {}{}{}", DIM, d.code, RESET).ok();
            block
        })
        .collect();

    blocks.join("\n\n")
}

/// One-line human summary, e.g. `2 errors, 1 warning`.
pub fn render_summary(summary: &DiagnosticSummary) -> String {
    if summary.total() == 0 {
        return "No problems found".to_string();
    }

    let plural = |n: usize, word: &str| {
        if n == 1 {
            format!("{} {}", n, word)
        } else {
            format!("{} {}s", n, word)
        }
    };

    let mut parts = Vec::new();
    if summary.error_count > 0 {
        parts.push(plural(summary.error_count, "error"));
    }
    if summary.warning_count > 0 {
        parts.push(plural(summary.warning_count, "warning"));
    }
    if summary.info_count > 0 {
        parts.push(plural(summary.info_count, "message"));
    }
    parts.join(", ")
}
