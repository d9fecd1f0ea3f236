//! Engine-agnostic diagnostics.
//!
//! Raw [`EngineDiagnostic`]s are turned into [`NormalizedDiagnostic`] records
//! with 1-based positions, a flat message and a three-level severity. The
//! functions here are pure.

mod render;

pub use render::{OutputFormat, render, render_summary};

use crate::engine::{DiagnosticCategory, EngineDiagnostic, MessageChain, MessageText};
use serde::{Deserialize, Serialize};

/// Severity of a normalized diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }

    /// Map an engine category. Unknown categories count as errors.
    pub fn from_category(category: DiagnosticCategory) -> Self {
        match category {
            DiagnosticCategory::Error => Self::Error,
            DiagnosticCategory::Warning => Self::Warning,
            DiagnosticCategory::Suggestion | DiagnosticCategory::Message => Self::Info,
            DiagnosticCategory::Other(_) => Self::Error,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A diagnostic in the one shape every caller consumes.
///
/// `line` and `column` are 1-based; both are `0` when the engine gave no
/// location. Field order is the serialized key order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizedDiagnostic {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub message: String,
    pub code: String,
    pub severity: Severity,
}

impl NormalizedDiagnostic {
    /// A diagnostic produced by the toolchain itself rather than the engine.
    pub fn synthetic(file: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line: 0,
            column: 0,
            message: message.into(),
            code: code.into(),
            severity: Severity::Error,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl std::fmt::Display for NormalizedDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{} - {}: {} ({})",
            self.file, self.line, self.column, self.severity, self.message, self.code
        )
    }
}

/// Per-severity counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticSummary {
    pub error_count: usize,
    pub warning_count: usize,
    pub info_count: usize,
}

impl DiagnosticSummary {
    pub fn total(&self) -> usize {
        self.error_count + self.warning_count + self.info_count
    }
}

/// Normalize one raw diagnostic. `tag` prefixes the numeric code.
pub fn normalize(diagnostic: &EngineDiagnostic, tag: &str) -> NormalizedDiagnostic {
    let file = diagnostic
        .file
        .as_ref()
        .map(|f| f.name().to_string())
        .unwrap_or_default();

    let (line, column) = match (&diagnostic.file, diagnostic.start) {
        (Some(source), Some(start)) => {
            let (line, character) = source.line_and_character_of(start);
            (line + 1, character + 1)
        }
        _ => (0, 0),
    };

    NormalizedDiagnostic {
        file,
        line,
        column,
        message: flatten_message(&diagnostic.message),
        code: format!("{}{}", tag, diagnostic.code),
        severity: Severity::from_category(diagnostic.category),
    }
}

/// Normalize a sequence, keeping its order.
pub fn normalize_all(diagnostics: &[EngineDiagnostic], tag: &str) -> Vec<NormalizedDiagnostic> {
    diagnostics.iter().map(|d| normalize(d, tag)).collect()
}

pub fn summarize(diagnostics: &[NormalizedDiagnostic]) -> DiagnosticSummary {
    let mut summary = DiagnosticSummary::default();
    for d in diagnostics {
        match d.severity {
            Severity::Error => summary.error_count += 1,
            Severity::Warning => summary.warning_count += 1,
            Severity::Info => summary.info_count += 1,
        }
    }
    summary
}

pub fn has_errors(diagnostics: &[NormalizedDiagnostic]) -> bool {
    diagnostics.iter().any(NormalizedDiagnostic::is_error)
}

/// Flatten a possibly chained message into newline-separated lines.
///
/// Each nested link is indented two spaces per depth.
pub fn flatten_message(message: &MessageText) -> String {
    match message {
        MessageText::Text(text) => text.clone(),
        MessageText::Chain(chain) => {
            let mut out = String::new();
            flatten_chain(chain, 0, &mut out);
            out
        }
    }
}

fn flatten_chain(chain: &MessageChain, depth: usize, out: &mut String) {
    if depth > 0 {
        out.push('\n');
        out.push_str(&"  ".repeat(depth));
    }
    out.push_str(&chain.text);
    for next in &chain.next {
        flatten_chain(next, depth + 1, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SourceFile;
    use std::sync::Arc;

    fn source() -> Arc<SourceFile> {
        Arc::new(SourceFile::new(
            "/p/src/add.ts",
            "function add(a: number, b: number): string {\n  return a + b;\n}\n",
        ))
    }

    #[test]
    fn test_normalize_positions_are_one_based() {
        let file = source();
        let start = file.text().find("return").unwrap() as u32;
        let raw = EngineDiagnostic::at(
            file,
            start,
            6,
            2322,
            "Type 'number' is not assignable to type 'string'.",
        );

        let d = normalize(&raw, "TS");
        assert_eq!(d.file, "/p/src/add.ts");
        assert_eq!((d.line, d.column), (2, 3));
        assert_eq!(d.code, "TS2322");
        assert_eq!(d.severity, Severity::Error);
    }

    #[test]
    fn test_normalize_without_location() {
        let raw = EngineDiagnostic::global(5083, "Cannot read file '/p/tsconfig.json'.");
        let d = normalize(&raw, "TS");
        assert_eq!(d.file, "");
        assert_eq!((d.line, d.column), (0, 0));
    }

    #[test]
    fn test_file_without_offset_has_no_position() {
        let mut raw = EngineDiagnostic::at(source(), 3, 1, 1005, "';' expected.");
        raw.start = None;
        let d = normalize(&raw, "TS");
        assert_eq!(d.file, "/p/src/add.ts");
        assert_eq!((d.line, d.column), (0, 0));
    }

    #[test]
    fn test_category_mapping_is_total() {
        let cases = [
            (DiagnosticCategory::Error, Severity::Error),
            (DiagnosticCategory::Warning, Severity::Warning),
            (DiagnosticCategory::Suggestion, Severity::Info),
            (DiagnosticCategory::Message, Severity::Info),
            (DiagnosticCategory::Other(42), Severity::Error),
        ];
        for (category, expected) in cases {
            let raw = EngineDiagnostic::global(1, "m").with_category(category);
            assert_eq!(normalize(&raw, "TS").severity, expected);
        }
    }

    #[test]
    fn test_chain_flattening_keeps_every_cause() {
        let chain = MessageChain::new("Argument of type 'string' is not assignable.")
            .with_next(
                MessageChain::new("Type 'string' is not assignable to type 'number'.")
                    .with_next(MessageChain::new("Deep cause.")),
            )
            .with_next(MessageChain::new("Sibling cause."));

        let flat = flatten_message(&MessageText::Chain(chain));
        assert_eq!(
            flat,
            "Argument of type 'string' is not assignable.\n  Type 'string' is not assignable to type 'number'.\n    Deep cause.\n  Sibling cause."
        );
    }

    #[test]
    fn test_renormalization_is_stable() {
        let file = source();
        let raw = EngineDiagnostic::at(file.clone(), 50, 1, 2322, "m");
        let first = normalize(&raw, "TS");

        // Map the normalized position back to an offset and normalize again
        let offset = file.offset_of(first.line - 1, first.column - 1).unwrap();
        let again = normalize(&EngineDiagnostic::at(file, offset, 1, 2322, "m"), "TS");
        assert_eq!(first, again);
    }

    #[test]
    fn test_summarize_counts() {
        let ds = vec![
            NormalizedDiagnostic::synthetic("a.ts", "TS1", "x"),
            NormalizedDiagnostic {
                severity: Severity::Warning,
                ..NormalizedDiagnostic::synthetic("a.ts", "TS2", "y")
            },
            NormalizedDiagnostic {
                severity: Severity::Info,
                ..NormalizedDiagnostic::synthetic("a.ts", "TS3", "z")
            },
            NormalizedDiagnostic::synthetic("b.ts", "TS4", "w"),
        ];
        let summary = summarize(&ds);
        assert_eq!(summary.error_count, 2);
        assert_eq!(summary.warning_count, 1);
        assert_eq!(summary.info_count, 1);
        assert_eq!(summary.total(), 4);
        assert!(has_errors(&ds));
        assert_eq!(summarize(&[]), DiagnosticSummary::default());
    }

    #[test]
    fn test_summary_serializes_camel_case() {
        let json = serde_json::to_value(DiagnosticSummary {
            error_count: 1,
            warning_count: 0,
            info_count: 2,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"errorCount": 1, "warningCount": 0, "infoCount": 2})
        );
    }
}
