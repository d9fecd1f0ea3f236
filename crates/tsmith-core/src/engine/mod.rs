//! Compiler engine seam.
//!
//! The orchestrators never parse, check, or generate code themselves. They
//! drive a [`CompilerEngine`] and consume its raw diagnostics, which carry
//! byte offsets into a [`SourceFile`] and possibly chained messages.

pub mod swc;
pub mod tsconfig;
pub mod tsgo;

use crate::options::EffectiveOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use swc::SwcEngine;
pub use tsgo::TsgoEngine;

// ============================================================================
// Source files and positions
// ============================================================================

/// Text of one file together with its line table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    name: String,
    text: String,
    line_starts: Vec<usize>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let mut line_starts = vec![0];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self {
            name: name.into(),
            text,
            line_starts,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Zero-based `(line, character)` of a byte offset.
    ///
    /// Offsets past the end clamp to the end of the text. Characters are
    /// counted in Unicode scalar values.
    pub fn line_and_character_of(&self, offset: u32) -> (u32, u32) {
        let offset = (offset as usize).min(self.text.len());
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let start = self.line_starts[line];
        let column = self
            .text
            .get(start..offset)
            .map(|s| s.chars().count())
            .unwrap_or(offset - start);
        (line as u32, column as u32)
    }

    /// Byte offset of a zero-based `(line, character)` position, if it exists.
    pub fn offset_of(&self, line: u32, character: u32) -> Option<u32> {
        let start = *self.line_starts.get(line as usize)?;
        let end = self
            .line_starts
            .get(line as usize + 1)
            .copied()
            .unwrap_or(self.text.len());
        let line_text = &self.text[start..end];
        if character == 0 {
            return Some(start as u32);
        }
        line_text
            .char_indices()
            .nth(character as usize)
            .map(|(i, _)| (start + i) as u32)
            .or_else(|| (line_text.chars().count() == character as usize).then_some(end as u32))
    }
}

/// Extension of the JavaScript file a TypeScript source compiles to.
pub fn js_extension_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("mts") => "mjs",
        Some("cts") => "cjs",
        _ => "js",
    }
}

/// `path` with its TypeScript extension replaced by the JavaScript one.
pub fn js_path_for(path: &Path) -> PathBuf {
    path.with_extension(js_extension_for(path))
}

// ============================================================================
// Raw diagnostics
// ============================================================================

/// Engine-side diagnostic category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticCategory {
    Warning,
    Error,
    Suggestion,
    Message,
    /// Anything the engine adds later.
    Other(u32),
}

/// A message chain: a head line and nested causes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageChain {
    pub text: String,
    pub next: Vec<MessageChain>,
}

impl MessageChain {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            next: Vec::new(),
        }
    }

    pub fn with_next(mut self, next: MessageChain) -> Self {
        self.next.push(next);
        self
    }
}

/// Diagnostic message, either plain or chained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageText {
    Text(String),
    Chain(MessageChain),
}

impl From<&str> for MessageText {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MessageText {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<MessageChain> for MessageText {
    fn from(value: MessageChain) -> Self {
        Self::Chain(value)
    }
}

/// A diagnostic as produced by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineDiagnostic {
    pub file: Option<Arc<SourceFile>>,
    /// Byte offset into `file`.
    pub start: Option<u32>,
    pub length: Option<u32>,
    pub category: DiagnosticCategory,
    pub code: u32,
    pub message: MessageText,
}

impl EngineDiagnostic {
    /// An error without a location.
    pub fn global(code: u32, message: impl Into<MessageText>) -> Self {
        Self {
            file: None,
            start: None,
            length: None,
            category: DiagnosticCategory::Error,
            code,
            message: message.into(),
        }
    }

    /// An error at `start..start + length` in `file`.
    pub fn at(
        file: Arc<SourceFile>,
        start: u32,
        length: u32,
        code: u32,
        message: impl Into<MessageText>,
    ) -> Self {
        Self {
            file: Some(file),
            start: Some(start),
            length: Some(length),
            category: DiagnosticCategory::Error,
            code,
            message: message.into(),
        }
    }

    pub fn with_category(mut self, category: DiagnosticCategory) -> Self {
        self.category = category;
        self
    }
}

// ============================================================================
// Engine results
// ============================================================================

/// Result of parsing a configuration file.
#[derive(Debug, Clone, Default)]
pub struct ParsedConfig {
    pub options: EffectiveOptions,
    /// Root files selected by `files` / `include` / `exclude`.
    pub file_names: Vec<PathBuf>,
    /// Config-parse errors. Empty when the file is well-formed.
    pub errors: Vec<EngineDiagnostic>,
}

/// Output of a single-file transpile.
#[derive(Debug, Clone, Default)]
pub struct TranspileOutput {
    /// `None` when the engine could not produce code at all.
    pub code: Option<String>,
    pub source_map: Option<String>,
    pub diagnostics: Vec<EngineDiagnostic>,
}

/// A file the engine wants written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedFile {
    pub path: PathBuf,
    pub content: String,
}

/// Result of [`Program::emit`]. Files are returned, not written.
#[derive(Debug, Clone, Default)]
pub struct EmitResult {
    pub emit_skipped: bool,
    pub diagnostics: Vec<EngineDiagnostic>,
    pub files: Vec<EmittedFile>,
}

/// A whole-program view built by the engine.
pub trait Program: Send {
    fn root_files(&self) -> &[PathBuf];

    /// Every diagnostic known before emit (syntactic, global, semantic).
    fn pre_emit_diagnostics(&self) -> Vec<EngineDiagnostic>;

    fn syntactic_diagnostics(&self) -> Vec<EngineDiagnostic>;

    fn emit(&self) -> EmitResult;

    /// Why semantic checking did not run for this program, if it did not.
    /// Only meaningful after [`pre_emit_diagnostics`](Self::pre_emit_diagnostics).
    fn unchecked_reason(&self) -> Option<String> {
        None
    }
}

// ============================================================================
// Syntax trees
// ============================================================================

/// Node kinds the syntax-only pass distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxKind {
    SourceFile,
    Statement,
    Declaration,
    Expression,
    /// Token the parser could not make sense of.
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxNode {
    pub kind: SyntaxKind,
    /// Byte offset of the node start.
    pub start: u32,
    pub end: u32,
    pub children: Vec<SyntaxNode>,
}

impl SyntaxNode {
    pub fn leaf(kind: SyntaxKind, start: u32, end: u32) -> Self {
        Self {
            kind,
            start,
            end,
            children: Vec::new(),
        }
    }

    /// Depth-first, pre-order visit of this node and all descendants.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a SyntaxNode)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}

/// A parsed file, for structure-only inspection.
#[derive(Debug, Clone)]
pub struct SyntaxTree {
    pub file: Arc<SourceFile>,
    pub root: SyntaxNode,
}

impl SyntaxTree {
    /// Every node of the given kind, in document order.
    pub fn nodes_of_kind(&self, kind: SyntaxKind) -> Vec<&SyntaxNode> {
        let mut found = Vec::new();
        self.root.walk(&mut |node| {
            if node.kind == kind {
                found.push(node);
            }
        });
        found
    }
}

// ============================================================================
// The engine
// ============================================================================

/// A compiler/type-checking engine.
///
/// Methods are synchronous and may be slow; callers run them on a blocking
/// thread.
pub trait CompilerEngine: Send + Sync {
    /// Prefix for diagnostic codes (`TS` gives `TS2322`).
    fn tag(&self) -> &str {
        "TS"
    }

    /// Name of the project configuration file.
    fn config_file_name(&self) -> &str {
        "tsconfig.json"
    }

    /// Parse a configuration file. Malformed input produces `errors`, not a panic.
    fn parse_config(&self, path: &Path) -> ParsedConfig;

    fn create_program(&self, root_files: &[PathBuf], options: &EffectiveOptions) -> Box<dyn Program>;

    fn transpile(&self, source: &str, file_name: &str, options: &EffectiveOptions) -> TranspileOutput;

    fn parse_syntax_tree(&self, source: &str, file_name: &str) -> SyntaxTree;
}

/// Engine used when none is given: [`TsgoEngine`] with `checker`, or with a
/// checker found on PATH, else [`SwcEngine`] alone.
pub fn default_engine(checker: Option<&Path>) -> Arc<dyn CompilerEngine> {
    let engine = match checker {
        Some(path) => Some(TsgoEngine::with_binary(path)),
        None => TsgoEngine::locate(),
    };
    match engine {
        Some(engine) => {
            tracing::debug!(checker = %engine.binary().display(), "semantic checking enabled");
            Arc::new(engine)
        }
        None => {
            tracing::debug!("no type checker found, checking syntax only");
            Arc::new(SwcEngine::new())
        }
    }
}
