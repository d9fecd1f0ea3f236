//! Type checking and syntax validation without emitting.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::blocking::run_engine;
use crate::compile::INTERNAL;
use crate::diagnostics::{
    DiagnosticSummary, NormalizedDiagnostic, OutputFormat, Severity, has_errors, normalize_all,
    render, summarize,
};
use crate::engine::{CompilerEngine, EngineDiagnostic, SyntaxKind};
use crate::error::{ToolchainError, ToolchainResult};
use crate::fs::FileSystem;
use crate::options::{CompilerOption, EffectiveOptions};
use crate::resolver::ConfigResolver;

/// Code reported for tokens the parser could not classify.
const INVALID_CHARACTER: u32 = 1127;

/// Code of the warning added when only syntax could be checked.
pub const SYNTAX_ONLY: &str = "syntax-only";

/// What to type-check.
///
/// `path` is a source file or a project directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeCheckRequest {
    pub path: PathBuf,
    /// Overrides `strict`.
    pub strict: Option<bool>,
    /// Check declaration files too; sets `skipLibCheck` to the opposite.
    pub include_declarations: Option<bool>,
    /// Rendering used by [`TypeCheckOrchestrator::get_diagnostics`].
    pub format: Option<OutputFormat>,
}

impl TypeCheckRequest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = Some(strict);
        self
    }

    pub fn with_include_declarations(mut self, include: bool) -> Self {
        self.include_declarations = Some(include);
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn overrides(&self) -> EffectiveOptions {
        let mut options = EffectiveOptions::new();
        if let Some(strict) = self.strict {
            options.set(CompilerOption::Strict, strict);
        }
        if let Some(include) = self.include_declarations {
            options.set(CompilerOption::SkipLibCheck, !include);
        }
        options
    }
}

/// Outcome of a type check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeCheckResult {
    pub success: bool,
    pub diagnostics: Vec<NormalizedDiagnostic>,
    pub duration_ms: u64,
    pub summary: DiagnosticSummary,
}

impl TypeCheckResult {
    fn from_diagnostics(diagnostics: Vec<NormalizedDiagnostic>) -> Self {
        Self {
            success: !has_errors(&diagnostics),
            summary: summarize(&diagnostics),
            diagnostics,
            duration_ms: 0,
        }
    }

    fn failed(diagnostics: Vec<NormalizedDiagnostic>) -> Self {
        Self {
            success: false,
            ..Self::from_diagnostics(diagnostics)
        }
    }
}

/// Outcome of a syntax-only pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyntaxValidation {
    pub is_valid: bool,
    pub errors: Vec<NormalizedDiagnostic>,
}

/// Drives the engine for check requests.
#[derive(Clone)]
pub struct TypeCheckOrchestrator {
    engine: Arc<dyn CompilerEngine>,
    fs: Arc<dyn FileSystem>,
    resolver: ConfigResolver,
}

impl TypeCheckOrchestrator {
    pub fn new(engine: Arc<dyn CompilerEngine>, fs: Arc<dyn FileSystem>) -> Self {
        let resolver = ConfigResolver::new(engine.clone(), fs.clone());
        Self {
            engine,
            fs,
            resolver,
        }
    }

    /// Type-check a file or a project directory.
    pub async fn check_types(&self, request: &TypeCheckRequest) -> ToolchainResult<TypeCheckResult> {
        let started = Instant::now();
        let this = self.clone();
        let request = request.clone();
        let label = request.path.display().to_string();

        let outcome = run_engine(move || this.check_blocking(&request)).await;
        let mut result = match outcome {
            Ok(result) => result?,
            Err(panic) => {
                tracing::error!(target = %label, error = %panic, "engine failed during type check");
                TypeCheckResult::failed(vec![NormalizedDiagnostic::synthetic(
                    label,
                    INTERNAL,
                    format!("Internal compiler error: {}", panic),
                )])
            }
        };
        result.duration_ms = started.elapsed().as_millis() as u64;
        Ok(result)
    }

    fn check_blocking(&self, request: &TypeCheckRequest) -> ToolchainResult<TypeCheckResult> {
        let overrides = request.overrides();
        let target = &request.path;

        let (resolved, roots) = if self.fs.is_file(target) {
            tracing::debug!(file = %target.display(), "type-checking single file");
            (self.resolver.resolve(target, &overrides), vec![target.clone()])
        } else {
            tracing::debug!(project = %target.display(), "type-checking project");
            let resolved = self.resolver.resolve_project(target, &overrides)?;
            let roots = resolved.file_names.clone();
            (resolved, roots)
        };

        if resolved.has_errors() {
            return Ok(TypeCheckResult::failed(normalize_all(
                &resolved.diagnostics,
                self.engine.tag(),
            )));
        }

        let program = self.engine.create_program(&roots, &resolved.options);
        let mut diagnostics = normalize_all(&program.pre_emit_diagnostics(), self.engine.tag());
        if let Some(reason) = program.unchecked_reason() {
            diagnostics.push(
                NormalizedDiagnostic::synthetic(
                    target.display().to_string(),
                    SYNTAX_ONLY,
                    format!("Semantic checking unavailable: {}. Only syntax was checked.", reason),
                )
                .with_severity(Severity::Warning),
            );
        }
        Ok(TypeCheckResult::from_diagnostics(diagnostics))
    }

    /// [`check_types`](Self::check_types) rendered in the request's format
    /// (text by default).
    pub async fn get_diagnostics(&self, request: &TypeCheckRequest) -> ToolchainResult<String> {
        let result = self.check_types(request).await?;
        Ok(render(&result.diagnostics, request.format.unwrap_or_default()))
    }

    /// Syntax-only pass over one file.
    ///
    /// Unknown-token nodes from the syntax tree come first, followed by the
    /// engine's syntactic diagnostics. Overlapping reports are kept.
    pub async fn validate_syntax(&self, file: &Path) -> ToolchainResult<SyntaxValidation> {
        let this = self.clone();
        let path = file.to_path_buf();
        let label = file.display().to_string();

        match run_engine(move || this.validate_blocking(&path)).await {
            Ok(result) => result,
            Err(panic) => {
                tracing::error!(file = %label, error = %panic, "engine failed during syntax validation");
                Ok(SyntaxValidation {
                    is_valid: false,
                    errors: vec![NormalizedDiagnostic::synthetic(
                        label,
                        INTERNAL,
                        format!("Internal compiler error: {}", panic),
                    )],
                })
            }
        }
    }

    fn validate_blocking(&self, file: &Path) -> ToolchainResult<SyntaxValidation> {
        if !self.fs.is_file(file) {
            return Err(ToolchainError::SourceNotFound(file.to_path_buf()));
        }
        let source = self
            .fs
            .read_text(file)
            .map_err(|e| ToolchainError::io(file, e))?;

        let tree = self
            .engine
            .parse_syntax_tree(&source, &file.display().to_string());
        let unknown: Vec<EngineDiagnostic> = tree
            .nodes_of_kind(SyntaxKind::Unknown)
            .into_iter()
            .map(|node| {
                EngineDiagnostic::at(
                    tree.file.clone(),
                    node.start,
                    node.end.saturating_sub(node.start),
                    INVALID_CHARACTER,
                    "Invalid character.",
                )
            })
            .collect();
        let mut errors = normalize_all(&unknown, self.engine.tag());

        let program = self
            .engine
            .create_program(&[file.to_path_buf()], &EffectiveOptions::new());
        errors.extend(normalize_all(&program.syntactic_diagnostics(), self.engine.tag()));

        Ok(SyntaxValidation {
            is_valid: errors.is_empty(),
            errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_invert_include_declarations() {
        let overrides = TypeCheckRequest::new("/p")
            .with_strict(true)
            .with_include_declarations(true)
            .overrides();
        assert_eq!(overrides.get_bool(CompilerOption::Strict), Some(true));
        assert_eq!(overrides.get_bool(CompilerOption::SkipLibCheck), Some(false));

        let overrides = TypeCheckRequest::new("/p")
            .with_include_declarations(false)
            .overrides();
        assert_eq!(overrides.get_bool(CompilerOption::SkipLibCheck), Some(true));
        assert!(overrides.get(CompilerOption::Strict).is_none());
    }

    #[test]
    fn test_unset_overrides_are_empty() {
        assert!(TypeCheckRequest::new("/p").overrides().is_empty());
    }

    #[test]
    fn test_result_success_follows_errors() {
        let warning = NormalizedDiagnostic {
            severity: crate::diagnostics::Severity::Warning,
            ..NormalizedDiagnostic::synthetic("a.ts", "TS6133", "unused")
        };
        assert!(TypeCheckResult::from_diagnostics(vec![warning]).success);
        assert!(
            !TypeCheckResult::from_diagnostics(vec![NormalizedDiagnostic::synthetic(
                "a.ts", "TS2322", "bad"
            )])
            .success
        );
    }
}
