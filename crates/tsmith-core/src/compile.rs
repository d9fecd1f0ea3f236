//! Compilation of single files and whole projects.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::blocking::run_engine;
use crate::diagnostics::{
    DiagnosticSummary, NormalizedDiagnostic, has_errors, normalize_all, summarize,
};
use crate::engine::{CompilerEngine, js_path_for};
use crate::error::{ToolchainError, ToolchainResult};
use crate::fs::FileSystem;
use crate::gate::CompileGate;
use crate::options::{CompilerOption, EffectiveOptions};
use crate::resolver::{ConfigResolver, ResolvedConfig};

/// Code for "Could not write file".
pub(crate) const WRITE_FAILED: &str = "TS5033";
/// Code for failures inside the toolchain itself.
pub(crate) const INTERNAL: &str = "internal";

/// What to compile and how.
///
/// Exactly one of `file_path` and `project_path` must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileRequest {
    pub file_path: Option<PathBuf>,
    pub project_path: Option<PathBuf>,
    /// Overrides `outDir`.
    pub output_dir: Option<PathBuf>,
    /// Overrides `sourceMap`.
    pub source_map: Option<bool>,
    #[serde(default)]
    pub watch: bool,
}

/// Validated compile target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileTarget {
    File(PathBuf),
    Project(PathBuf),
}

impl CompileTarget {
    pub fn path(&self) -> &Path {
        match self {
            Self::File(p) | Self::Project(p) => p,
        }
    }
}

impl CompileRequest {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn project(path: impl Into<PathBuf>) -> Self {
        Self {
            project_path: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn with_source_map(mut self, enabled: bool) -> Self {
        self.source_map = Some(enabled);
        self
    }

    pub fn with_watch(mut self, watch: bool) -> Self {
        self.watch = watch;
        self
    }

    pub fn target(&self) -> ToolchainResult<CompileTarget> {
        match (&self.file_path, &self.project_path) {
            (Some(file), None) => Ok(CompileTarget::File(file.clone())),
            (None, Some(project)) => Ok(CompileTarget::Project(project.clone())),
            (Some(_), Some(_)) => Err(ToolchainError::InvalidRequest(
                "specify either filePath or projectPath, not both".to_string(),
            )),
            (None, None) => Err(ToolchainError::InvalidRequest(
                "one of filePath or projectPath is required".to_string(),
            )),
        }
    }

    /// The request-level option layer (`outDir`, `sourceMap`).
    pub fn overrides(&self) -> EffectiveOptions {
        let mut options = EffectiveOptions::new();
        if let Some(dir) = &self.output_dir {
            let dir = absolute(dir);
            options.set(CompilerOption::OutDir, dir.to_string_lossy().into_owned());
        }
        if let Some(source_map) = self.source_map {
            options.set(CompilerOption::SourceMap, source_map);
        }
        options
    }
}

/// A file produced by a compilation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedFile {
    pub path: PathBuf,
    pub content: String,
}

/// Outcome of one compilation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilationResult {
    pub success: bool,
    pub diagnostics: Vec<NormalizedDiagnostic>,
    pub output_files: Vec<GeneratedFile>,
    /// Wall-clock time in whole milliseconds.
    pub duration_ms: u64,
    pub summary: DiagnosticSummary,
}

impl CompilationResult {
    fn new(success: bool, diagnostics: Vec<NormalizedDiagnostic>, output_files: Vec<GeneratedFile>) -> Self {
        let summary = summarize(&diagnostics);
        Self {
            success,
            diagnostics,
            output_files,
            duration_ms: 0,
            summary,
        }
    }

    /// A failed result carrying only `diagnostics`.
    pub fn failed(diagnostics: Vec<NormalizedDiagnostic>) -> Self {
        Self::new(false, diagnostics, Vec::new())
    }
}

/// Drives the engine for compile requests.
#[derive(Clone)]
pub struct CompileOrchestrator {
    engine: Arc<dyn CompilerEngine>,
    fs: Arc<dyn FileSystem>,
    resolver: ConfigResolver,
    gate: CompileGate,
}

impl CompileOrchestrator {
    pub fn new(engine: Arc<dyn CompilerEngine>, fs: Arc<dyn FileSystem>, gate: CompileGate) -> Self {
        let resolver = ConfigResolver::new(engine.clone(), fs.clone());
        Self {
            engine,
            fs,
            resolver,
            gate,
        }
    }

    /// Compile a single file or a project.
    ///
    /// `watch` is not interpreted here; see [`crate::Toolchain::compile`].
    /// Compilations of the same target never overlap.
    pub async fn compile_file(&self, request: &CompileRequest) -> ToolchainResult<CompilationResult> {
        let started = Instant::now();
        let target = request.target()?;

        let _guard = self.gate.acquire(target.path()).await;
        tracing::debug!(target = %target.path().display(), "compiling");

        let this = self.clone();
        let request = request.clone();
        let label = target.path().display().to_string();
        let outcome = run_engine(move || match &target {
            CompileTarget::File(file) => this.compile_single(file, &request),
            CompileTarget::Project(dir) => this.compile_project(dir, &request),
        })
        .await;

        let mut result = match outcome {
            Ok(result) => result?,
            Err(panic) => {
                tracing::error!(target = %label, error = %panic, "engine failed during compilation");
                CompilationResult::failed(vec![NormalizedDiagnostic::synthetic(
                    label,
                    INTERNAL,
                    format!("Internal compiler error: {}", panic),
                )])
            }
        };
        result.duration_ms = started.elapsed().as_millis() as u64;
        Ok(result)
    }

    fn compile_single(&self, file: &Path, request: &CompileRequest) -> ToolchainResult<CompilationResult> {
        if !self.fs.is_file(file) {
            return Err(ToolchainError::SourceNotFound(file.to_path_buf()));
        }

        let resolved = self.resolver.resolve(file, &request.overrides());
        if resolved.has_errors() {
            return Ok(CompilationResult::failed(normalize_all(
                &resolved.diagnostics,
                self.engine.tag(),
            )));
        }

        let source = self
            .fs
            .read_text(file)
            .map_err(|e| ToolchainError::io(file, e))?;
        let output = self
            .engine
            .transpile(&source, &file.display().to_string(), &resolved.options);
        let mut diagnostics = normalize_all(&output.diagnostics, self.engine.tag());

        let Some(code) = output.code else {
            return Ok(CompilationResult::failed(diagnostics));
        };

        let js_path = output_path(file, &resolved);
        let mut files = vec![GeneratedFile {
            path: js_path.clone(),
            content: code,
        }];
        let wants_map = resolved.options.get_bool(CompilerOption::SourceMap) == Some(true);
        if let (true, Some(map)) = (wants_map, output.source_map) {
            let mut map_path = js_path.into_os_string();
            map_path.push(".map");
            files.push(GeneratedFile {
                path: PathBuf::from(map_path),
                content: map,
            });
        }

        let (written, write_ok) = self.write_all(files, &mut diagnostics);
        let success = write_ok && !has_errors(&diagnostics);
        Ok(CompilationResult::new(success, diagnostics, written))
    }

    fn compile_project(&self, dir: &Path, request: &CompileRequest) -> ToolchainResult<CompilationResult> {
        let resolved = self.resolver.resolve_project(dir, &request.overrides())?;
        if resolved.has_errors() {
            return Ok(CompilationResult::failed(normalize_all(
                &resolved.diagnostics,
                self.engine.tag(),
            )));
        }

        tracing::debug!(
            project = %dir.display(),
            files = resolved.file_names.len(),
            "building program"
        );
        let program = self
            .engine
            .create_program(&resolved.file_names, &resolved.options);
        let mut diagnostics = normalize_all(&program.pre_emit_diagnostics(), self.engine.tag());

        let emitted = program.emit();
        diagnostics.extend(normalize_all(&emitted.diagnostics, self.engine.tag()));

        let files = emitted
            .files
            .into_iter()
            .map(|f| GeneratedFile {
                path: f.path,
                content: f.content,
            })
            .collect();
        let (written, write_ok) = self.write_all(files, &mut diagnostics);

        let success = !emitted.emit_skipped && write_ok && !has_errors(&diagnostics);
        Ok(CompilationResult::new(success, diagnostics, written))
    }

    /// Write files in order, stopping at the first failure.
    fn write_all(
        &self,
        files: Vec<GeneratedFile>,
        diagnostics: &mut Vec<NormalizedDiagnostic>,
    ) -> (Vec<GeneratedFile>, bool) {
        let mut written = Vec::with_capacity(files.len());
        for file in files {
            if let Err(e) = self.fs.write_text(&file.path, &file.content) {
                tracing::warn!(file = %file.path.display(), error = %e, "failed to write output");
                diagnostics.push(NormalizedDiagnostic::synthetic(
                    file.path.display().to_string(),
                    WRITE_FAILED,
                    format!("Could not write file '{}': {}.", file.path.display(), e),
                ));
                return (written, false);
            }
            written.push(file);
        }
        (written, true)
    }
}

/// Where the JavaScript for `file` goes: under the effective `outDir`, else
/// next to the source.
fn output_path(file: &Path, resolved: &ResolvedConfig) -> PathBuf {
    let js = js_path_for(file);
    let Some(out_dir) = resolved.options.get_str(CompilerOption::OutDir) else {
        return js;
    };

    let out_dir = Path::new(out_dir);
    let out_dir = match (&resolved.config_path, out_dir.is_absolute()) {
        (_, true) => out_dir.to_path_buf(),
        (Some(config), false) => config
            .parent()
            .map(|dir| dir.join(out_dir))
            .unwrap_or_else(|| out_dir.to_path_buf()),
        (None, false) => absolute(out_dir),
    };

    match js.file_name() {
        Some(name) => out_dir.join(name),
        None => js,
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
