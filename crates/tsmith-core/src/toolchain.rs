//! The operation surface.

use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::check::{SyntaxValidation, TypeCheckOrchestrator, TypeCheckRequest, TypeCheckResult};
use crate::compile::{CompilationResult, CompileOrchestrator, CompileRequest, CompileTarget};
use crate::config_manager::{ConfigManager, ConfigWriteResult};
use crate::engine::{CompilerEngine, default_engine};
use crate::error::ToolchainResult;
use crate::fs::{FileSystem, StdFileSystem};
use crate::gate::CompileGate;
use crate::watch::{FileWatcher, NotifyWatcher, WatchAck, WatchReport, WatchSessionManager};

/// Result of [`Toolchain::compile`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CompileOutcome {
    /// The compilation ran to completion.
    Completed(CompilationResult),
    /// A watch session was set up; recompiles are reported separately.
    Watching(WatchAck),
}

/// Wires the orchestrators, configuration manager and watch sessions to one
/// engine, filesystem and watcher.
pub struct Toolchain {
    compiler: CompileOrchestrator,
    checker: TypeCheckOrchestrator,
    config: ConfigManager,
    watch: WatchSessionManager,
}

impl Toolchain {
    pub fn new(
        engine: Arc<dyn CompilerEngine>,
        fs: Arc<dyn FileSystem>,
        watcher: Arc<dyn FileWatcher>,
    ) -> Self {
        let compiler = CompileOrchestrator::new(engine.clone(), fs.clone(), CompileGate::new());
        let checker = TypeCheckOrchestrator::new(engine.clone(), fs.clone());
        let config = ConfigManager::new(fs.clone(), engine.config_file_name());
        let watch = WatchSessionManager::new(watcher, fs, compiler.clone());
        Self {
            compiler,
            checker,
            config,
            watch,
        }
    }

    /// Default engine (see [`default_engine`]), real filesystem and `notify` watcher.
    pub fn with_defaults() -> Self {
        Self::with_debounce(Duration::from_millis(crate::watch::DEFAULT_DEBOUNCE_MS))
    }

    /// Like [`with_defaults`](Self::with_defaults) with a custom watch debounce.
    pub fn with_debounce(debounce: Duration) -> Self {
        Self::with_engine(default_engine(None), debounce)
    }

    /// `engine` on the real filesystem with a `notify` watcher.
    pub fn with_engine(engine: Arc<dyn CompilerEngine>, debounce: Duration) -> Self {
        Self::new(
            engine,
            Arc::new(StdFileSystem),
            Arc::new(NotifyWatcher::new(debounce)),
        )
    }

    /// Compile a file or project, or start watching a file.
    ///
    /// With `watch` set and a `file_path`, this returns as soon as the session
    /// is registered. Projects are not watched; they compile once.
    pub async fn compile(&self, request: &CompileRequest) -> ToolchainResult<CompileOutcome> {
        let target = request.target()?;
        if request.watch {
            match target {
                CompileTarget::File(_) => {
                    return Ok(CompileOutcome::Watching(self.watch.watch(request)?));
                }
                CompileTarget::Project(dir) => {
                    tracing::warn!(
                        project = %dir.display(),
                        "watch mode applies to single files; compiling project once"
                    );
                }
            }
        }
        let result = self.compiler.compile_file(request).await?;
        Ok(CompileOutcome::Completed(result))
    }

    pub async fn check_types(&self, request: &TypeCheckRequest) -> ToolchainResult<TypeCheckResult> {
        self.checker.check_types(request).await
    }

    pub async fn get_diagnostics(&self, request: &TypeCheckRequest) -> ToolchainResult<String> {
        self.checker.get_diagnostics(request).await
    }

    pub async fn validate_syntax(&self, file: &Path) -> ToolchainResult<SyntaxValidation> {
        self.checker.validate_syntax(file).await
    }

    pub fn create_config(
        &self,
        project_dir: &Path,
        options: Option<&Map<String, Value>>,
    ) -> ToolchainResult<ConfigWriteResult> {
        self.config.create_config(project_dir, options)
    }

    pub fn update_config(
        &self,
        path: &Path,
        options: &Map<String, Value>,
    ) -> ToolchainResult<ConfigWriteResult> {
        self.config.update_config(path, options)
    }

    /// Stop watching `path`. Returns whether a session was active.
    pub fn stop_watching(&self, path: &Path) -> bool {
        self.watch.stop(path)
    }

    pub fn watch_reports(&self) -> broadcast::Receiver<WatchReport> {
        self.watch.subscribe_reports()
    }

    pub fn active_watch_sessions(&self) -> Vec<PathBuf> {
        self.watch.active_sessions()
    }

    /// Close every watch session. Safe to call more than once.
    pub fn shutdown(&self) -> usize {
        let stopped = self.watch.stop_all();
        if stopped > 0 {
            tracing::info!(sessions = stopped, "closed watch sessions");
        }
        stopped
    }
}
