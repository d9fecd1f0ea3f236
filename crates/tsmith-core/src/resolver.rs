//! Effective configuration resolution.
//!
//! Finds the nearest ambient `tsconfig.json`, parses it through the engine and
//! layers request overrides on top.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::engine::{CompilerEngine, EngineDiagnostic};
use crate::error::{ToolchainError, ToolchainResult};
use crate::fs::FileSystem;
use crate::options::{CompilerOption, EffectiveOptions, OptionSource, layer};

/// Built-in defaults used below any configuration file.
pub fn builtin_defaults() -> EffectiveOptions {
    EffectiveOptions::new()
        .with(CompilerOption::Target, "ES2020")
        .with(CompilerOption::Module, "CommonJS")
}

/// Options for one invocation plus where they came from.
#[derive(Debug, Clone, Default)]
pub struct ResolvedConfig {
    pub options: EffectiveOptions,
    /// Origin of every key in `options`.
    pub origins: BTreeMap<String, OptionSource>,
    /// The configuration file used, if any.
    pub config_path: Option<PathBuf>,
    /// Root files listed by the configuration file.
    pub file_names: Vec<PathBuf>,
    /// Config-parse errors; never fatal.
    pub diagnostics: Vec<EngineDiagnostic>,
}

impl ResolvedConfig {
    pub fn origin(&self, key: &str) -> Option<OptionSource> {
        self.origins.get(key).copied()
    }

    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }
}

/// Resolves effective options for a file or project.
#[derive(Clone)]
pub struct ConfigResolver {
    engine: Arc<dyn CompilerEngine>,
    fs: Arc<dyn FileSystem>,
}

impl ConfigResolver {
    pub fn new(engine: Arc<dyn CompilerEngine>, fs: Arc<dyn FileSystem>) -> Self {
        Self { engine, fs }
    }

    /// Nearest configuration file at or above `start`.
    ///
    /// A file path starts the search at its directory.
    pub fn find_config(&self, start: &Path) -> Option<PathBuf> {
        let dir = if self.fs.is_file(start) {
            start.parent().unwrap_or(start)
        } else {
            start
        };
        let name = self.engine.config_file_name();
        self.fs
            .walk_up_from(dir)
            .into_iter()
            .map(|d| d.join(name))
            .find(|candidate| self.fs.is_file(candidate))
    }

    /// Resolve options for `start` with the ambient configuration, if any.
    pub fn resolve(&self, start: &Path, overrides: &EffectiveOptions) -> ResolvedConfig {
        match self.find_config(start) {
            Some(config_path) => self.resolve_with_config(&config_path, overrides),
            None => {
                tracing::debug!(start = %start.display(), "no ambient configuration, using defaults");
                self.layered(EffectiveOptions::new(), overrides, None, Vec::new(), Vec::new())
            }
        }
    }

    /// Resolve options for a project directory, which must hold a configuration file.
    pub fn resolve_project(
        &self,
        project_dir: &Path,
        overrides: &EffectiveOptions,
    ) -> ToolchainResult<ResolvedConfig> {
        let file_name = self.engine.config_file_name();
        let config_path = project_dir.join(file_name);
        if !self.fs.is_file(&config_path) {
            return Err(ToolchainError::ProjectConfigNotFound {
                dir: project_dir.to_path_buf(),
                file_name: file_name.to_string(),
            });
        }
        Ok(self.resolve_with_config(&config_path, overrides))
    }

    /// Resolve against an explicit configuration file.
    pub fn resolve_with_config(&self, config_path: &Path, overrides: &EffectiveOptions) -> ResolvedConfig {
        tracing::debug!(config = %config_path.display(), "parsing configuration");
        let parsed = self.engine.parse_config(config_path);
        if !parsed.errors.is_empty() {
            tracing::debug!(
                config = %config_path.display(),
                errors = parsed.errors.len(),
                "configuration has errors"
            );
        }
        self.layered(
            parsed.options,
            overrides,
            Some(config_path.to_path_buf()),
            parsed.file_names,
            parsed.errors,
        )
    }

    fn layered(
        &self,
        config: EffectiveOptions,
        overrides: &EffectiveOptions,
        config_path: Option<PathBuf>,
        file_names: Vec<PathBuf>,
        diagnostics: Vec<EngineDiagnostic>,
    ) -> ResolvedConfig {
        let layered = layer(&builtin_defaults(), &config, overrides);
        ResolvedConfig {
            options: layered.options,
            origins: layered.origins,
            config_path,
            file_names,
            diagnostics,
        }
    }
}
