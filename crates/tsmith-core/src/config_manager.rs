//! Creation and update of project configuration files.
//!
//! Every write is validated first and is all-or-nothing: an invalid candidate
//! leaves the file on disk exactly as it was.

use serde::Serialize;
use serde_json::{Map, Value, json};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{ToolchainError, ToolchainResult, ValidationIssue};
use crate::fs::FileSystem;
use crate::jsonc;
use crate::options::{CompilerOption, parse_option_value};

/// Configuration written for a new project.
pub fn default_config() -> Value {
    json!({
        "compilerOptions": {
            "target": "ES2020",
            "module": "commonjs",
            "moduleResolution": "node",
            "lib": ["ES2020"],
            "outDir": "./dist",
            "rootDir": "./src",
            "strict": true,
            "esModuleInterop": true,
            "skipLibCheck": true,
            "forceConsistentCasingInFileNames": true,
            "declaration": true,
            "declarationMap": true,
            "sourceMap": true
        },
        "include": ["src/**/*"],
        "exclude": ["node_modules", "dist"]
    })
}

/// Outcome of a successful configuration write.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigWriteResult {
    pub path: PathBuf,
    /// The document as written.
    pub config: Value,
}

/// Validate a whole configuration document.
///
/// Schema options are type- and value-checked; unknown `compilerOptions`
/// keys pass through unchecked.
pub fn validate(config: &Value) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    let Some(root) = config.as_object() else {
        issues.push(ValidationIssue::new("$", "configuration must be a JSON object"));
        return issues;
    };

    match root.get("compilerOptions") {
        None => {}
        Some(Value::Object(options)) => {
            for (key, value) in options {
                if let Some(option) = CompilerOption::from_name(key) {
                    if let Err(e) = parse_option_value(option, value) {
                        issues.push(ValidationIssue::new(
                            format!("compilerOptions.{}", key),
                            e.to_string(),
                        ));
                    }
                }
            }
        }
        Some(_) => issues.push(ValidationIssue::new("compilerOptions", "must be an object")),
    }

    for key in ["include", "exclude", "files"] {
        if let Some(value) = root.get(key) {
            let valid = value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string));
            if !valid {
                issues.push(ValidationIssue::new(key, "must be an array of strings"));
            }
        }
    }

    if let Some(extends) = root.get("extends") {
        if !extends.is_string() {
            issues.push(ValidationIssue::new("extends", "must be a string"));
        }
    }

    issues
}

/// Creates and edits configuration files through the filesystem capability.
#[derive(Clone)]
pub struct ConfigManager {
    fs: Arc<dyn FileSystem>,
    file_name: String,
}

impl ConfigManager {
    pub fn new(fs: Arc<dyn FileSystem>, file_name: impl Into<String>) -> Self {
        Self {
            fs,
            file_name: file_name.into(),
        }
    }

    /// Path of the configuration file for a file-or-directory argument.
    pub fn config_path(&self, path: &Path) -> PathBuf {
        if path.file_name().is_some_and(|n| n == self.file_name.as_str()) || self.fs.is_file(path) {
            path.to_path_buf()
        } else {
            path.join(&self.file_name)
        }
    }

    /// Write a new configuration into `project_dir`.
    ///
    /// `options` are merged over the default `compilerOptions`. Fails with
    /// [`ToolchainError::ConfigExists`] when a file is already there.
    pub fn create_config(
        &self,
        project_dir: &Path,
        options: Option<&Map<String, Value>>,
    ) -> ToolchainResult<ConfigWriteResult> {
        let path = project_dir.join(&self.file_name);
        if self.fs.exists(&path) {
            return Err(ToolchainError::ConfigExists(path));
        }

        let mut config = default_config();
        if let Some(options) = options {
            apply_compiler_options(&mut config, options);
        }

        let issues = validate(&config);
        if !issues.is_empty() {
            return Err(ToolchainError::InvalidConfig(issues));
        }

        self.write(&path, &config)?;
        tracing::info!(config = %path.display(), "created configuration");
        Ok(ConfigWriteResult { path, config })
    }

    /// Apply `options` to the `compilerOptions` of an existing configuration.
    ///
    /// A `null` value removes the key. The merged document is validated as a
    /// whole before anything is written.
    pub fn update_config(
        &self,
        path: &Path,
        options: &Map<String, Value>,
    ) -> ToolchainResult<ConfigWriteResult> {
        let path = self.config_path(path);
        if !self.fs.is_file(&path) {
            return Err(ToolchainError::ConfigNotFound(path));
        }

        let text = self
            .fs
            .read_text(&path)
            .map_err(|e| ToolchainError::io(&path, e))?;
        let mut config = jsonc::parse(&text).map_err(|e| {
            ToolchainError::InvalidConfig(vec![ValidationIssue::new(
                self.file_name.clone(),
                format!("existing file is not valid JSON: {}", e),
            )])
        })?;

        if !config.is_object() {
            return Err(ToolchainError::InvalidConfig(vec![ValidationIssue::new(
                "$",
                "configuration must be a JSON object",
            )]));
        }
        apply_compiler_options(&mut config, options);

        let issues = validate(&config);
        if !issues.is_empty() {
            tracing::debug!(config = %path.display(), issues = issues.len(), "rejected configuration update");
            return Err(ToolchainError::InvalidConfig(issues));
        }

        self.write(&path, &config)?;
        tracing::info!(config = %path.display(), keys = options.len(), "updated configuration");
        Ok(ConfigWriteResult { path, config })
    }

    fn write(&self, path: &Path, config: &Value) -> ToolchainResult<()> {
        let mut content = serde_json::to_string_pretty(config)?;
        content.push('\n');
        self.fs
            .write_text(path, &content)
            .map_err(|e| ToolchainError::io(path, e))
    }
}

fn apply_compiler_options(config: &mut Value, options: &Map<String, Value>) {
    let Some(root) = config.as_object_mut() else {
        return;
    };
    let compiler_options = root
        .entry("compilerOptions")
        .or_insert_with(|| Value::Object(Map::new()));
    if !compiler_options.is_object() {
        // Let validation report the bad shape
        return;
    }
    if let Some(target) = compiler_options.as_object_mut() {
        for (key, value) in options {
            if value.is_null() {
                target.remove(key);
            } else {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}
