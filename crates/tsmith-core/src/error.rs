//! Error types for tsmith-core
//!
//! Only failures that end an invocation live here. Compiler diagnostics and
//! configuration-parse errors are values, carried inside result envelopes.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// A single rejected option in a candidate configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Option or key path the issue refers to (e.g. `compilerOptions.target`).
    pub option: String,
    /// Human-readable explanation.
    pub message: String,
}

impl ValidationIssue {
    pub fn new(option: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            option: option.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.option, self.message)
    }
}

/// Errors that end a toolchain operation.
#[derive(Error, Debug)]
pub enum ToolchainError {
    /// The requested source file does not exist
    #[error("Source file not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    /// Project mode was requested but the directory has no configuration file
    #[error("No {file_name} found in project directory {}", dir.display())]
    ProjectConfigNotFound { dir: PathBuf, file_name: String },

    /// A configuration file to update does not exist
    #[error("Configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// Refusing to overwrite an existing configuration file
    #[error("Configuration file already exists: {}", .0.display())]
    ConfigExists(PathBuf),

    /// Candidate configuration failed schema validation; nothing was written
    #[error("Invalid configuration: {}", join_issues(.0))]
    InvalidConfig(Vec<ValidationIssue>),

    /// Malformed request (e.g. both or neither of file/project given)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Filesystem failure with the path it happened on
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File watching could not be set up
    #[error("Watch error: {0}")]
    Watch(String),

    /// JSON (de)serialization failure
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Anything else
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ToolchainError {
    /// Create an I/O error bound to a path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a watch error
    pub fn watch(message: impl Into<String>) -> Self {
        Self::Watch(message.into())
    }

    /// Whether this error belongs to the "not found" class.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::SourceNotFound(_) | Self::ProjectConfigNotFound { .. } | Self::ConfigNotFound(_)
        )
    }
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias for toolchain operations
pub type ToolchainResult<T> = Result<T, ToolchainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_lists_every_issue() {
        let err = ToolchainError::InvalidConfig(vec![
            ValidationIssue::new("compilerOptions.target", "must be one of ES5, ES2020"),
            ValidationIssue::new("compilerOptions.strict", "must be a boolean"),
        ]);
        let message = err.to_string();
        assert!(message.contains("compilerOptions.target: must be one of ES5, ES2020"));
        assert!(message.contains("compilerOptions.strict: must be a boolean"));
    }

    #[test]
    fn test_not_found_class() {
        assert!(ToolchainError::SourceNotFound(PathBuf::from("a.ts")).is_not_found());
        assert!(
            ToolchainError::ProjectConfigNotFound {
                dir: PathBuf::from("/p"),
                file_name: "tsconfig.json".to_string()
            }
            .is_not_found()
        );
        assert!(!ToolchainError::internal("boom").is_not_found());
    }
}
