//! Tool settings from tsmith.toml.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tsmith_core::OutputFormat;

/// Settings file names searched for, in order.
const SETTINGS_NAMES: &[&str] = &["tsmith.toml", ".tsmithrc.toml"];

/// Main settings structure.
#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub logging: LoggingSettings,

    #[serde(default)]
    pub output: OutputSettings,

    #[serde(default)]
    pub watch: WatchSettings,

    #[serde(default)]
    pub checker: CheckerSettings,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Deserialize)]
pub struct LoggingSettings {
    /// Filter used when RUST_LOG is unset (e.g. `info`, `tsmith_core=debug`)
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct OutputSettings {
    /// Rendering for diagnostics
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Deserialize)]
pub struct WatchSettings {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CheckerSettings {
    /// tsgo or tsc binary; searched for on PATH when unset
    pub binary: Option<PathBuf>,
}

fn default_level() -> String {
    "warn".to_string()
}

fn default_debounce_ms() -> u64 {
    tsmith_core::watch::DEFAULT_DEBOUNCE_MS
}

impl Settings {
    /// `--verbose` wins over the file.
    pub fn log_filter(&self, verbose: bool) -> &str {
        if verbose { "debug" } else { &self.logging.level }
    }

    /// `--json` wins over the file.
    pub fn output_format(&self, json: bool) -> OutputFormat {
        if json {
            OutputFormat::Json
        } else {
            self.output.format
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.watch.debounce_ms)
    }
}

/// Load settings from an explicit path or the nearest settings file.
///
/// An explicit path must exist; a missing discovered file means defaults.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let settings_path = match path {
        Some(path) => {
            if !path.is_file() {
                anyhow::bail!("Settings file not found: {}", path.display());
            }
            Some(path.to_path_buf())
        }
        None => std::env::current_dir()
            .ok()
            .and_then(|cwd| find_settings_file(&cwd)),
    };

    match settings_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)?;
            let settings: Settings = toml::from_str(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
            tracing::debug!(settings = %path.display(), "loaded settings");
            Ok(settings)
        }
        None => Ok(Settings::default()),
    }
}

/// Search `start` and its ancestors for a settings file.
pub fn find_settings_file(start: &Path) -> Option<PathBuf> {
    start.ancestors().find_map(|dir| {
        SETTINGS_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|candidate| candidate.is_file())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.logging.level, "warn");
        assert_eq!(settings.logging.format, LogFormat::Pretty);
        assert_eq!(settings.output.format, OutputFormat::Text);
        assert_eq!(settings.debounce(), Duration::from_millis(100));
        assert_eq!(settings.checker.binary, None);
    }

    #[test]
    fn test_parse_settings() {
        let toml = r#"
[logging]
level = "info"
format = "json"

[output]
format = "formatted"

[watch]
debounce_ms = 250

[checker]
binary = "node_modules/.bin/tsc"
"#;
        let settings: Settings = toml::from_str(toml).unwrap();
        assert_eq!(settings.logging.level, "info");
        assert_eq!(settings.logging.format, LogFormat::Json);
        assert_eq!(settings.output.format, OutputFormat::Formatted);
        assert_eq!(settings.watch.debounce_ms, 250);
        assert_eq!(
            settings.checker.binary,
            Some(PathBuf::from("node_modules/.bin/tsc"))
        );
    }

    #[test]
    fn test_partial_settings_keep_defaults() {
        let settings: Settings = toml::from_str("[watch]\ndebounce_ms = 10\n").unwrap();
        assert_eq!(settings.logging.level, "warn");
        assert_eq!(settings.output.format, OutputFormat::Text);
        assert_eq!(settings.watch.debounce_ms, 10);
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        assert!(toml::from_str::<Settings>("[logging]\nformat = \"fancy\"\n").is_err());
    }

    #[test]
    fn test_flags_win_over_file() {
        let settings: Settings =
            toml::from_str("[logging]\nlevel = \"error\"\n[output]\nformat = \"text\"\n").unwrap();
        assert_eq!(settings.log_filter(false), "error");
        assert_eq!(settings.log_filter(true), "debug");
        assert_eq!(settings.output_format(false), OutputFormat::Text);
        assert_eq!(settings.output_format(true), OutputFormat::Json);
    }

    #[test]
    fn test_find_settings_in_ancestors() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("a/tsmith.toml"), "").unwrap();

        assert_eq!(
            find_settings_file(&nested),
            Some(dir.path().join("a/tsmith.toml"))
        );
    }

    #[test]
    fn test_explicit_missing_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_settings(Some(&dir.path().join("nope.toml"))).is_err());
    }
}
