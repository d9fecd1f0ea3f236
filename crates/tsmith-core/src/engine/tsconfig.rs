//! tsconfig.json parsing for the swc engine.
//!
//! Reads the file (tolerating comments and trailing commas), follows the
//! `extends` chain, extracts typed compiler options and enumerates root files.
//! Problems are returned as TS-coded engine diagnostics.

use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use super::{EngineDiagnostic, ParsedConfig, SourceFile};
use crate::options::{CompilerOption, EffectiveOptions, OptionKind};

/// Extensions treated as TypeScript sources.
pub const SOURCE_EXTENSIONS: &[&str] = &["ts", "tsx", "mts", "cts"];

const DEFAULT_INCLUDE: &str = "**/*";
const DEFAULT_EXCLUDE: &[&str] = &["node_modules", "bower_components", "jspm_packages"];

/// Raw structure of a tsconfig.json after `extends` resolution.
///
/// `compilerOptions` stays a JSON object so unknown keys survive; typed
/// extraction happens in [`parse_config_file`].
#[derive(Debug, Clone, Default)]
pub struct TsConfigJson {
    pub compiler_options: Map<String, Value>,
    pub include: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
    pub files: Option<Vec<String>>,
    pub extends: Option<String>,
    /// Directory that `include` / `exclude` / `files` are relative to.
    pub spec_dir: PathBuf,
}

/// Why a config text could not be read as JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub message: String,
    /// 1-based; `0` when unknown.
    pub line: usize,
    pub column: usize,
}

/// Failure to load a configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigReadError {
    Unreadable { path: PathBuf, message: String },
    Syntax { path: PathBuf, text: String, failure: ParseFailure },
    Extends { path: PathBuf, extends: String },
    Circular { path: PathBuf },
}

impl ConfigReadError {
    /// Convert into the engine diagnostic TypeScript would report.
    pub fn into_diagnostic(self) -> EngineDiagnostic {
        match self {
            Self::Unreadable { path, message } => EngineDiagnostic::global(
                5083,
                format!("Cannot read file '{}': {}.", path.display(), message),
            ),
            Self::Syntax { path, text, failure } => {
                let file = Arc::new(SourceFile::new(path.display().to_string(), text));
                let offset = if failure.line > 0 {
                    file.offset_of(failure.line as u32 - 1, failure.column.saturating_sub(1) as u32)
                } else {
                    None
                };
                match offset {
                    Some(start) => EngineDiagnostic::at(file, start, 1, 1005, failure.message),
                    None => {
                        let mut d = EngineDiagnostic::global(1005, failure.message);
                        d.file = Some(file);
                        d
                    }
                }
            }
            Self::Extends { path, extends } => EngineDiagnostic::global(
                6053,
                format!(
                    "File '{}' not found (extended from '{}').",
                    extends,
                    path.display()
                ),
            ),
            Self::Circular { path } => EngineDiagnostic::global(
                18000,
                format!(
                    "Circularity detected while resolving configuration: {}",
                    path.display()
                ),
            ),
        }
    }
}

impl TsConfigJson {
    /// Parse tsconfig.json text.
    pub fn parse(content: &str) -> Result<Self, ParseFailure> {
        let value: Value = crate::jsonc::parse(content).map_err(|e| ParseFailure {
            message: e.to_string(),
            line: e.line(),
            column: e.column(),
        })?;

        let Value::Object(mut root) = value else {
            return Err(shape("The root value of a 'tsconfig.json' file must be an object."));
        };

        let compiler_options = match root.remove("compilerOptions") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => return Err(shape("'compilerOptions' must be an object.")),
        };

        Ok(Self {
            compiler_options,
            include: string_list(&mut root, "include")?,
            exclude: string_list(&mut root, "exclude")?,
            files: string_list(&mut root, "files")?,
            extends: match root.remove("extends") {
                None | Some(Value::Null) => None,
                Some(Value::String(s)) => Some(s),
                Some(_) => return Err(shape("'extends' must be a string.")),
            },
            spec_dir: PathBuf::new(),
        })
    }

    /// Load one file without following `extends`.
    ///
    /// Relative path options are made absolute against the file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigReadError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigReadError::Unreadable {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let mut config = Self::parse(&text).map_err(|failure| ConfigReadError::Syntax {
            path: path.to_path_buf(),
            text: text.clone(),
            failure,
        })?;

        let dir = config_dir(path);
        absolutize_path_options(&mut config.compiler_options, &dir);
        config.spec_dir = dir;
        Ok(config)
    }

    /// Load a file and every configuration it extends; the extending file wins.
    pub fn load_with_extends(path: &Path) -> Result<Self, ConfigReadError> {
        let mut visited = HashSet::new();
        Self::load_chain(path, &mut visited)
    }

    /// Whether any of `include`, `exclude` or `files` is set.
    pub fn has_specs(&self) -> bool {
        self.include.is_some() || self.exclude.is_some() || self.files.is_some()
    }

    fn load_chain(path: &Path, visited: &mut HashSet<PathBuf>) -> Result<Self, ConfigReadError> {
        let key = normalize_path(path);
        if !visited.insert(key.clone()) {
            return Err(ConfigReadError::Circular { path: key });
        }

        let mut config = Self::load(path)?;
        if let Some(extends) = config.extends.take() {
            let base_dir = config_dir(path);
            let base_path =
                resolve_extends_path(&base_dir, &extends).ok_or_else(|| ConfigReadError::Extends {
                    path: path.to_path_buf(),
                    extends: extends.clone(),
                })?;
            tracing::debug!(config = %path.display(), base = %base_path.display(), "resolving extends");
            let base = Self::load_chain(&base_path, visited)?;
            config = merge_configs(base, config);
        }
        Ok(config)
    }
}

fn shape(message: &str) -> ParseFailure {
    ParseFailure {
        message: message.to_string(),
        line: 0,
        column: 0,
    }
}

fn string_list(root: &mut Map<String, Value>, key: &str) -> Result<Option<Vec<String>>, ParseFailure> {
    match root.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|v| match v {
                Value::String(s) => Ok(s),
                _ => Err(shape(&format!("'{}' must be an array of strings.", key))),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some(_) => Err(shape(&format!("'{}' must be an array of strings.", key))),
    }
}

fn config_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn absolutize_path_options(options: &mut Map<String, Value>, dir: &Path) {
    for option in CompilerOption::ALL {
        if option.kind() != OptionKind::Path {
            continue;
        }
        if let Some(Value::String(raw)) = options.get_mut(option.name()) {
            let joined = normalize_path(&dir.join(raw.as_str()));
            *raw = joined.to_string_lossy().into_owned();
        }
    }
}

/// Resolve `.` and `..` components without touching the disk.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolve the path from an "extends" field.
fn resolve_extends_path(base_dir: &Path, extends: &str) -> Option<PathBuf> {
    if extends.starts_with('.') || Path::new(extends).is_absolute() {
        let path = base_dir.join(extends);
        if path.is_file() {
            return Some(path);
        }
        let with_ext = base_dir.join(format!("{}.json", extends));
        return with_ext.is_file().then_some(with_ext);
    }

    // Package reference, looked up in node_modules of every ancestor
    for dir in base_dir.ancestors() {
        let package = dir.join("node_modules").join(extends);
        if package.is_file() {
            return Some(package);
        }
        let with_ext = dir.join("node_modules").join(format!("{}.json", extends));
        if with_ext.is_file() {
            return Some(with_ext);
        }
        let nested = package.join("tsconfig.json");
        if nested.is_file() {
            return Some(nested);
        }
    }
    None
}

/// Merge two configs (base is overridden by overlay).
fn merge_configs(base: TsConfigJson, overlay: TsConfigJson) -> TsConfigJson {
    let overlay_has_specs = overlay.has_specs();
    let base_has_specs = base.has_specs();
    let mut compiler_options = base.compiler_options;
    for (key, value) in overlay.compiler_options {
        compiler_options.insert(key, value);
    }

    // Specs stay relative to the file that wrote them; the default `**/*`
    // belongs to the extending file
    let spec_dir = if !overlay_has_specs && base_has_specs {
        base.spec_dir
    } else {
        overlay.spec_dir
    };

    TsConfigJson {
        compiler_options,
        include: overlay.include.or(base.include),
        exclude: overlay.exclude.or(base.exclude),
        files: overlay.files.or(base.files),
        extends: None,
        spec_dir,
    }
}

/// Parse a configuration file into options, root files and errors.
pub fn parse_config_file(path: &Path) -> ParsedConfig {
    let config = match TsConfigJson::load_with_extends(path) {
        Ok(config) => config,
        Err(e) => {
            return ParsedConfig {
                errors: vec![e.into_diagnostic()],
                ..Default::default()
            };
        }
    };

    let (options, option_errors) = EffectiveOptions::from_json_map(&config.compiler_options);

    // Option errors point at the key when the top-level file sets it;
    // values inherited through `extends` get no location
    let top_text = std::fs::read_to_string(path).unwrap_or_default();
    let top_keys = TsConfigJson::parse(&top_text)
        .map(|top| top.compiler_options)
        .unwrap_or_default();
    let top_file = Arc::new(SourceFile::new(path.display().to_string(), top_text));
    let mut errors: Vec<EngineDiagnostic> = option_errors
        .iter()
        .map(|e| {
            let code = match e {
                crate::options::OptionError::WrongType { .. } => 5024,
                crate::options::OptionError::NotAllowed { .. } => 6046,
            };
            let name = e.option().name();
            let located = top_keys
                .contains_key(name)
                .then(|| option_key_offset(top_file.text(), name))
                .flatten();
            match located {
                Some((at, len)) => {
                    EngineDiagnostic::at(top_file.clone(), at, len, code, e.to_string())
                }
                None => EngineDiagnostic::global(code, e.to_string()),
            }
        })
        .collect();

    let (file_names, enumeration_errors) = enumerate_files(&config, &options, path);
    errors.extend(enumeration_errors);

    ParsedConfig {
        options,
        file_names,
        errors,
    }
}

/// Byte offset and length of `"name"` inside the `compilerOptions` object.
fn option_key_offset(text: &str, name: &str) -> Option<(u32, u32)> {
    let section = text.find("\"compilerOptions\"")?;
    let needle = format!("\"{}\"", name);
    let at = text[section..].find(&needle)? + section;
    Some((at as u32, needle.len() as u32))
}

/// Root files selected by `files`, or by `include` minus `exclude`.
fn enumerate_files(
    config: &TsConfigJson,
    options: &EffectiveOptions,
    config_path: &Path,
) -> (Vec<PathBuf>, Vec<EngineDiagnostic>) {
    let base = &config.spec_dir;
    let mut errors = Vec::new();
    let mut found = Vec::new();

    if let Some(files) = &config.files {
        for name in files {
            let path = normalize_path(&base.join(name));
            if path.is_file() {
                found.push(path);
            } else {
                errors.push(EngineDiagnostic::global(
                    6053,
                    format!("File '{}' not found.", path.display()),
                ));
            }
        }
        if config.include.is_none() {
            return (found, errors);
        }
    }

    let include: Vec<String> = config
        .include
        .clone()
        .unwrap_or_else(|| vec![DEFAULT_INCLUDE.to_string()]);
    let mut exclude: Vec<String> = config.exclude.clone().unwrap_or_else(|| {
        DEFAULT_EXCLUDE.iter().map(|s| s.to_string()).collect()
    });
    if config.exclude.is_none() {
        if let Some(out_dir) = options.get_str(CompilerOption::OutDir) {
            if let Ok(rel) = Path::new(out_dir).strip_prefix(base) {
                exclude.push(to_slash(rel));
            }
        }
    }

    let include_patterns = compile_patterns(&include, false);
    let exclude_patterns = compile_patterns(&exclude, true);
    let match_options = glob::MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };
    let is_excluded = |rel: &str| {
        exclude_patterns
            .iter()
            .any(|p| p.matches_with(rel, match_options))
    };

    let walker = WalkDir::new(base)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || entry
                    .path()
                    .strip_prefix(base)
                    .map(|rel| !is_excluded(&to_slash(rel)))
                    .unwrap_or(true)
        });

    for entry in walker.filter_map(Result::ok) {
        if !entry.file_type().is_file() || !is_source_file(entry.path()) {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(base) else {
            continue;
        };
        let rel = to_slash(rel);
        if include_patterns
            .iter()
            .any(|p| p.matches_with(&rel, match_options))
        {
            let path = normalize_path(entry.path());
            if !found.contains(&path) {
                found.push(path);
            }
        }
    }

    if found.is_empty() && errors.is_empty() {
        errors.push(EngineDiagnostic::global(
            18003,
            format!(
                "No inputs were found in config file '{}'. Specified 'include' paths were '{:?}' and 'exclude' paths were '{:?}'.",
                config_path.display(),
                include,
                exclude
            ),
        ));
    }

    (found, errors)
}

/// Compile glob specs. Specs without a wildcard also match everything below
/// them, so `src` behaves like `src/**/*`.
fn compile_patterns(specs: &[String], exclude: bool) -> Vec<glob::Pattern> {
    let mut patterns = Vec::new();
    for spec in specs {
        let spec = spec.trim_start_matches("./").trim_end_matches('/');
        let has_wildcard = spec.contains(['*', '?', '[']);
        let mut variants = vec![spec.to_string()];
        if !has_wildcard || exclude {
            variants.push(format!("{}/**/*", spec));
        }
        for variant in variants {
            match glob::Pattern::new(&variant) {
                Ok(p) => patterns.push(p),
                Err(e) => tracing::debug!(pattern = %variant, error = %e, "ignoring invalid glob"),
            }
        }
    }
    patterns
}

/// Whether `path` has a TypeScript source extension (`.d.ts` included).
pub fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}

/// Whether `path` is a declaration file.
pub fn is_declaration_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| {
            n.ends_with(".d.ts") || n.ends_with(".d.mts") || n.ends_with(".d.cts")
        })
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
