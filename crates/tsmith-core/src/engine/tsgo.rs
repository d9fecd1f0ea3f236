//! Semantic type checking through an external checker binary.
//!
//! `tsgo` (TypeScript's native compiler) is preferred, `tsc` is the fallback.
//! The checker runs with `--noEmit` against a synthetic tsconfig that lists
//! the program's root files and the already resolved options; its
//! `--pretty false` output is mapped back to engine diagnostics.
//!
//! Parsing, transpiling and emit stay with [`SwcEngine`].

use regex::Regex;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, OnceLock};

use super::tsconfig::normalize_path;
use super::{
    CompilerEngine, DiagnosticCategory, EmitResult, EngineDiagnostic, MessageChain, MessageText,
    ParsedConfig, Program, SourceFile, SwcEngine, SyntaxTree, TranspileOutput,
};
use crate::options::EffectiveOptions;

/// Checker binaries looked up on PATH, in order.
const CHECKER_BINARIES: &[&str] = &["tsgo", "tsc"];

/// Options that only affect emit. The checker never emits, and some of
/// them conflict with `noEmit`.
const EMIT_ONLY: &[&str] = &[
    "outDir",
    "outFile",
    "rootDir",
    "declaration",
    "declarationDir",
    "declarationMap",
    "emitDeclarationOnly",
    "sourceMap",
    "inlineSourceMap",
    "composite",
    "incremental",
    "tsBuildInfoFile",
    "noEmitOnError",
];

/// [`CompilerEngine`] that adds semantic diagnostics from `tsgo` or `tsc`.
#[derive(Debug, Clone)]
pub struct TsgoEngine {
    binary: PathBuf,
    syntax: SwcEngine,
}

impl TsgoEngine {
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            syntax: SwcEngine::new(),
        }
    }

    /// Find `tsgo` or `tsc` on PATH.
    pub fn locate() -> Option<Self> {
        let binary = CHECKER_BINARIES
            .iter()
            .find_map(|name| which::which(name).ok())?;
        tracing::debug!(checker = %binary.display(), "found type checker");
        Some(Self::with_binary(binary))
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

impl CompilerEngine for TsgoEngine {
    fn parse_config(&self, path: &Path) -> ParsedConfig {
        self.syntax.parse_config(path)
    }

    fn create_program(&self, root_files: &[PathBuf], options: &EffectiveOptions) -> Box<dyn Program> {
        Box::new(TsgoProgram {
            syntax: self.syntax.create_program(root_files, options),
            binary: self.binary.clone(),
            options: options.clone(),
            semantic: OnceLock::new(),
        })
    }

    fn transpile(&self, source: &str, file_name: &str, options: &EffectiveOptions) -> TranspileOutput {
        self.syntax.transpile(source, file_name, options)
    }

    fn parse_syntax_tree(&self, source: &str, file_name: &str) -> SyntaxTree {
        self.syntax.parse_syntax_tree(source, file_name)
    }
}

struct TsgoProgram {
    syntax: Box<dyn Program>,
    binary: PathBuf,
    options: EffectiveOptions,
    /// Checker outcome, computed once on first use.
    semantic: OnceLock<Result<Vec<EngineDiagnostic>, String>>,
}

impl TsgoProgram {
    fn semantic(&self) -> &Result<Vec<EngineDiagnostic>, String> {
        self.semantic
            .get_or_init(|| run_checker(&self.binary, self.syntax.root_files(), &self.options))
    }
}

impl Program for TsgoProgram {
    fn root_files(&self) -> &[PathBuf] {
        self.syntax.root_files()
    }

    fn pre_emit_diagnostics(&self) -> Vec<EngineDiagnostic> {
        let mut diagnostics = self.syntax.pre_emit_diagnostics();
        // The checker repeats parse errors, so it only runs on clean sources
        if !diagnostics.is_empty() {
            return diagnostics;
        }
        match self.semantic() {
            Ok(semantic) => diagnostics.extend(semantic.iter().cloned()),
            Err(reason) => tracing::warn!(error = %reason, "type checker did not run"),
        }
        diagnostics
    }

    fn syntactic_diagnostics(&self) -> Vec<EngineDiagnostic> {
        self.syntax.syntactic_diagnostics()
    }

    fn emit(&self) -> EmitResult {
        let no_emit_on_error = self
            .options
            .passthrough()
            .get("noEmitOnError")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if no_emit_on_error && !self.pre_emit_diagnostics().is_empty() {
            return EmitResult {
                emit_skipped: true,
                ..Default::default()
            };
        }
        self.syntax.emit()
    }

    fn unchecked_reason(&self) -> Option<String> {
        match self.semantic.get() {
            Some(Err(reason)) => Some(reason.clone()),
            _ => None,
        }
    }
}

/// Run the checker over `root_files` and collect what it reports.
fn run_checker(
    binary: &Path,
    root_files: &[PathBuf],
    options: &EffectiveOptions,
) -> Result<Vec<EngineDiagnostic>, String> {
    let Some(first) = root_files.first() else {
        return Ok(Vec::new());
    };
    let cwd = first
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let temp_dir =
        tempfile::tempdir().map_err(|e| format!("failed to create temp directory: {}", e))?;
    let config_path = temp_dir.path().join("tsconfig.json");
    let config = synthetic_config(root_files, options, &cwd);
    std::fs::write(&config_path, config.to_string())
        .map_err(|e| format!("failed to write {}: {}", config_path.display(), e))?;

    tracing::debug!(
        checker = %binary.display(),
        files = root_files.len(),
        "running type checker"
    );
    let output = Command::new(binary)
        .arg("--project")
        .arg(&config_path)
        .args(["--pretty", "false"])
        .current_dir(&cwd)
        .output()
        .map_err(|e| format!("failed to run {}: {}", binary.display(), e))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let diagnostics = parse_checker_output(&stdout, &cwd);
    if diagnostics.is_empty() && !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = stderr
            .lines()
            .chain(stdout.lines())
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("no output");
        return Err(format!(
            "{} exited with {}: {}",
            binary.display(),
            output.status,
            detail
        ));
    }
    Ok(diagnostics)
}

/// tsconfig handed to the checker: resolved options minus emit settings,
/// `noEmit` on, and the root files listed explicitly.
pub fn synthetic_config(root_files: &[PathBuf], options: &EffectiveOptions, search_from: &Path) -> Value {
    let mut compiler_options: Map<String, Value> = options
        .to_json_map()
        .into_iter()
        .filter(|(key, _)| !EMIT_ONLY.contains(&key.as_str()))
        .collect();
    compiler_options.insert("noEmit".to_string(), Value::Bool(true));

    // The config lives in a temp dir, so default type roots would miss the project
    if !compiler_options.contains_key("typeRoots") {
        let roots = type_roots(search_from);
        if !roots.is_empty() {
            compiler_options.insert("typeRoots".to_string(), json!(roots));
        }
    }

    let files: Vec<String> = root_files
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect();
    json!({
        "compilerOptions": compiler_options,
        "files": files,
    })
}

/// Every `node_modules/@types` directory from `start` upwards.
fn type_roots(start: &Path) -> Vec<String> {
    start
        .ancestors()
        .map(|dir| dir.join("node_modules").join("@types"))
        .filter(|dir| dir.is_dir())
        .map(|dir| dir.to_string_lossy().into_owned())
        .collect()
}

fn located_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(.+)\((\d+),(\d+)\): (error|warning|message|suggestion) TS(\d+): (.*)$")
            .expect("valid regex")
    })
}

fn global_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(error|warning|message|suggestion) TS(\d+): (.*)$").expect("valid regex")
    })
}

/// One diagnostic as printed, before positions are resolved.
struct Reported {
    location: Option<(PathBuf, u32, u32)>,
    category: DiagnosticCategory,
    code: u32,
    head: String,
    /// Indented continuation lines: (indent depth, text).
    details: Vec<(usize, String)>,
}

/// Parse `--pretty false` checker output. Relative paths resolve against `cwd`.
///
/// Indented lines continue the previous diagnostic and become its message
/// chain; anything else is ignored.
pub fn parse_checker_output(output: &str, cwd: &Path) -> Vec<EngineDiagnostic> {
    let mut reported: Vec<Reported> = Vec::new();

    for line in output.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        if line.starts_with(char::is_whitespace) {
            if let Some(last) = reported.last_mut() {
                let indent = line.len() - line.trim_start().len();
                last.details.push((indent / 2, line.trim_start().to_string()));
            }
            continue;
        }

        if let Some(caps) = located_pattern().captures(line) {
            let (Ok(line_no), Ok(column), Ok(code)) =
                (caps[2].parse::<u32>(), caps[3].parse::<u32>(), caps[5].parse::<u32>())
            else {
                continue;
            };
            reported.push(Reported {
                location: Some((normalize_path(&cwd.join(&caps[1])), line_no, column)),
                category: category(&caps[4]),
                code,
                head: caps[6].to_string(),
                details: Vec::new(),
            });
        } else if let Some(caps) = global_pattern().captures(line) {
            let Ok(code) = caps[2].parse::<u32>() else {
                continue;
            };
            reported.push(Reported {
                location: None,
                category: category(&caps[1]),
                code,
                head: caps[3].to_string(),
                details: Vec::new(),
            });
        }
    }

    let mut files: HashMap<PathBuf, Arc<SourceFile>> = HashMap::new();
    reported
        .into_iter()
        .map(|r| {
            let message = message_text(r.head, &r.details);
            let mut diagnostic = match r.location {
                Some((path, line, column)) => {
                    let file = files
                        .entry(path.clone())
                        .or_insert_with(|| {
                            let text = std::fs::read_to_string(&path).unwrap_or_default();
                            Arc::new(SourceFile::new(path.display().to_string(), text))
                        })
                        .clone();
                    match file.offset_of(line.saturating_sub(1), column.saturating_sub(1)) {
                        Some(start) => EngineDiagnostic::at(file, start, 1, r.code, message),
                        None => {
                            let mut d = EngineDiagnostic::global(r.code, message);
                            d.file = Some(file);
                            d
                        }
                    }
                }
                None => EngineDiagnostic::global(r.code, message),
            };
            diagnostic.category = r.category;
            diagnostic
        })
        .collect()
}

fn category(name: &str) -> DiagnosticCategory {
    match name {
        "warning" => DiagnosticCategory::Warning,
        "message" => DiagnosticCategory::Message,
        "suggestion" => DiagnosticCategory::Suggestion,
        _ => DiagnosticCategory::Error,
    }
}

/// Plain text, or a chain nested by indentation depth.
fn message_text(head: String, details: &[(usize, String)]) -> MessageText {
    if details.is_empty() {
        return MessageText::Text(head);
    }

    let mut stack: Vec<(usize, MessageChain)> = vec![(0, MessageChain::new(head))];
    for (depth, text) in details {
        let depth = (*depth).max(1);
        fold_until(&mut stack, depth);
        stack.push((depth, MessageChain::new(text.clone())));
    }
    fold_until(&mut stack, 1);
    match stack.pop() {
        Some((_, chain)) => MessageText::Chain(chain),
        None => MessageText::Text(String::new()),
    }
}

/// Attach finished entries at `depth` or deeper to their parents.
fn fold_until(stack: &mut Vec<(usize, MessageChain)>, depth: usize) {
    while stack.len() > 1 && stack.last().is_some_and(|(d, _)| *d >= depth) {
        if let Some((_, done)) = stack.pop()
            && let Some((_, parent)) = stack.last_mut()
        {
            parent.next.push(done);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{flatten_message, normalize_all};
    use crate::options::CompilerOption;

    #[test]
    fn test_parse_located_and_global_lines() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("add.ts"),
            "function add(a: number, b: number): number { return a + b; }\nadd(\"5\", 3);\n",
        )
        .unwrap();
        let output = "add.ts(2,5): error TS2345: Argument of type 'string' is not assignable to parameter of type 'number'.\n\
                      error TS5023: Unknown compiler option 'bogus'.\n";

        let diagnostics = normalize_all(&parse_checker_output(output, dir.path()), "TS");

        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].code, "TS2345");
        assert_eq!((diagnostics[0].line, diagnostics[0].column), (2, 5));
        assert!(diagnostics[0].file.ends_with("add.ts"));
        assert_eq!(diagnostics[1].code, "TS5023");
        assert_eq!((diagnostics[1].line, diagnostics[1].column), (0, 0));
        assert_eq!(diagnostics[1].file, "");
    }

    #[test]
    fn test_continuation_lines_build_a_chain() {
        let output = "error TS2322: Type '{ a: string; }' is not assignable to type 'T'.\n  \
                      Types of property 'a' are incompatible.\n    \
                      Type 'string' is not assignable to type 'number'.\n";
        let diagnostics = parse_checker_output(output, Path::new("/"));

        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            flatten_message(&diagnostics[0].message),
            "Type '{ a: string; }' is not assignable to type 'T'.\n  \
             Types of property 'a' are incompatible.\n    \
             Type 'string' is not assignable to type 'number'."
        );
    }

    #[test]
    fn test_categories_and_noise() {
        let output = "Version 5.6.2\n\
                      warning TS6385: 'importsNotUsedAsValues' is deprecated.\n\
                      \n\
                      Found 1 error.\n";
        let diagnostics = parse_checker_output(output, Path::new("/"));

        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].category, DiagnosticCategory::Warning);
        assert_eq!(diagnostics[0].code, 6385);
    }

    #[test]
    fn test_unreadable_file_keeps_name_without_position() {
        let diagnostics =
            parse_checker_output("gone.ts(3,1): error TS2304: Cannot find name 'x'.", Path::new("/p"));
        let normalized = normalize_all(&diagnostics, "TS");
        assert_eq!(normalized[0].file, "/p/gone.ts");
        assert_eq!((normalized[0].line, normalized[0].column), (0, 0));
    }

    #[test]
    fn test_synthetic_config_drops_emit_options() {
        let options = EffectiveOptions::new()
            .with(CompilerOption::Strict, true)
            .with(CompilerOption::OutDir, "/p/dist")
            .with(CompilerOption::SourceMap, true)
            .with(CompilerOption::Target, "ES2022");
        let dir = tempfile::tempdir().unwrap();
        let config = synthetic_config(&[dir.path().join("a.ts")], &options, dir.path());

        let compiler_options = config["compilerOptions"].as_object().unwrap();
        assert_eq!(compiler_options["strict"], true);
        assert_eq!(compiler_options["target"], "ES2022");
        assert_eq!(compiler_options["noEmit"], true);
        assert!(!compiler_options.contains_key("outDir"));
        assert!(!compiler_options.contains_key("sourceMap"));
        assert_eq!(config["files"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_synthetic_config_finds_type_roots() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules/@types/node")).unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();

        let config = synthetic_config(&[src.join("a.ts")], &EffectiveOptions::new(), &src);
        let roots = config["compilerOptions"]["typeRoots"].as_array().unwrap();
        assert!(
            roots
                .iter()
                .any(|r| r.as_str() == Some(&*dir.path().join("node_modules/@types").to_string_lossy()))
        );
    }

    #[test]
    fn test_missing_binary_is_reported_not_panicked() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.ts");
        std::fs::write(&file, "export const a = 1;\n").unwrap();

        let engine = TsgoEngine::with_binary(dir.path().join("no-such-checker"));
        let program = engine.create_program(&[file], &EffectiveOptions::new());

        assert!(program.pre_emit_diagnostics().is_empty());
        let reason = program.unchecked_reason().unwrap();
        assert!(reason.contains("no-such-checker"));
    }

    #[test]
    fn test_parse_errors_skip_the_checker() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.ts");
        std::fs::write(&file, "export const = 1;\n").unwrap();

        let engine = TsgoEngine::with_binary(dir.path().join("no-such-checker"));
        let program = engine.create_program(&[file], &EffectiveOptions::new());

        assert!(!program.pre_emit_diagnostics().is_empty());
        assert_eq!(program.unchecked_reason(), None);
    }
}
