//! Test doubles shared by the integration tests.
//!
//! `ScriptedEngine` stands in for a type-checking engine: it reports a
//! diagnostic wherever a source contains one of its rule patterns.
//! `RecordingWatcher` counts live subscriptions and lets tests inject events.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

use tsmith_core::engine::{
    DiagnosticCategory, EmitResult, EmittedFile, EngineDiagnostic, ParsedConfig, Program,
    SourceFile, SyntaxKind, SyntaxNode, SyntaxTree, TranspileOutput, js_path_for,
};
use tsmith_core::{
    CompilerEngine, CompilerOption, EffectiveOptions, FileWatcher, MemoryFileSystem,
    Subscription, ToolchainError, ToolchainResult, WatchEvent, WatchHandle,
};

/// Source marker that makes the engine panic.
pub const PANIC_MARKER: &str = "@@panic";
/// Source marker that makes transpile produce no code.
pub const NO_OUTPUT_MARKER: &str = "@@no-output";
/// Character reported as an unknown syntax node.
pub const UNKNOWN_TOKEN: char = '§';

pub const ADD_SOURCE: &str = "function add(a:number,b:number):string { return a+b; }\nadd(\"5\",10);\n";
pub const VALID_SOURCE: &str = "const greeting: string = \"hello\";\nexport function greet(name: string): string {\n  return `${greeting}, ${name}`;\n}\n";

// ============================================================================
// Scripted engine
// ============================================================================

#[derive(Debug, Clone)]
pub struct Rule {
    pub pattern: String,
    pub code: u32,
    pub message: String,
    pub category: DiagnosticCategory,
    /// Reported by `syntactic_diagnostics` too.
    pub syntactic: bool,
}

impl Rule {
    pub fn error(pattern: &str, code: u32, message: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            code,
            message: message.to_string(),
            category: DiagnosticCategory::Error,
            syntactic: false,
        }
    }

    pub fn syntactic(mut self) -> Self {
        self.syntactic = true;
        self
    }

    pub fn with_category(mut self, category: DiagnosticCategory) -> Self {
        self.category = category;
        self
    }
}

/// Rules describing what a type checker reports for the `add()` sample.
pub fn type_checker_rules() -> Vec<Rule> {
    vec![
        Rule::error(
            "return a+b",
            2322,
            "Type 'number' is not assignable to type 'string'.",
        ),
        Rule::error(
            "add(\"5\"",
            2345,
            "Argument of type 'string' is not assignable to parameter of type 'number'.",
        ),
    ]
}

pub struct ScriptedEngine {
    fs: Arc<MemoryFileSystem>,
    rules: Vec<Rule>,
    emit_rules: Vec<Rule>,
    transpile_delay: Duration,
    pub options_seen: Mutex<Vec<EffectiveOptions>>,
    pub programs_created: AtomicUsize,
    in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
}

impl ScriptedEngine {
    pub fn new(fs: Arc<MemoryFileSystem>) -> Self {
        Self {
            fs,
            rules: type_checker_rules(),
            emit_rules: Vec::new(),
            transpile_delay: Duration::ZERO,
            options_seen: Mutex::new(Vec::new()),
            programs_created: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_emit_rule(mut self, rule: Rule) -> Self {
        self.emit_rules.push(rule);
        self
    }

    pub fn with_transpile_delay(mut self, delay: Duration) -> Self {
        self.transpile_delay = delay;
        self
    }

    pub fn last_options(&self) -> Option<EffectiveOptions> {
        self.options_seen.lock().last().cloned()
    }

    fn diagnostics_for(rules: &[Rule], file: &Arc<SourceFile>, syntactic_only: bool) -> Vec<EngineDiagnostic> {
        let mut found: Vec<(usize, EngineDiagnostic)> = Vec::new();
        for rule in rules.iter().filter(|r| !syntactic_only || r.syntactic) {
            for (at, _) in file.text().match_indices(&rule.pattern) {
                found.push((
                    at,
                    EngineDiagnostic::at(
                        file.clone(),
                        at as u32,
                        rule.pattern.len() as u32,
                        rule.code,
                        rule.message.as_str(),
                    )
                    .with_category(rule.category),
                ));
            }
        }
        found.sort_by_key(|(at, _)| *at);
        found.into_iter().map(|(_, d)| d).collect()
    }

    fn check_panic(source: &str) {
        if source.contains(PANIC_MARKER) {
            panic!("scripted engine panic");
        }
    }
}

impl CompilerEngine for ScriptedEngine {
    fn parse_config(&self, path: &Path) -> ParsedConfig {
        let Some(text) = self.fs.get(path) else {
            return ParsedConfig {
                errors: vec![EngineDiagnostic::global(
                    5083,
                    format!("Cannot read file '{}'.", path.display()),
                )],
                ..Default::default()
            };
        };

        let value: serde_json::Value = match tsmith_core::jsonc::parse(&text) {
            Ok(v) => v,
            Err(e) => {
                return ParsedConfig {
                    errors: vec![EngineDiagnostic::global(1005, e.to_string())],
                    ..Default::default()
                };
            }
        };

        let empty = serde_json::Map::new();
        let map = value
            .get("compilerOptions")
            .and_then(|v| v.as_object())
            .unwrap_or(&empty);
        let (options, option_errors) = EffectiveOptions::from_json_map(map);

        let dir = path.parent().unwrap_or(Path::new("/"));
        let file_names = self
            .fs
            .paths()
            .into_iter()
            .filter(|p| p.starts_with(dir) && p.extension().is_some_and(|e| e == "ts"))
            .collect();

        ParsedConfig {
            options,
            file_names,
            errors: option_errors
                .iter()
                .map(|e| EngineDiagnostic::global(5024, e.to_string()))
                .collect(),
        }
    }

    fn create_program(&self, root_files: &[PathBuf], options: &EffectiveOptions) -> Box<dyn Program> {
        self.programs_created.fetch_add(1, Ordering::SeqCst);
        self.options_seen.lock().push(options.clone());

        let files = root_files
            .iter()
            .filter_map(|p| {
                self.fs
                    .get(p)
                    .map(|text| (p.clone(), Arc::new(SourceFile::new(p.display().to_string(), text))))
            })
            .collect::<Vec<_>>();
        for (_, file) in &files {
            Self::check_panic(file.text());
        }

        Box::new(ScriptedProgram {
            root_files: root_files.to_vec(),
            files,
            options: options.clone(),
            rules: self.rules.clone(),
            emit_rules: self.emit_rules.clone(),
        })
    }

    fn transpile(&self, source: &str, file_name: &str, options: &EffectiveOptions) -> TranspileOutput {
        self.options_seen.lock().push(options.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.transpile_delay.is_zero() {
            std::thread::sleep(self.transpile_delay);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        Self::check_panic(source);
        let file = Arc::new(SourceFile::new(file_name, source));
        let diagnostics = Self::diagnostics_for(&self.rules, &file, false);

        if source.contains(NO_OUTPUT_MARKER) {
            return TranspileOutput {
                code: None,
                source_map: None,
                diagnostics,
            };
        }

        let source_map = (options.get_bool(CompilerOption::SourceMap) == Some(true))
            .then(|| format!("{{\"version\":3,\"sources\":[\"{}\"]}}", file_name));
        TranspileOutput {
            code: Some(format!("// compiled\n{}", source)),
            source_map,
            diagnostics,
        }
    }

    fn parse_syntax_tree(&self, source: &str, file_name: &str) -> SyntaxTree {
        let children = source
            .char_indices()
            .filter(|(_, c)| *c == UNKNOWN_TOKEN)
            .map(|(i, c)| SyntaxNode::leaf(SyntaxKind::Unknown, i as u32, (i + c.len_utf8()) as u32))
            .collect();
        SyntaxTree {
            file: Arc::new(SourceFile::new(file_name, source)),
            root: SyntaxNode {
                kind: SyntaxKind::SourceFile,
                start: 0,
                end: source.len() as u32,
                children,
            },
        }
    }
}

struct ScriptedProgram {
    root_files: Vec<PathBuf>,
    files: Vec<(PathBuf, Arc<SourceFile>)>,
    options: EffectiveOptions,
    rules: Vec<Rule>,
    emit_rules: Vec<Rule>,
}

impl Program for ScriptedProgram {
    fn root_files(&self) -> &[PathBuf] {
        &self.root_files
    }

    fn pre_emit_diagnostics(&self) -> Vec<EngineDiagnostic> {
        self.files
            .iter()
            .flat_map(|(_, f)| ScriptedEngine::diagnostics_for(&self.rules, f, false))
            .collect()
    }

    fn syntactic_diagnostics(&self) -> Vec<EngineDiagnostic> {
        self.files
            .iter()
            .flat_map(|(_, f)| ScriptedEngine::diagnostics_for(&self.rules, f, true))
            .collect()
    }

    fn emit(&self) -> EmitResult {
        if self.options.get_bool(CompilerOption::NoEmit) == Some(true) {
            return EmitResult {
                emit_skipped: true,
                ..Default::default()
            };
        }

        let out_dir = self.options.get_str(CompilerOption::OutDir).map(PathBuf::from);
        let mut result = EmitResult::default();
        for (path, file) in &self.files {
            result
                .diagnostics
                .extend(ScriptedEngine::diagnostics_for(&self.emit_rules, file, false));
            let js = js_path_for(path);
            let js = match (&out_dir, js.file_name()) {
                (Some(dir), Some(name)) => dir.join(name),
                _ => js,
            };
            result.files.push(EmittedFile {
                path: js,
                content: file.text().to_string(),
            });
        }
        result
    }
}

// ============================================================================
// Recording watcher
// ============================================================================

#[derive(Default)]
struct WatchState {
    live: HashMap<PathBuf, usize>,
    peak: HashMap<PathBuf, usize>,
    opened: usize,
    senders: HashMap<PathBuf, mpsc::UnboundedSender<WatchEvent>>,
}

/// Watcher that records subscriptions instead of touching the OS.
#[derive(Default, Clone)]
pub struct RecordingWatcher {
    state: Arc<Mutex<WatchState>>,
    fail_next: Arc<Mutex<bool>>,
}

impl RecordingWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live(&self, key: &Path) -> usize {
        self.state.lock().live.get(key).copied().unwrap_or(0)
    }

    pub fn peak(&self, key: &Path) -> usize {
        self.state.lock().peak.get(key).copied().unwrap_or(0)
    }

    pub fn total_live(&self) -> usize {
        self.state.lock().live.values().sum()
    }

    pub fn opened(&self) -> usize {
        self.state.lock().opened
    }

    /// Make the next `watch` call fail.
    pub fn fail_next(&self) {
        *self.fail_next.lock() = true;
    }

    /// Deliver a change event to the live subscription of `key`.
    ///
    /// Returns `false` when nothing is subscribed.
    pub fn trigger(&self, key: &Path) -> bool {
        let state = self.state.lock();
        match state.senders.get(key) {
            Some(tx) => tx.send(WatchEvent::Changed(key.to_path_buf())).is_ok(),
            None => false,
        }
    }

    pub fn trigger_error(&self, key: &Path, message: &str) -> bool {
        let state = self.state.lock();
        match state.senders.get(key) {
            Some(tx) => tx.send(WatchEvent::Error(message.to_string())).is_ok(),
            None => false,
        }
    }
}

impl FileWatcher for RecordingWatcher {
    fn watch(&self, path: &Path) -> ToolchainResult<Subscription> {
        if std::mem::take(&mut *self.fail_next.lock()) {
            return Err(ToolchainError::watch("scripted watch failure"));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let key = path.to_path_buf();
        {
            let mut state = self.state.lock();
            state.opened += 1;
            let live = state.live.entry(key.clone()).or_default();
            *live += 1;
            let now = *live;
            let peak = state.peak.entry(key.clone()).or_default();
            *peak = (*peak).max(now);
            state.senders.insert(key.clone(), tx);
        }

        Ok(Subscription {
            events: rx,
            handle: Box::new(RecordingHandle {
                key,
                state: self.state.clone(),
                closed: false,
            }),
        })
    }
}

struct RecordingHandle {
    key: PathBuf,
    state: Arc<Mutex<WatchState>>,
    closed: bool,
}

impl WatchHandle for RecordingHandle {
    fn close(&mut self) {
        if std::mem::replace(&mut self.closed, true) {
            return;
        }
        let mut state = self.state.lock();
        if let Some(live) = state.live.get_mut(&self.key) {
            *live = live.saturating_sub(1);
        }
        // Dropping the sender ends the event stream
        state.senders.remove(&self.key);
    }
}

impl Drop for RecordingHandle {
    fn drop(&mut self) {
        self.close();
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Memory filesystem, scripted engine and recording watcher wired together.
pub struct Harness {
    pub fs: Arc<MemoryFileSystem>,
    pub engine: Arc<ScriptedEngine>,
    pub watcher: RecordingWatcher,
}

impl Harness {
    pub fn new(fs: MemoryFileSystem) -> Self {
        let fs = Arc::new(fs);
        let engine = Arc::new(ScriptedEngine::new(fs.clone()));
        Self {
            fs,
            engine,
            watcher: RecordingWatcher::new(),
        }
    }

    pub fn with_engine(fs: Arc<MemoryFileSystem>, engine: ScriptedEngine) -> Self {
        Self {
            fs,
            engine: Arc::new(engine),
            watcher: RecordingWatcher::new(),
        }
    }

    pub fn toolchain(&self) -> tsmith_core::Toolchain {
        tsmith_core::Toolchain::new(
            self.engine.clone(),
            self.fs.clone(),
            Arc::new(self.watcher.clone()),
        )
    }
}

/// Poll `condition` until it holds or a second passes.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
