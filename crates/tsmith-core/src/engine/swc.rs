//! TypeScript engine built on SWC (Speedy Web Compiler).
//!
//! Strips type annotations and generates JavaScript per file. It reports
//! syntax errors only; semantic checking belongs to a type-checking engine
//! plugged in through the same [`CompilerEngine`] trait.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use swc_common::{FileName, GLOBALS, Globals, Mark, SourceMap, Span, Spanned, sync::Lrc};
use swc_ecma_ast::{EsVersion, Invalid, Module, ModuleItem, Program as SwcAst, Stmt};
use swc_ecma_codegen::{Config as CodegenConfig, Emitter, text_writer::JsWriter};
use swc_ecma_parser::{Parser, StringInput, Syntax, TsSyntax, lexer::Lexer};
use swc_ecma_transforms_base::{fixer::fixer, resolver};
use swc_ecma_transforms_typescript::strip;
use swc_ecma_visit::{Visit, VisitMutWith, VisitWith};

use super::tsconfig::{is_declaration_file, normalize_path, parse_config_file};
use super::{
    CompilerEngine, EmitResult, EmittedFile, EngineDiagnostic, ParsedConfig, Program, SourceFile,
    SyntaxKind, SyntaxNode, SyntaxTree, TranspileOutput, js_path_for,
};
use crate::options::{CompilerOption, EffectiveOptions, ScriptTarget};

/// Code TypeScript uses for "expected token" syntax errors.
const SYNTAX_ERROR: u32 = 1005;

/// [`CompilerEngine`] backed by the swc parser, TypeScript strip pass and codegen.
#[derive(Debug, Clone, Copy, Default)]
pub struct SwcEngine;

impl SwcEngine {
    pub fn new() -> Self {
        Self
    }
}

impl CompilerEngine for SwcEngine {
    fn parse_config(&self, path: &Path) -> ParsedConfig {
        parse_config_file(path)
    }

    fn create_program(&self, root_files: &[PathBuf], options: &EffectiveOptions) -> Box<dyn Program> {
        Box::new(SwcProgram::build(root_files, options))
    }

    fn transpile(&self, source: &str, file_name: &str, options: &EffectiveOptions) -> TranspileOutput {
        transpile_source(source, file_name, options)
    }

    fn parse_syntax_tree(&self, source: &str, file_name: &str) -> SyntaxTree {
        let parsed = parse_module(source, file_name, EsVersion::EsNext);
        let start_pos = parsed.start_pos;
        let end = source.len() as u32;

        let children = match &parsed.module {
            Some(module) => module
                .body
                .iter()
                .map(|item| item_node(item, start_pos))
                .collect(),
            None => {
                // Fatal parse error: the unparsed remainder is one unknown node
                let start = parsed
                    .fatal_span
                    .map(|span| local_range(span, start_pos).0)
                    .unwrap_or(0);
                vec![SyntaxNode::leaf(SyntaxKind::Unknown, start, end)]
            }
        };

        SyntaxTree {
            file: parsed.file,
            root: SyntaxNode {
                kind: SyntaxKind::SourceFile,
                start: 0,
                end,
                children,
            },
        }
    }
}

fn es_version(options: &EffectiveOptions) -> EsVersion {
    match options
        .get_str(CompilerOption::Target)
        .and_then(ScriptTarget::parse)
    {
        Some(ScriptTarget::Es3) => EsVersion::Es3,
        Some(ScriptTarget::Es5) => EsVersion::Es5,
        Some(ScriptTarget::Es2015) => EsVersion::Es2015,
        Some(ScriptTarget::Es2016) => EsVersion::Es2016,
        Some(ScriptTarget::Es2017) => EsVersion::Es2017,
        Some(ScriptTarget::Es2018) => EsVersion::Es2018,
        Some(ScriptTarget::Es2019) => EsVersion::Es2019,
        Some(ScriptTarget::Es2020) | None => EsVersion::Es2020,
        Some(ScriptTarget::Es2021) => EsVersion::Es2021,
        Some(ScriptTarget::Es2022) => EsVersion::Es2022,
        Some(ScriptTarget::EsNext) => EsVersion::EsNext,
    }
}

// ============================================================================
// Parsing
// ============================================================================

struct ParsedModule {
    cm: Lrc<SourceMap>,
    file: Arc<SourceFile>,
    start_pos: u32,
    module: Option<Module>,
    fatal_span: Option<Span>,
    diagnostics: Vec<EngineDiagnostic>,
}

fn parse_module(source: &str, file_name: &str, target: EsVersion) -> ParsedModule {
    let cm: Lrc<SourceMap> = Default::default();
    let fm = cm.new_source_file(
        Lrc::new(FileName::Custom(file_name.to_string())),
        source.to_string(),
    );
    let start_pos = fm.start_pos.0;
    let file = Arc::new(SourceFile::new(file_name, source));

    let syntax = Syntax::Typescript(TsSyntax {
        tsx: file_name.ends_with(".tsx"),
        decorators: true,
        dts: is_declaration_file(Path::new(file_name)),
        no_early_errors: false,
        disallow_ambiguous_jsx_like: false,
    });

    let lexer = Lexer::new(syntax, target, StringInput::from(&*fm), None);
    let mut parser = Parser::new_from(lexer);
    let result = parser.parse_module();

    let mut diagnostics: Vec<EngineDiagnostic> = parser
        .take_errors()
        .into_iter()
        .map(|e| syntax_diagnostic(&file, start_pos, e.span(), &e.kind().msg()))
        .collect();

    let (module, fatal_span) = match result {
        Ok(module) => (Some(module), None),
        Err(e) => {
            diagnostics.push(syntax_diagnostic(&file, start_pos, e.span(), &e.kind().msg()));
            (None, Some(e.span()))
        }
    };

    ParsedModule {
        cm,
        file,
        start_pos,
        module,
        fatal_span,
        diagnostics,
    }
}

/// Byte range of a span relative to the start of its file.
fn local_range(span: Span, start_pos: u32) -> (u32, u32) {
    let lo = span.lo.0.saturating_sub(start_pos);
    let hi = span.hi.0.saturating_sub(start_pos).max(lo);
    (lo, hi)
}

fn syntax_diagnostic(file: &Arc<SourceFile>, start_pos: u32, span: Span, message: &str) -> EngineDiagnostic {
    let (lo, hi) = local_range(span, start_pos);
    EngineDiagnostic::at(file.clone(), lo, hi - lo, SYNTAX_ERROR, message.to_string())
}

// ============================================================================
// Syntax tree
// ============================================================================

#[derive(Default)]
struct InvalidCollector {
    spans: Vec<Span>,
}

impl Visit for InvalidCollector {
    fn visit_invalid(&mut self, node: &Invalid) {
        self.spans.push(node.span);
    }
}

fn item_node(item: &ModuleItem, start_pos: u32) -> SyntaxNode {
    let kind = match item {
        ModuleItem::ModuleDecl(_) | ModuleItem::Stmt(Stmt::Decl(_)) => SyntaxKind::Declaration,
        ModuleItem::Stmt(_) => SyntaxKind::Statement,
    };
    let (start, end) = local_range(item.span(), start_pos);

    let mut collector = InvalidCollector::default();
    item.visit_with(&mut collector);
    let children = collector
        .spans
        .into_iter()
        .map(|span| {
            let (lo, hi) = local_range(span, start_pos);
            SyntaxNode::leaf(SyntaxKind::Unknown, lo, hi)
        })
        .collect();

    SyntaxNode {
        kind,
        start,
        end,
        children,
    }
}

// ============================================================================
// Transpiling
// ============================================================================

fn transpile_source(source: &str, file_name: &str, options: &EffectiveOptions) -> TranspileOutput {
    let target = es_version(options);
    let want_map = options.get_bool(CompilerOption::SourceMap).unwrap_or(false);
    let parsed = parse_module(source, file_name, target);

    let Some(module) = parsed.module else {
        return TranspileOutput {
            code: None,
            source_map: None,
            diagnostics: parsed.diagnostics,
        };
    };

    let mut diagnostics = parsed.diagnostics;
    let (code, source_map) = match strip_and_emit(&parsed.cm, module, target, want_map) {
        Ok((mut code, map)) => {
            if map.is_some() {
                let js_name = js_path_for(Path::new(file_name));
                let base = js_name
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                if !code.ends_with('\n') {
                    code.push('\n');
                }
                code.push_str(&format!("//# sourceMappingURL={}.map\n", base));
            }
            (Some(code), map)
        }
        Err(message) => {
            diagnostics.push(EngineDiagnostic::global(5033, message));
            (None, None)
        }
    };

    TranspileOutput {
        code,
        source_map,
        diagnostics,
    }
}

fn strip_and_emit(
    cm: &Lrc<SourceMap>,
    module: Module,
    target: EsVersion,
    source_map: bool,
) -> Result<(String, Option<String>), String> {
    let mut program = SwcAst::Module(module);

    GLOBALS.set(&Globals::default(), || {
        let unresolved_mark = Mark::new();
        let top_level_mark = Mark::new();

        program.visit_mut_with(&mut resolver(unresolved_mark, top_level_mark, true));
        program.mutate(&mut strip(unresolved_mark, top_level_mark));
        program.visit_mut_with(&mut fixer(None));
    });

    let SwcAst::Module(module) = program else {
        return Err("Expected module, got script".to_string());
    };

    let mut buf = vec![];
    let mut src_map_buf = vec![];

    {
        let writer = JsWriter::new(
            cm.clone(),
            "\n",
            &mut buf,
            if source_map {
                Some(&mut src_map_buf)
            } else {
                None
            },
        );

        let codegen_config = CodegenConfig::default()
            .with_target(target)
            .with_ascii_only(false)
            .with_minify(false)
            .with_omit_last_semi(false);

        let mut emitter = Emitter {
            cfg: codegen_config,
            cm: cm.clone(),
            comments: None,
            wr: writer,
        };

        emitter
            .emit_module(&module)
            .map_err(|e| format!("Failed to emit code: {}", e))?;
    }

    let code = String::from_utf8(buf).map_err(|e| format!("Invalid UTF-8 output: {}", e))?;

    let map = if source_map {
        let mut map_buf = vec![];
        cm.build_source_map(
            &src_map_buf,
            None,
            swc_common::source_map::DefaultSourceMapGenConfig,
        )
        .to_writer(&mut map_buf)
        .map_err(|e| format!("Failed to write source map: {}", e))?;
        Some(String::from_utf8(map_buf).map_err(|e| format!("Invalid UTF-8 source map: {}", e))?)
    } else {
        None
    };

    Ok((code, map))
}

// ============================================================================
// Program
// ============================================================================

struct ProgramFile {
    path: PathBuf,
    output: TranspileOutput,
}

/// Every root file transpiled up front.
struct SwcProgram {
    root_files: Vec<PathBuf>,
    options: EffectiveOptions,
    read_errors: Vec<EngineDiagnostic>,
    files: Vec<ProgramFile>,
}

impl SwcProgram {
    fn build(root_files: &[PathBuf], options: &EffectiveOptions) -> Self {
        let mut read_errors = Vec::new();
        let mut files = Vec::new();

        for path in root_files {
            match std::fs::read_to_string(path) {
                Ok(text) => {
                    let name = path.display().to_string();
                    tracing::debug!(file = %name, "transpiling program file");
                    files.push(ProgramFile {
                        path: path.clone(),
                        output: transpile_source(&text, &name, options),
                    });
                }
                Err(e) => read_errors.push(EngineDiagnostic::global(
                    6053,
                    format!("File '{}' not found: {}.", path.display(), e),
                )),
            }
        }

        Self {
            root_files: root_files.to_vec(),
            options: options.clone(),
            read_errors,
            files,
        }
    }

    /// `rootDir`, or the common directory of all emitted sources.
    fn root_dir(&self) -> Option<PathBuf> {
        if let Some(root) = self.options.get_str(CompilerOption::RootDir) {
            return Some(normalize_path(Path::new(root)));
        }

        let mut common: Option<PathBuf> = None;
        for file in self.files.iter().filter(|f| !is_declaration_file(&f.path)) {
            let dir = file.path.parent().map(Path::to_path_buf).unwrap_or_default();
            common = Some(match common {
                None => dir,
                Some(current) => current
                    .ancestors()
                    .find(|a| dir.starts_with(a))
                    .map(Path::to_path_buf)
                    .unwrap_or_default(),
            });
        }
        common
    }
}

impl Program for SwcProgram {
    fn root_files(&self) -> &[PathBuf] {
        &self.root_files
    }

    fn pre_emit_diagnostics(&self) -> Vec<EngineDiagnostic> {
        let mut diagnostics = self.read_errors.clone();
        diagnostics.extend(self.syntactic_diagnostics());
        diagnostics
    }

    fn syntactic_diagnostics(&self) -> Vec<EngineDiagnostic> {
        self.files
            .iter()
            .flat_map(|f| f.output.diagnostics.iter().cloned())
            .collect()
    }

    fn unchecked_reason(&self) -> Option<String> {
        Some("no type checker (tsgo or tsc) is available".to_string())
    }

    fn emit(&self) -> EmitResult {
        if self.options.get_bool(CompilerOption::NoEmit) == Some(true) {
            return EmitResult {
                emit_skipped: true,
                ..Default::default()
            };
        }

        let no_emit_on_error = self
            .options
            .passthrough()
            .get("noEmitOnError")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if no_emit_on_error && !self.pre_emit_diagnostics().is_empty() {
            return EmitResult {
                emit_skipped: true,
                ..Default::default()
            };
        }

        let out_dir = self
            .options
            .get_str(CompilerOption::OutDir)
            .map(|d| normalize_path(Path::new(d)));
        let root_dir = self.root_dir();
        let mut result = EmitResult::default();

        for file in &self.files {
            if is_declaration_file(&file.path) {
                continue;
            }
            let Some(code) = &file.output.code else {
                continue;
            };

            let js_path = match (&out_dir, &root_dir) {
                (Some(out), Some(root)) => match file.path.strip_prefix(root) {
                    Ok(rel) => out.join(js_path_for(rel)),
                    Err(_) => {
                        result.diagnostics.push(EngineDiagnostic::global(
                            6059,
                            format!(
                                "File '{}' is not under 'rootDir' '{}'. 'rootDir' is expected to contain all source files.",
                                file.path.display(),
                                root.display()
                            ),
                        ));
                        continue;
                    }
                },
                _ => js_path_for(&file.path),
            };

            if let Some(map) = &file.output.source_map {
                let mut map_path = js_path.clone().into_os_string();
                map_path.push(".map");
                result.files.push(EmittedFile {
                    path: PathBuf::from(map_path),
                    content: map.clone(),
                });
            }
            result.files.push(EmittedFile {
                path: js_path,
                content: code.clone(),
            });
        }

        // JavaScript first, then its map
        result.files.sort_by_key(|f| f.path.extension().is_some_and(|e| e == "map"));
        result
    }
}
