//! tsmith-core - TypeScript compile and check orchestration.
//!
//! This crate sits between a tool interface (the `tsmith` CLI, an editor
//! integration, a build server) and a compiler engine. It resolves effective
//! configuration, drives the engine, normalizes its diagnostics and keeps
//! watch sessions alive.
//!
//! # Example
//!
//! ```no_run
//! use tsmith_core::{CompileOutcome, CompileRequest, Toolchain};
//!
//! # async fn run() -> tsmith_core::ToolchainResult<()> {
//! let toolchain = Toolchain::with_defaults();
//! let request = CompileRequest::file("src/main.ts").with_source_map(true);
//!
//! if let CompileOutcome::Completed(result) = toolchain.compile(&request).await? {
//!     for file in &result.output_files {
//!         println!("wrote {}", file.path.display());
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        Toolchain                          │
//! │  compile · check_types · get_diagnostics · validate_syntax│
//! │  create_config · update_config · stop_watching · shutdown │
//! └──────────────────────────────────────────────────────────┘
//!        │                    │                     │
//!        ↓                    ↓                     ↓
//!  CompileOrchestrator  TypeCheckOrchestrator  WatchSessionManager
//!        │  (CompileGate)     │                     │
//!        └─────────┬──────────┘            FileWatcher (notify)
//!                  ↓
//!           ConfigResolver ──→ CompilerEngine (swc, tsgo/tsc)
//!                  ↓
//!     normalize → NormalizedDiagnostic → render
//! ```

mod blocking;

pub mod check;
pub mod compile;
pub mod config_manager;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod fs;
pub mod gate;
pub mod jsonc;
pub mod options;
pub mod resolver;
pub mod toolchain;
pub mod watch;

pub use check::{
    SYNTAX_ONLY, SyntaxValidation, TypeCheckOrchestrator, TypeCheckRequest, TypeCheckResult,
};
pub use compile::{
    CompilationResult, CompileOrchestrator, CompileRequest, CompileTarget, GeneratedFile,
};
pub use config_manager::{ConfigManager, ConfigWriteResult, default_config, validate};
pub use diagnostics::{
    DiagnosticSummary, NormalizedDiagnostic, OutputFormat, Severity, normalize, normalize_all,
    render, render_summary, summarize,
};
pub use engine::{CompilerEngine, SwcEngine, TsgoEngine, default_engine};
pub use error::{ToolchainError, ToolchainResult, ValidationIssue};
pub use fs::{FileSystem, MemoryFileSystem, StdFileSystem};
pub use gate::CompileGate;
pub use options::{CompilerOption, EffectiveOptions, OptionSource, OptionValue};
pub use resolver::{ConfigResolver, ResolvedConfig};
pub use toolchain::{CompileOutcome, Toolchain};
pub use watch::{
    FileWatcher, NotifyWatcher, Subscription, WatchAck, WatchEvent, WatchHandle, WatchOutcome,
    WatchReport, WatchSessionManager,
};
