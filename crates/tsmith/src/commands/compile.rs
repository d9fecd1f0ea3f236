//! Compile command - transpile a file or project, optionally watching.

use anyhow::{Context as _, Result};
use clap::Args;
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tsmith_core::{CompilationResult, CompileOutcome, CompileRequest, WatchOutcome, WatchReport};

use super::Context;

#[derive(Args)]
pub struct CompileCommand {
    /// TypeScript file to compile
    #[arg(required_unless_present = "project", conflicts_with = "project")]
    pub file: Option<PathBuf>,

    /// Compile the project whose tsconfig.json lives in DIR
    #[arg(long, short = 'p', value_name = "DIR")]
    pub project: Option<PathBuf>,

    /// Output directory (overrides outDir)
    #[arg(long, short = 'o', value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Emit a source map next to the output
    #[arg(long)]
    pub source_map: bool,

    /// Recompile whenever the file changes
    #[arg(long, short = 'w')]
    pub watch: bool,
}

impl CompileCommand {
    fn request(&self) -> CompileRequest {
        CompileRequest {
            file_path: self.file.clone(),
            project_path: self.project.clone(),
            output_dir: self.out_dir.clone(),
            source_map: self.source_map.then_some(true),
            watch: false,
        }
    }

    pub async fn run(&self, ctx: &Context) -> Result<bool> {
        let request = self.request();
        let label = request
            .file_path
            .as_ref()
            .or(request.project_path.as_ref())
            .map(|p| p.display().to_string())
            .unwrap_or_default();

        let outcome = ctx
            .toolchain
            .compile(&request)
            .await
            .with_context(|| format!("failed to compile {}", label))?;
        let success = match outcome {
            CompileOutcome::Completed(result) => {
                print_result(ctx, &result)?;
                result.success
            }
            CompileOutcome::Watching(_) => true,
        };

        if self.watch {
            if request.file_path.is_some() {
                return self.watch_until_shutdown(ctx, request).await;
            }
            eprintln!("--watch applies to single files; the project was compiled once.");
        }
        Ok(success)
    }

    async fn watch_until_shutdown(&self, ctx: &Context, request: CompileRequest) -> Result<bool> {
        let mut reports = ctx.toolchain.watch_reports();
        let outcome = ctx
            .toolchain
            .compile(&request.with_watch(true))
            .await
            .context("failed to start watching")?;
        if let CompileOutcome::Watching(ack) = outcome {
            if !ctx.json {
                println!("Watching {} (Ctrl-C to stop)", ack.key.display());
            }
        }

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                report = reports.recv() => match report {
                    Ok(report) => print_report(ctx, &report)?,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "dropped watch reports");
                    }
                    Err(RecvError::Closed) => break,
                },
                signal = &mut shutdown => {
                    signal.context("failed to listen for shutdown signals")?;
                    break;
                }
            }
        }

        let stopped = ctx.toolchain.shutdown();
        tracing::debug!(sessions = stopped, "watch mode ended");
        Ok(true)
    }
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}

fn print_result(ctx: &Context, result: &CompilationResult) -> Result<()> {
    if ctx.json {
        return ctx.print_json(result);
    }

    for file in &result.output_files {
        println!("  wrote {}", file.path.display());
    }
    ctx.print_diagnostics(&result.diagnostics);
    println!(
        "{} in {}ms",
        if result.success { "Compiled" } else { "Compilation failed" },
        result.duration_ms
    );
    Ok(())
}

fn print_report(ctx: &Context, report: &WatchReport) -> Result<()> {
    if ctx.json {
        return ctx.print_json(report);
    }

    println!("\n[{}] changed", report.key.display());
    match &report.outcome {
        WatchOutcome::Compiled(result) => print_result(ctx, result),
        WatchOutcome::Failed(message) => {
            eprintln!("Recompile failed: {}", message);
            Ok(())
        }
    }
}
