//! tsmith CLI - compile, type-check and watch TypeScript projects.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::filter::EnvFilter;
use tsmith_core::{Toolchain, default_engine};

mod commands;
mod config;

use commands::Context;
use config::{LogFormat, Settings};

#[derive(Parser)]
#[command(
    name = "tsmith",
    version,
    about = "Compile, type-check and watch TypeScript projects",
    long_about = "tsmith resolves tsconfig.json settings, drives the compiler and reports \
                  diagnostics in one consistent shape.\n\n\
                  Compile a file:     tsmith compile src/main.ts -o dist\n\
                  Build a project:    tsmith compile --project .\n\
                  Type check:         tsmith check src"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Settings file path (default: nearest tsmith.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a TypeScript file or project
    Compile(commands::compile::CompileCommand),

    /// Type check without emitting
    Check(commands::check::CheckCommand),

    /// Print diagnostics in json, text or formatted output
    Diagnostics(commands::diagnostics::DiagnosticsCommand),

    /// Check a file for syntax errors only
    Syntax(commands::syntax::SyntaxCommand),

    /// Create or update tsconfig.json
    Config(commands::tsconfig::ConfigCommand),
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let settings = config::load_settings(cli.config.as_deref())?;
    init_tracing(&settings, cli.verbose)?;

    let ctx = Context {
        toolchain: Toolchain::with_engine(
            default_engine(settings.checker.binary.as_deref()),
            settings.debounce(),
        ),
        settings,
        json: cli.json,
    };

    let success = match &cli.command {
        Commands::Compile(cmd) => cmd.run(&ctx).await?,
        Commands::Check(cmd) => cmd.run(&ctx).await?,
        Commands::Diagnostics(cmd) => cmd.run(&ctx).await?,
        Commands::Syntax(cmd) => cmd.run(&ctx).await?,
        Commands::Config(cmd) => cmd.run(&ctx)?,
    };

    ctx.toolchain.shutdown();
    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Install the global subscriber. Logs go to stderr; RUST_LOG overrides the
/// settings level.
fn init_tracing(settings: &Settings, verbose: bool) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(settings.log_filter(verbose))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match settings.logging.format {
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}
