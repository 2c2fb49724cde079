//! Quill — render directories of templates into generated sources.
//!
//! # Usage
//!
//! ```text
//! quill render <templates> [--out DIR] [--data FILE] [--config FILE]
//!              [--mode fail-fast|fail-at-end|best-effort]
//!              [--async] [--workers N] [--verbose]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::render::RenderArgs;

#[derive(Parser, Debug)]
#[command(
    name = "quill",
    version,
    about = "Render template trees into generated source files",
    long_about = None,
)]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render every template under a directory.
    Render(RenderArgs),
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Commands::Render(args) => args.run(),
    }
}
