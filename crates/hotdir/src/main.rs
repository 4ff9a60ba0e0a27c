//! hotdir CLI - static file server with live reload.
//!
//! Serves a directory over HTTP and reloads open pages when files change.

mod browser;
mod commands;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use commands::{LogFormat, ServeArgs};
use output::Output;

/// hotdir - serve a directory with live reload.
#[derive(Parser)]
#[command(name = "hotdir", version, about)]
struct Cli {
    #[command(flatten)]
    serve: ServeArgs,
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    // --log verbose enables DEBUG, --log tiny INFO, otherwise RUST_LOG or WARN
    let filter = match cli.serve.log {
        Some(LogFormat::Verbose) => EnvFilter::new("debug"),
        Some(LogFormat::Tiny) => EnvFilter::new("info"),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = tokio::runtime::Runtime::new()
        .map_err(error::CliError::from)
        .and_then(|rt| rt.block_on(cli.serve.execute()));

    if let Err(err) = result {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}
