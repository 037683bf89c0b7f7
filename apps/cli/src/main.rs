//! buildgate CLI: version-gated production builds for front-end projects.
//!
//! Checks the toolchain, clears stale output, hands the asset pipeline to
//! the bundling engine and reports the verdict as an exit code.

mod commands;

use std::process::ExitCode;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
