//! cfsim CLI binary entry point.
//!
//! Parses command-line arguments with clap, sets up logging, and dispatches
//! to the selected subcommand via [`Cli::run`].

mod cli;
mod logging;

use anyhow::Result;
use clap::Parser;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (work_dir, command) = cli.log_context();

    // Best effort, before tracing is initialized.
    logging::cleanup_old_logs(&work_dir);

    let _guard = logging::init_tracing(&work_dir, command)?;

    cli.run().await
}
