//! dxsbash-config - Settings manager for the DXSBash shell dotfiles
//!
//! Main entry point for the command-line application.
//!
//! # Execution Flow
//!
//! 1. Parse arguments
//! 2. Initialize logging → ~/.config/dxsbash/logs/dxsbash-config.<date>
//! 3. Create a tokio runtime (apply runs on its blocking pool)
//! 4. Hand over to [`cli::run`], which loads the configuration and runs the command
//! 5. Shutdown the runtime with a short timeout
//!
//! Exit status is 0 on success and 1 on validation failure, a failed apply,
//! or an initialization error.

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use dxsbash_config::cli::{self, Cli};
use dxsbash_config::logging::{LOG_PREFIX, setup_logging};
use dxsbash_config::{APP_NAME, HomeLayout, VERSION};
use std::process::ExitCode;
use std::time::Duration;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let debug = cli.debug;

    match try_main(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("Fatal: {:#}", e);
            eprintln!("{} {:#}", "error:".red().bold(), e);
            if !debug {
                eprintln!("Use --debug for detailed logs");
            }
            ExitCode::FAILURE
        }
    }
}

fn try_main(cli: Cli) -> Result<ExitCode> {
    let layout = HomeLayout::current();

    // Held until exit so buffered log lines are flushed
    let _guard = setup_logging(&layout.log_dir(), LOG_PREFIX, cli.debug, cli.debug)?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("dxsbash-worker")
        .build()?;

    let result = cli::run(cli, &layout, &runtime);

    runtime.shutdown_timeout(Duration::from_secs(5));
    tracing::info!("Shutdown complete");

    result
}
