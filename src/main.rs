//! realm-assets - governed-asset scanner
//!
//! CLI entry point.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use clap::Parser;
use std::process::ExitCode;

use realm_assets::cli::{Cli, Commands};
use realm_assets::core::logging;
use realm_assets::render::error::render_error;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = cli.log_level.as_deref().and_then(logging::LogLevel::from_arg);
    logging::init(&logging::LogSettings::resolve(
        log_level,
        cli.json_output,
        cli.verbose,
    ));

    let format = cli.effective_format();
    let pretty = cli.pretty;

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(code = e.error_code(), "{e}");
            eprintln!("{}", render_error(&e, format, pretty));
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run(cli: Cli) -> realm_assets::Result<()> {
    let format = cli.effective_format();
    let pretty = cli.pretty;

    match cli.command {
        Commands::Scan(args) => realm_assets::cli::scan::execute_scan(&args, format, pretty).await,
        Commands::Refresh(args) => {
            realm_assets::cli::scan::execute_refresh(&args, format, pretty).await
        }
        Commands::TreasuryAddress(args) => {
            realm_assets::cli::scan::execute_treasury(&args, format, pretty)
        }
    }
}
