//! CLI entrypoint for panedeck.
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

use std::io::Write;
use std::process::ExitCode;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use panedeck::HostConfig;
use panedeck::cli::Cli;
use panedeck::cli::Commands;
use panedeck_common::telemetry::install_panic_hook;
use tracing::error;

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let _telemetry = cli.log_settings().install();
    install_panic_hook();

    let config = cli.host_config();
    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Env => {
            print_config(&config)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Serve => match panedeck::run(&config) {
            Ok(()) => Ok(ExitCode::SUCCESS),
            Err(err) => {
                error!(error = %err, "panedeck host failed");
                writeln!(std::io::stderr(), "Error: {err}\n{}", err.suggestion())
                    .context("write error report")?;
                Ok(ExitCode::FAILURE)
            }
        },
    }
}

fn print_config(config: &HostConfig) -> Result<()> {
    let rendered =
        serde_json::to_string_pretty(&config.describe()).context("render configuration")?;
    writeln!(std::io::stdout(), "{rendered}").context("write configuration")?;
    Ok(())
}
