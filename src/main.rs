use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use claudewatch::app;
use claudewatch::cli::{Cli, Commands};
use claudewatch::config::{self, WatchConfig};
use claudewatch::util::setup_tracing;

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("claudewatch error: {err:#}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<u8> {
    setup_tracing();
    let cli = Cli::parse();
    let config = WatchConfig::load_or_init()?;
    let runtime = config::runtime_settings(&config, cli.interval, cli.show_helpers);

    match cli.command {
        Some(Commands::Processes { sort, json }) => {
            app::print_processes(&config, &runtime, sort, json)?;
        }
        Some(Commands::Sessions { dir, json }) => app::print_sessions(&dir, json)?,
        Some(Commands::Inspect { file, json }) => {
            app::print_inspect(&file, json, config.display.message_preview_chars)?;
        }
        Some(Commands::Projects { json }) => app::print_projects(json)?,
        None => app::run_dashboard(config, runtime)?,
    }
    Ok(0)
}
