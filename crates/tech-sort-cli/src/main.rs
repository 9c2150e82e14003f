//! tech-sort CLI - technical-defect sorting for photo folders.

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;
mod output;

use commands::{Cli, Commands, ExitCode, Settings};
use config::AppConfig;

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let filter = match cli.global.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let settings = Settings::resolve(&cli.global, AppConfig::load());

    let result = match &cli.command {
        Commands::Import(args) => commands::import::run(args, &settings).map(|_| ExitCode::Success),
        Commands::Run(args) => commands::run::run(args, &settings),
        Commands::Reset(args) => commands::folder::reset(args, &settings).map(|()| ExitCode::Success),
        Commands::Restore(args) => {
            commands::folder::restore(args, &settings).map(|()| ExitCode::Success)
        }
        Commands::Status(args) => commands::folder::status(args, &settings).map(|()| ExitCode::Success),
        Commands::Models(args) => commands::models::run(args, &settings).map(|()| ExitCode::Success),
    };

    match result {
        Ok(code) => code.into(),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::Error.into()
        }
    }
}
