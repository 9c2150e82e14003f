//! Models command - manage ML models.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tech_sort_adapters::models::{fetch_models, list_models, ModelStatus};

use super::Settings;

/// Arguments for the models command
#[derive(Args, Clone, Debug)]
pub struct ModelsArgs {
    #[command(subcommand)]
    pub command: ModelsCommand,
}

/// Models subcommands
#[derive(Subcommand, Clone, Debug)]
pub enum ModelsCommand {
    /// Download missing models
    Fetch {
        /// Base URL serving the weight files (overrides `models.base_url`)
        #[arg(long)]
        base_url: Option<String>,
    },
    /// List known models and their digests
    List,
    /// Print model directory path
    Path,
}

/// Run the models command.
pub fn run(args: &ModelsArgs, settings: &Settings) -> Result<()> {
    match &args.command {
        ModelsCommand::Fetch { base_url } => fetch(base_url.as_deref(), settings),
        ModelsCommand::List => list(settings),
        ModelsCommand::Path => {
            println!("{}", settings.models_dir().display());
            Ok(())
        }
    }
}

fn fetch(base_url: Option<&str>, settings: &Settings) -> Result<()> {
    let base_url = base_url
        .or(settings.config.models.base_url.as_deref())
        .context("No download location; pass --base-url or set models.base_url")?;
    let dir = settings.models_dir();

    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(format!("Fetching models into {}", dir.display()));
    spinner.enable_steady_tick(Duration::from_millis(120));

    let result = fetch_models(&dir, base_url);
    spinner.finish_and_clear();
    print_statuses(&result?);
    Ok(())
}

fn list(settings: &Settings) -> Result<()> {
    let dir = settings.models_dir();
    println!("Models directory: {}", dir.display());
    println!();
    print_statuses(&list_models(&dir)?);
    Ok(())
}

fn print_statuses(models: &[ModelStatus]) {
    for model in models {
        let file = model
            .path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        match &model.sha256 {
            Some(digest) => println!("  ✓ {} ({file}) sha256:{digest}", model.name),
            None => println!("  ✗ {} ({file})", model.name),
        }
    }
    println!();
    let installed = models.iter().filter(|m| m.installed()).count();
    println!("{installed}/{} models installed", models.len());
}
