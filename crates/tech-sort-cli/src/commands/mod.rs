//! CLI command definitions and handlers.

pub mod folder;
pub mod import;
pub mod models;
pub mod run;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tech_sort_adapters::models::{all_models_installed, model_paths, models_dir};
use tech_sort_adapters::{BoundedDecoder, Database, FsBlobStore, SqlitePhotoStore};
use tech_sort_core::inference::{select_device, CandleFeatureDetector};
use tech_sort_core::modules::EyesModule;
use tech_sort_core::{DefectPass, PhotoAnalyzer, UserId};
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::output::JsonOutput;

/// tech-sort - move technically defective photos into a rejects folder
#[derive(Parser)]
#[command(name = "tech-sort")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags shared by every subcommand.
#[derive(Args, Clone, Debug, Default)]
pub struct GlobalArgs {
    /// SQLite database file
    #[arg(long, global = true, value_name = "FILE", env = "TECH_SORT_DB")]
    pub db: Option<PathBuf>,

    /// Blob store root directory
    #[arg(long, global = true, value_name = "DIR", env = "TECH_SORT_BLOBS")]
    pub blobs: Option<PathBuf>,

    /// Acting user id
    #[arg(long, global = true)]
    pub owner: Option<i64>,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Show a progress bar on stderr
    #[arg(long, global = true)]
    pub progress: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Register image files into a folder
    Import(import::ImportArgs),
    /// Run one defect pass over a folder
    Run(run::RunArgs),
    /// Move every reject of a folder back and clear its analysis
    Reset(folder::FolderArgs),
    /// Move one rejected photo back to its source folder
    Restore(folder::RestoreArgs),
    /// Show analysis counts of a folder
    Status(folder::FolderArgs),
    /// Manage ML models
    Models(models::ModelsArgs),
}

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    Error,
    /// A pass finished and unanalyzed photos remain.
    PhotosRemaining,
}

impl ExitCode {
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Error => 2,
            Self::PhotosRemaining => 3,
        }
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        Self::from(code.code())
    }
}

/// Configuration after CLI flags were layered over the config files.
pub struct Settings {
    pub config: AppConfig,
    pub db: PathBuf,
    pub blobs: PathBuf,
    pub owner: UserId,
    pub pretty: bool,
    pub progress: bool,
}

impl Settings {
    /// Layers `global` over `config`; unset storage paths fall back to the
    /// XDG data directory.
    #[must_use]
    pub fn resolve(global: &GlobalArgs, config: AppConfig) -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tech-sort");
        let db = global
            .db
            .clone()
            .or_else(|| config.storage.db.clone())
            .unwrap_or_else(|| data_dir.join("library.db"));
        let blobs = global
            .blobs
            .clone()
            .or_else(|| config.storage.blobs.clone())
            .unwrap_or_else(|| data_dir.join("blobs"));
        let owner = UserId(global.owner.or(config.storage.owner).unwrap_or(1));
        let pretty = global.pretty || config.output.pretty.unwrap_or(false);
        let progress = global.progress || config.output.progress.unwrap_or(false);
        Self {
            config,
            db,
            blobs,
            owner,
            pretty,
            progress,
        }
    }

    #[must_use]
    pub fn output(&self) -> JsonOutput {
        JsonOutput::stdout(self.pretty)
    }

    #[must_use]
    pub fn models_dir(&self) -> PathBuf {
        models_dir(self.config.models.dir.as_deref())
    }
}

/// Opened stores for one invocation.
pub struct Library {
    pub store: Arc<SqlitePhotoStore>,
    pub blobs: Arc<FsBlobStore>,
}

impl Library {
    /// Opens the database and blob store named by `settings`.
    ///
    /// # Errors
    ///
    /// Returns an error if either cannot be opened.
    pub fn open(settings: &Settings) -> Result<Self> {
        let db = Database::open(&settings.db)
            .with_context(|| format!("Failed to open database {}", settings.db.display()))?;
        let blobs = FsBlobStore::open(&settings.blobs)?;
        Ok(Self {
            store: Arc::new(SqlitePhotoStore::new(db)),
            blobs: Arc::new(blobs),
        })
    }

    /// The defect pass with the standard detectors, plus closed-eyes when
    /// enabled and its models are installed.
    #[must_use]
    pub fn defect_pass(&self, settings: &Settings) -> DefectPass {
        let config = &settings.config;
        let mut analyzer = PhotoAnalyzer::new(Box::new(BoundedDecoder::new(config.decoder_config())))
            .with_standard_detectors(config.blur_config(), &config.exposure_config());

        if config.eyes.enabled.unwrap_or(true) {
            let dir = settings.models_dir();
            if all_models_installed(&dir) {
                let device = select_device(config.eyes.prefer_gpu.unwrap_or(false));
                let detector =
                    CandleFeatureDetector::new(model_paths(&dir), &device, config.detector_config());
                analyzer = analyzer.with_detector(Box::new(EyesModule::new(
                    config.eyes_config(),
                    Arc::new(detector),
                )));
                debug!("Enabled closed-eyes module");
            } else {
                info!(
                    "Closed-eyes detection disabled: models not found in {}. Run `tech-sort models fetch`.",
                    dir.display()
                );
            }
        } else {
            debug!("Closed-eyes detection disabled by config");
        }

        DefectPass::new(
            self.store.clone(),
            self.blobs.clone(),
            analyzer,
            config.pass_config(),
        )
    }
}
