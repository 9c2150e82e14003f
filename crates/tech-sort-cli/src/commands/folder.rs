//! Folder maintenance commands: reset, restore and status.

use anyhow::Result;
use clap::Args;
use tech_sort_core::{FolderId, PhotoId};

use super::{Library, Settings};

/// A folder selector
#[derive(Args, Clone, Debug)]
pub struct FolderArgs {
    /// Source folder id
    #[arg(long)]
    pub folder: i64,
}

/// Arguments for the restore command
#[derive(Args, Clone, Debug)]
pub struct RestoreArgs {
    /// Id of the rejected photo
    #[arg(long)]
    pub photo: i64,
}

/// Moves every reject back and clears the folder's analysis.
pub fn reset(args: &FolderArgs, settings: &Settings) -> Result<()> {
    let pass = Library::open(settings)?.defect_pass(settings);
    let report = pass.reset(settings.owner, FolderId(args.folder))?;
    settings.output().write(&report)
}

/// Moves a single rejected photo back to its source folder.
pub fn restore(args: &RestoreArgs, settings: &Settings) -> Result<()> {
    let pass = Library::open(settings)?.defect_pass(settings);
    let report = pass.restore_photo(settings.owner, PhotoId(args.photo))?;
    settings.output().write(&report)
}

/// Prints per-state counts of a folder.
pub fn status(args: &FolderArgs, settings: &Settings) -> Result<()> {
    let pass = Library::open(settings)?.defect_pass(settings);
    let status = pass.status(settings.owner, FolderId(args.folder))?;
    settings.output().write(&status)
}
