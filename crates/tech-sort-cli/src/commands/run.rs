//! Run command - one defect pass per invocation, or repeated until done.

use std::io::IsTerminal;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use tech_sort_core::{FolderId, PassReport};
use tracing::{info, warn};

use super::{ExitCode, Library, Settings};
use crate::output::ProgressBar;

/// Arguments for the run command
#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Folder to analyze
    #[arg(long)]
    pub folder: i64,

    /// Reset the folder before the first batch
    #[arg(long)]
    pub reset: bool,

    /// Keep invoking passes until no unanalyzed photos remain
    #[arg(long)]
    pub until_done: bool,
}

/// Run the run command. Prints one report line per pass.
pub fn run(args: &RunArgs, settings: &Settings) -> Result<ExitCode> {
    let library = Library::open(settings)?;
    let mut pass = library.defect_pass(settings);
    if settings.progress && std::io::stderr().is_terminal() {
        pass = pass.with_progress(Arc::new(ProgressBar::new()));
    }
    let output = settings.output();
    let folder = FolderId(args.folder);

    let mut reset = args.reset;
    let mut passes = 0usize;
    let last: PassReport = loop {
        let report = pass.run(settings.owner, folder, reset)?;
        reset = false;
        passes += 1;
        output.write(&report)?;

        if !args.until_done || report.is_done() {
            break report;
        }
        if report.processed == 0 {
            warn!(
                "No photo could be committed; stopping with {} remaining",
                report.remaining
            );
            break report;
        }
    };

    info!(
        "Folder {folder}: {passes} pass(es), {} photos remaining",
        last.remaining
    );
    Ok(if last.is_done() {
        ExitCode::Success
    } else {
        ExitCode::PhotosRemaining
    })
}
