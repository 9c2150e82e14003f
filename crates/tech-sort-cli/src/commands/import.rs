//! Import command - register files from disk into a folder.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Args;
use serde::Serialize;
use tech_sort_adapters::{collect_media_files, probe_dimensions, MediaKind, NewPhoto};
use tech_sort_core::domain::{Folder, FolderId, NewFolder};
use tech_sort_core::ports::{BlobStore, PhotoStore};
use tracing::{info, warn};

use super::{Library, Settings};

/// Arguments for the import command
#[derive(Args, Clone, Debug)]
pub struct ImportArgs {
    /// Files or directories to import
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Name of the folder to create
    #[arg(long, required_unless_present = "folder")]
    pub folder_name: Option<String>,

    /// Add to an existing folder instead of creating one
    #[arg(long, conflicts_with = "folder_name")]
    pub folder: Option<i64>,

    /// Recurse into subdirectories
    #[arg(short, long)]
    pub recursive: bool,
}

/// Summary printed after an import.
#[derive(Debug, Serialize)]
pub struct ImportReport {
    pub folder_id: FolderId,
    pub folder_name: String,
    pub imported: usize,
    /// Of those, how many were flagged as videos.
    pub videos: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<String>,
}

/// Run the import command.
pub fn run(args: &ImportArgs, settings: &Settings) -> Result<ImportReport> {
    let library = Library::open(settings)?;
    let folder = target_folder(args, settings, &library)?;

    let raw_extensions = settings.config.decoder_config().raw_extensions;
    let files = collect_media_files(&args.paths, args.recursive, &raw_extensions);
    info!("Importing {} files into folder {}", files.len(), folder.id);

    let mut report = ImportReport {
        folder_id: folder.id,
        folder_name: folder.name.clone(),
        imported: 0,
        videos: 0,
        failed: Vec::new(),
    };
    for path in files {
        match import_file(&library, &folder, &path, &raw_extensions) {
            Ok(is_video) => {
                report.imported += 1;
                report.videos += usize::from(is_video);
            }
            Err(e) => {
                warn!("Failed to import {}: {e:#}", path.display());
                report.failed.push(path.display().to_string());
            }
        }
    }

    settings.output().write(&report)?;
    Ok(report)
}

fn target_folder(args: &ImportArgs, settings: &Settings, library: &Library) -> Result<Folder> {
    if let Some(id) = args.folder {
        let folder = library
            .store
            .folder(FolderId(id))?
            .filter(|f| !f.deleted)
            .with_context(|| format!("folder {id} not found"))?;
        if folder.owner != settings.owner {
            bail!("folder {id} does not belong to user {}", settings.owner);
        }
        if folder.is_rejects() {
            bail!("folder {id} is a rejects folder");
        }
        return Ok(folder);
    }

    let name = args
        .folder_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .context("--folder-name must not be empty")?;
    let prefix = format!(
        "u{}/{}-{}/",
        settings.owner,
        slug(name),
        Utc::now().timestamp_micros()
    );
    Ok(library
        .store
        .create_folder(NewFolder::regular(settings.owner, name, prefix))?)
}

/// Copies one file into the blob store and registers it. Returns whether it
/// was a video.
fn import_file(
    library: &Library,
    folder: &Folder,
    path: &Path,
    raw_extensions: &[String],
) -> Result<bool> {
    let kind = MediaKind::with_raw_extensions(path, raw_extensions).context("unsupported file type")?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("file name is not valid UTF-8")?
        .to_string();
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;

    let key = unique_key(library, &folder.storage_prefix, &file_name);
    library.blobs.put(&key, &bytes)?;

    let dimensions = match kind {
        MediaKind::Raster => probe_dimensions(&bytes),
        MediaKind::Raw | MediaKind::Video => None,
    };
    library.store.insert_photo(&NewPhoto {
        folder_id: folder.id,
        storage_key: key,
        file_name,
        content_type: MediaKind::content_type(kind, path).to_string(),
        size_bytes: bytes.len() as u64,
        width: dimensions.map(|d| d.0),
        height: dimensions.map(|d| d.1),
        is_video: kind == MediaKind::Video,
        created_at: Utc::now(),
    })?;
    Ok(kind == MediaKind::Video)
}

/// `prefix + file_name`, numbered when a blob with that key already exists.
fn unique_key(library: &Library, prefix: &str, file_name: &str) -> String {
    let key = format!("{prefix}{file_name}");
    if library.blobs.head(&key).is_err() {
        return key;
    }
    (1..)
        .map(|n| format!("{prefix}{n}-{file_name}"))
        .find(|candidate| library.blobs.head(candidate).is_err())
        .unwrap_or(key)
}

/// Lower-case ASCII slug for blob prefixes.
fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "folder".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug() {
        assert_eq!(slug("Summer Trip 2024"), "summer-trip-2024");
        assert_eq!(slug("  Été / ski "), "t-ski");
        assert_eq!(slug("???"), "folder");
    }
}
