//! Filesystem adapters: a directory-backed blob store and import scanning.

use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use tech_sort_core::ports::BlobStore;
use tracing::{debug, warn};

use crate::decode::RAW_EXTENSIONS;

/// Raster extensions picked up by import.
const RASTER_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tiff", "tif", "webp", "bmp", "gif"];
/// Video extensions; imported but flagged so passes skip them.
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "m4v", "avi", "mkv"];

/// Blob store rooted at a directory; keys are relative paths below it.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Opens a store, creating the root directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create blob directory {}", root.display()))?;
        Ok(Self { root })
    }

    /// Maps a key to a path, refusing anything that could escape the root.
    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        if key.is_empty()
            || !relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
        {
            bail!("invalid blob key '{key}'");
        }
        Ok(self.root.join(relative))
    }

    fn ensure_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        Ok(())
    }
}

impl BlobStore for FsBlobStore {
    fn head(&self, key: &str) -> Result<u64> {
        let path = self.resolve(key)?;
        let meta = fs::metadata(&path).with_context(|| format!("Failed to stat {key}"))?;
        Ok(meta.len())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve(key)?;
        fs::read(&path).with_context(|| format!("Failed to read {key}"))
    }

    fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.resolve(key)?;
        Self::ensure_parent(&path)?;
        fs::write(&path, data).with_context(|| format!("Failed to write {key}"))?;
        debug!(key, bytes = data.len(), "blob stored");
        Ok(())
    }

    fn copy(&self, from: &str, to: &str) -> Result<()> {
        let source = self.resolve(from)?;
        let target = self.resolve(to)?;
        Self::ensure_parent(&target)?;
        fs::copy(&source, &target).with_context(|| format!("Failed to copy {from} to {to}"))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let path = self.resolve(key)?;
        match fs::remove_file(&path) {
            Err(e) if e.kind() != ErrorKind::NotFound => {
                Err(e).with_context(|| format!("Failed to delete {key}"))
            }
            _ => Ok(()),
        }
    }
}

/// What import should do with a file, judged by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Raster,
    Raw,
    Video,
}

impl MediaKind {
    /// Classifies a path with the default RAW table; `None` for unsupported
    /// files.
    #[must_use]
    pub fn of(path: &Path) -> Option<Self> {
        Self::classify(path, |ext| RAW_EXTENSIONS.contains(&ext))
    }

    /// Classifies a path, treating the given lower-case extensions as RAW.
    /// Pass the loader's `raw_extensions` so import and decoding agree.
    #[must_use]
    pub fn with_raw_extensions(path: &Path, raw_extensions: &[String]) -> Option<Self> {
        Self::classify(path, |ext| raw_extensions.iter().any(|r| r == ext))
    }

    fn classify(path: &Path, is_raw: impl Fn(&str) -> bool) -> Option<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)?;
        let ext = ext.as_str();
        if is_raw(ext) {
            Some(Self::Raw)
        } else if RASTER_EXTENSIONS.contains(&ext) {
            Some(Self::Raster)
        } else if VIDEO_EXTENSIONS.contains(&ext) {
            Some(Self::Video)
        } else {
            None
        }
    }

    /// MIME type recorded on import.
    #[must_use]
    pub fn content_type(self, path: &Path) -> &'static str {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        match (self, ext.as_str()) {
            (Self::Raster, "jpg" | "jpeg") => "image/jpeg",
            (Self::Raster, "png") => "image/png",
            (Self::Raster, "tif" | "tiff") => "image/tiff",
            (Self::Raster, "webp") => "image/webp",
            (Self::Raster, "bmp") => "image/bmp",
            (Self::Raster, "gif") => "image/gif",
            (Self::Raster | Self::Raw, _) => "image/x-raw",
            (Self::Video, "mov") => "video/quicktime",
            (Self::Video, _) => "video/mp4",
        }
    }
}

/// Collects importable files from files and directories, sorted by path.
/// `raw_extensions` are the loader's RAW extensions.
#[must_use]
pub fn collect_media_files(
    paths: &[PathBuf],
    recursive: bool,
    raw_extensions: &[String],
) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_file() {
            if MediaKind::with_raw_extensions(path, raw_extensions).is_some() {
                files.push(path.clone());
            } else {
                warn!("Unsupported file type: {}", path.display());
            }
        } else if path.is_dir() {
            collect_from_dir(path, recursive, raw_extensions, &mut files);
        } else {
            warn!("Path does not exist: {}", path.display());
        }
    }
    files.sort();
    files
}

fn collect_from_dir(dir: &Path, recursive: bool, raw_extensions: &[String], files: &mut Vec<PathBuf>) {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            warn!("Failed to read directory {}: {e}", dir.display());
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file() && MediaKind::with_raw_extensions(&path, raw_extensions).is_some() {
            files.push(path);
        } else if path.is_dir() && recursive {
            collect_from_dir(&path, recursive, raw_extensions, files);
        }
    }
}
