//! Model file location, listing and download.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tech_sort_core::inference::ModelPaths;
use tracing::{debug, info};

/// A weight file the closed-eyes backend needs.
#[derive(Debug, Clone, Copy)]
pub struct ModelInfo {
    pub name: &'static str,
    pub filename: &'static str,
}

/// Known models.
pub const MODELS: &[ModelInfo] = &[
    ModelInfo {
        name: "face",
        filename: "blazeface.safetensors",
    },
    ModelInfo {
        name: "eye_state",
        filename: "eye_state.safetensors",
    },
    ModelInfo {
        name: "smile",
        filename: "smile.safetensors",
    },
];

/// State of one model file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelStatus {
    pub name: &'static str,
    pub path: PathBuf,
    /// Hex sha256 of the file, `None` when it is not installed.
    pub sha256: Option<String>,
}

impl ModelStatus {
    #[must_use]
    pub const fn installed(&self) -> bool {
        self.sha256.is_some()
    }
}

/// Returns the models directory.
///
/// `overridden` wins; otherwise `XDG_DATA_HOME/tech-sort/models` or
/// `~/.local/share/tech-sort/models`.
#[must_use]
pub fn models_dir(overridden: Option<&Path>) -> PathBuf {
    overridden.map_or_else(
        || {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("tech-sort")
                .join("models")
        },
        Path::to_path_buf,
    )
}

/// Weight paths for the Candle detector inside `dir`.
#[must_use]
pub fn model_paths(dir: &Path) -> ModelPaths {
    ModelPaths {
        face: dir.join(MODELS[0].filename),
        eye_state: dir.join(MODELS[1].filename),
        smile: dir.join(MODELS[2].filename),
    }
}

/// Whether every known model file exists in `dir`.
#[must_use]
pub fn all_models_installed(dir: &Path) -> bool {
    MODELS.iter().all(|m| dir.join(m.filename).is_file())
}

/// Lists known models with their digests.
///
/// # Errors
///
/// Returns an error if an existing model file cannot be read.
pub fn list_models(dir: &Path) -> Result<Vec<ModelStatus>> {
    MODELS
        .iter()
        .map(|m| {
            let path = dir.join(m.filename);
            let sha256 = if path.is_file() {
                Some(file_digest(&path)?)
            } else {
                None
            };
            Ok(ModelStatus {
                name: m.name,
                path,
                sha256,
            })
        })
        .collect()
}

/// Downloads every missing model from `base_url/<filename>` into `dir`.
///
/// Files that already exist are left alone. Returns the resulting status of
/// every known model.
///
/// # Errors
///
/// Returns an error if the directory cannot be created, a download fails, or
/// a file cannot be written.
pub fn fetch_models(dir: &Path, base_url: &str) -> Result<Vec<ModelStatus>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create models directory {}", dir.display()))?;

    for model in MODELS {
        let path = dir.join(model.filename);
        if path.is_file() {
            debug!("Model {} already exists", model.name);
            continue;
        }
        download(model, base_url, &path)?;
    }

    list_models(dir)
}

fn download(model: &ModelInfo, base_url: &str, path: &Path) -> Result<()> {
    let url = format!("{}/{}", base_url.trim_end_matches('/'), model.filename);
    info!("Downloading model {} from {url}", model.name);

    let response = reqwest::blocking::get(&url)
        .with_context(|| format!("Failed to download {}", model.name))?;
    if !response.status().is_success() {
        anyhow::bail!("Download of {} failed with status: {}", model.name, response.status());
    }
    let bytes = response
        .bytes()
        .with_context(|| format!("Failed to read response for {}", model.name))?;

    // Written under a temporary name so an interrupted download never looks installed.
    let partial = path.with_extension("partial");
    fs::write(&partial, &bytes).with_context(|| format!("Failed to write {}", partial.display()))?;
    fs::rename(&partial, path).with_context(|| format!("Failed to install {}", path.display()))?;

    info!(
        "Downloaded {} ({} bytes, sha256 {})",
        model.name,
        bytes.len(),
        hex_digest(&bytes)
    );
    Ok(())
}

fn hex_digest(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn file_digest(path: &Path) -> Result<String> {
    let mut file =
        fs::File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
