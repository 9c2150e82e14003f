//! Configuration file support for tech-sort.
//!
//! Supports TOML configuration from:
//! - XDG config: `~/.config/tech-sort/config.toml` (lowest priority)
//! - Project-local: `.tech-sort.toml` (searched up directory tree)
//! - CLI flags (highest priority, applied separately)

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tech_sort_adapters::DecoderConfig;
use tech_sort_core::inference::CandleDetectorConfig;
use tech_sort_core::modules::{BlurConfig, EyesConfig, ExposureConfig};
use tech_sort_core::PassConfig;
use tracing::{debug, info, warn};

const MIB: u64 = 1024 * 1024;

/// Top-level configuration structure.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageSection,
    pub pass: PassSection,
    pub loader: LoaderSection,
    pub blur: BlurSection,
    pub exposure: ExposureSection,
    pub eyes: EyesSection,
    pub models: ModelsSection,
    pub output: OutputSection,
}

/// Where the library lives.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// SQLite database file.
    pub db: Option<PathBuf>,
    /// Blob store root directory.
    pub blobs: Option<PathBuf>,
    /// Acting user id.
    pub owner: Option<i64>,
}

/// Defect pass settings.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct PassSection {
    pub batch_size: Option<usize>,
    /// Objects above this many MiB are accepted unread.
    pub max_object_mb: Option<u64>,
    pub rejects_suffix: Option<String>,
}

/// Image loader settings.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct LoaderSection {
    pub max_edge: Option<u32>,
    pub raw_extensions: Option<Vec<String>>,
}

/// Blur detection settings.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct BlurSection {
    /// Laplacian variance below which a photo is blurry.
    pub laplacian_threshold: Option<f64>,
}

/// Exposure analysis settings.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct ExposureSection {
    pub highlight_level: Option<u8>,
    /// Share of highlight pixels (0.0-1.0) above which a photo is overexposed.
    pub max_highlight_fraction: Option<f64>,
    pub shadow_level: Option<u8>,
    /// Share of shadow pixels (0.0-1.0) above which a photo is underexposed.
    pub max_shadow_fraction: Option<f64>,
}

/// Closed-eyes detection settings.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct EyesSection {
    pub enabled: Option<bool>,
    /// Try Metal or CUDA before the CPU.
    pub prefer_gpu: Option<bool>,
    pub min_face_confidence: Option<f32>,
    pub min_smile_confidence: Option<f32>,
    pub eye_with_mean: Option<f64>,
    pub bright_mean: Option<f64>,
    pub contrast_std: Option<f64>,
    pub pupil_with_mean: Option<f64>,
    pub closed_mean_floor: Option<f64>,
}

/// Model settings.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct ModelsSection {
    /// Custom models directory path.
    pub dir: Option<PathBuf>,
    /// Where `models fetch` downloads from.
    pub base_url: Option<String>,
}

/// Output formatting settings.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    /// Pretty-print JSON output.
    pub pretty: Option<bool>,
    /// Show a progress bar on stderr.
    pub progress: Option<bool>,
}

/// Keeps `value` only if `valid` holds, otherwise records a warning.
fn check<T: std::fmt::Debug>(
    value: &mut Option<T>,
    key: &str,
    expected: &str,
    warnings: &mut Vec<String>,
    valid: impl Fn(&T) -> bool,
) {
    if let Some(v) = value.as_ref() {
        if !valid(v) {
            warnings.push(format!("{key} must be {expected}, got {v:?}; ignoring it"));
            *value = None;
        }
    }
}

fn fraction(v: &f64) -> bool {
    (0.0..=1.0).contains(v)
}

fn probability(v: &f32) -> bool {
    (0.0..=1.0).contains(v)
}

fn brightness(v: &f64) -> bool {
    (0.0..=255.0).contains(v)
}

impl AppConfig {
    /// Load configuration from XDG and project-local files.
    ///
    /// Missing files are silently ignored. Invalid values are logged as
    /// warnings and dropped.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(xdg_path) = xdg_config_path() {
            if xdg_path.exists() {
                info!("Loading XDG config: {}", xdg_path.display());
                if let Some(xdg_config) = load_file(&xdg_path) {
                    config = xdg_config;
                }
            } else {
                debug!("XDG config not found: {}", xdg_path.display());
            }
        }

        if let Some(project_path) = find_project_config() {
            info!("Loading project config: {}", project_path.display());
            if let Some(project_config) = load_file(&project_path) {
                config.merge(project_config);
            }
        }

        for warning in config.validate() {
            warn!("{warning}");
        }

        config
    }

    /// Drops out-of-range values and returns one warning per dropped value.
    pub fn validate(&mut self) -> Vec<String> {
        let mut w = Vec::new();

        check(&mut self.pass.batch_size, "pass.batch_size", "at least 1", &mut w, |v| *v >= 1);
        check(&mut self.pass.max_object_mb, "pass.max_object_mb", "at least 1", &mut w, |v| *v >= 1);
        check(&mut self.pass.rejects_suffix, "pass.rejects_suffix", "non-empty", &mut w, |v| {
            !v.trim().is_empty()
        });
        check(&mut self.loader.max_edge, "loader.max_edge", "at least 32", &mut w, |v| *v >= 32);
        check(&mut self.blur.laplacian_threshold, "blur.laplacian_threshold", "positive", &mut w, |v| {
            *v > 0.0
        });

        let exposure = &mut self.exposure;
        check(&mut exposure.max_highlight_fraction, "exposure.max_highlight_fraction", "0.0-1.0", &mut w, fraction);
        check(&mut exposure.max_shadow_fraction, "exposure.max_shadow_fraction", "0.0-1.0", &mut w, fraction);
        check(&mut exposure.shadow_level, "exposure.shadow_level", "at least 1", &mut w, |v| *v >= 1);
        check(&mut exposure.highlight_level, "exposure.highlight_level", "below 255", &mut w, |v| *v < 255);

        let eyes = &mut self.eyes;
        check(&mut eyes.min_face_confidence, "eyes.min_face_confidence", "0.0-1.0", &mut w, probability);
        check(&mut eyes.min_smile_confidence, "eyes.min_smile_confidence", "0.0-1.0", &mut w, probability);
        check(&mut eyes.eye_with_mean, "eyes.eye_with_mean", "0-255", &mut w, brightness);
        check(&mut eyes.bright_mean, "eyes.bright_mean", "0-255", &mut w, brightness);
        check(&mut eyes.contrast_std, "eyes.contrast_std", "0-255", &mut w, brightness);
        check(&mut eyes.pupil_with_mean, "eyes.pupil_with_mean", "0-255", &mut w, brightness);
        check(&mut eyes.closed_mean_floor, "eyes.closed_mean_floor", "0-255", &mut w, brightness);

        check(&mut self.models.base_url, "models.base_url", "an http(s) URL", &mut w, |v| {
            v.starts_with("http://") || v.starts_with("https://")
        });

        w
    }

    /// Merge another config into this one.
    /// Values from `other` override values in `self` when present.
    pub fn merge(&mut self, other: Self) {
        let Self {
            storage,
            pass,
            loader,
            blur,
            exposure,
            eyes,
            models,
            output,
        } = other;

        self.storage.db = storage.db.or_else(|| self.storage.db.take());
        self.storage.blobs = storage.blobs.or_else(|| self.storage.blobs.take());
        self.storage.owner = storage.owner.or(self.storage.owner);

        self.pass.batch_size = pass.batch_size.or(self.pass.batch_size);
        self.pass.max_object_mb = pass.max_object_mb.or(self.pass.max_object_mb);
        self.pass.rejects_suffix = pass
            .rejects_suffix
            .or_else(|| self.pass.rejects_suffix.take());

        self.loader.max_edge = loader.max_edge.or(self.loader.max_edge);
        self.loader.raw_extensions = loader
            .raw_extensions
            .or_else(|| self.loader.raw_extensions.take());

        self.blur.laplacian_threshold = blur.laplacian_threshold.or(self.blur.laplacian_threshold);

        self.exposure.highlight_level = exposure.highlight_level.or(self.exposure.highlight_level);
        self.exposure.max_highlight_fraction = exposure
            .max_highlight_fraction
            .or(self.exposure.max_highlight_fraction);
        self.exposure.shadow_level = exposure.shadow_level.or(self.exposure.shadow_level);
        self.exposure.max_shadow_fraction = exposure
            .max_shadow_fraction
            .or(self.exposure.max_shadow_fraction);

        self.eyes.enabled = eyes.enabled.or(self.eyes.enabled);
        self.eyes.prefer_gpu = eyes.prefer_gpu.or(self.eyes.prefer_gpu);
        self.eyes.min_face_confidence = eyes.min_face_confidence.or(self.eyes.min_face_confidence);
        self.eyes.min_smile_confidence = eyes
            .min_smile_confidence
            .or(self.eyes.min_smile_confidence);
        self.eyes.eye_with_mean = eyes.eye_with_mean.or(self.eyes.eye_with_mean);
        self.eyes.bright_mean = eyes.bright_mean.or(self.eyes.bright_mean);
        self.eyes.contrast_std = eyes.contrast_std.or(self.eyes.contrast_std);
        self.eyes.pupil_with_mean = eyes.pupil_with_mean.or(self.eyes.pupil_with_mean);
        self.eyes.closed_mean_floor = eyes.closed_mean_floor.or(self.eyes.closed_mean_floor);

        self.models.dir = models.dir.or_else(|| self.models.dir.take());
        self.models.base_url = models.base_url.or_else(|| self.models.base_url.take());

        self.output.pretty = output.pretty.or(self.output.pretty);
        self.output.progress = output.progress.or(self.output.progress);
    }

    fn max_object_bytes(&self) -> u64 {
        self.pass
            .max_object_mb
            .map_or(PassConfig::default().max_object_bytes, |mb| mb.saturating_mul(MIB))
    }

    #[must_use]
    pub fn pass_config(&self) -> PassConfig {
        let defaults = PassConfig::default();
        PassConfig {
            batch_size: self.pass.batch_size.unwrap_or(defaults.batch_size),
            max_object_bytes: self.max_object_bytes(),
            rejects_suffix: self
                .pass
                .rejects_suffix
                .clone()
                .unwrap_or(defaults.rejects_suffix),
        }
    }

    #[must_use]
    pub fn decoder_config(&self) -> DecoderConfig {
        let defaults = DecoderConfig::default();
        DecoderConfig {
            max_object_bytes: self.max_object_bytes(),
            max_edge: self.loader.max_edge.unwrap_or(defaults.max_edge),
            raw_extensions: self.loader.raw_extensions.as_ref().map_or(defaults.raw_extensions, |exts| {
                exts.iter().map(|e| e.trim_start_matches('.').to_lowercase()).collect()
            }),
            ..defaults
        }
    }

    #[must_use]
    pub fn blur_config(&self) -> BlurConfig {
        BlurConfig {
            laplacian_threshold: self
                .blur
                .laplacian_threshold
                .unwrap_or(BlurConfig::default().laplacian_threshold),
        }
    }

    #[must_use]
    pub fn exposure_config(&self) -> ExposureConfig {
        let defaults = ExposureConfig::default();
        ExposureConfig {
            highlight_level: self.exposure.highlight_level.unwrap_or(defaults.highlight_level),
            max_highlight_fraction: self
                .exposure
                .max_highlight_fraction
                .unwrap_or(defaults.max_highlight_fraction),
            shadow_level: self.exposure.shadow_level.unwrap_or(defaults.shadow_level),
            max_shadow_fraction: self
                .exposure
                .max_shadow_fraction
                .unwrap_or(defaults.max_shadow_fraction),
        }
    }

    #[must_use]
    pub fn eyes_config(&self) -> EyesConfig {
        let mut config = EyesConfig::default();
        let eyes = &self.eyes;
        if let Some(v) = eyes.min_smile_confidence {
            config.min_smile_confidence = v;
        }
        let t = &mut config.thresholds;
        t.eye_with_mean = eyes.eye_with_mean.unwrap_or(t.eye_with_mean);
        t.bright_mean = eyes.bright_mean.unwrap_or(t.bright_mean);
        t.contrast_std = eyes.contrast_std.unwrap_or(t.contrast_std);
        t.pupil_with_mean = eyes.pupil_with_mean.unwrap_or(t.pupil_with_mean);
        t.closed_mean_floor = eyes.closed_mean_floor.unwrap_or(t.closed_mean_floor);
        config
    }

    #[must_use]
    pub fn detector_config(&self) -> CandleDetectorConfig {
        let defaults = CandleDetectorConfig::default();
        CandleDetectorConfig {
            min_face_confidence: self
                .eyes
                .min_face_confidence
                .unwrap_or(defaults.min_face_confidence),
            ..defaults
        }
    }
}

/// Get the XDG config file path.
fn xdg_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tech-sort").join("config.toml"))
}

/// Find project-local config by searching up from current directory.
fn find_project_config() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    find_config_in_parents(&cwd)
}

/// Search for `.tech-sort.toml` in the given directory and its parents.
fn find_config_in_parents(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(".tech-sort.toml"))
        .find(|path| path.is_file())
}

/// Load and parse a TOML config file.
fn load_file(path: &Path) -> Option<AppConfig> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return None;
        }
    };

    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            warn!("Failed to parse config file {}: {}", path.display(), e);
            None
        }
    }
}
