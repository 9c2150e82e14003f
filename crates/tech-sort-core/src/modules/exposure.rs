//! Exposure analysis modules.
//!
//! Overexposure and underexposure are separate checks sharing one
//! luminance histogram: a photo is rejected when too large a share of its
//! pixels sits past a clipping level.

use tracing::debug;

use crate::domain::{
    DecodedImage, Defect, DefectDetails, DefectDetector, ExposureDetails, RejectReason,
};

/// Configuration for exposure analysis.
#[derive(Debug, Clone)]
pub struct ExposureConfig {
    /// Pixels brighter than this count as blown highlights.
    pub highlight_level: u8,
    /// Reject as overexposed when the highlight share exceeds this.
    pub max_highlight_fraction: f64,
    /// Pixels darker than this count as crushed shadows.
    pub shadow_level: u8,
    /// Reject as underexposed when the shadow share exceeds this.
    pub max_shadow_fraction: f64,
}

impl Default for ExposureConfig {
    fn default() -> Self {
        Self {
            highlight_level: 240,
            max_highlight_fraction: 0.30,
            shadow_level: 30,
            max_shadow_fraction: 0.40,
        }
    }
}

/// 256-bin histogram of luminance values.
#[derive(Debug, Clone)]
pub struct Histogram {
    bins: [u64; 256],
    total: u64,
}

impl Histogram {
    /// Compute histogram from grayscale image.
    #[must_use]
    pub fn from_luma(image: &image::GrayImage) -> Self {
        let mut bins = [0u64; 256];
        for pixel in image.pixels() {
            bins[usize::from(pixel.0[0])] += 1;
        }
        let total = bins.iter().sum();
        Self { bins, total }
    }

    /// Returns the total pixel count.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.total
    }

    /// Calculate percentile value (0.0-1.0 → luminance 0-255).
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    #[must_use]
    pub fn percentile(&self, p: f64) -> u8 {
        if self.total == 0 {
            return 0;
        }
        let target = (self.total as f64 * p).round() as u64;
        let mut cumulative = 0u64;
        for (i, &count) in self.bins.iter().enumerate() {
            cumulative += count;
            if cumulative >= target {
                return i as u8;
            }
        }
        255
    }

    /// Calculate mean luminance.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn mean(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let sum: u64 = self
            .bins
            .iter()
            .enumerate()
            .map(|(i, &count)| (i as u64) * count)
            .sum();
        sum as f64 / self.total as f64
    }

    /// Count pixels strictly darker than `level`.
    #[must_use]
    pub fn count_darker(&self, level: u8) -> u64 {
        self.bins[..usize::from(level)].iter().sum()
    }

    /// Count pixels strictly brighter than `level`.
    #[must_use]
    pub fn count_brighter(&self, level: u8) -> u64 {
        self.bins[usize::from(level) + 1..].iter().sum()
    }

    /// Share of pixels strictly darker than `level`.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn fraction_darker(&self, level: u8) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.count_darker(level) as f64 / self.total as f64
    }

    /// Share of pixels strictly brighter than `level`.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn fraction_brighter(&self, level: u8) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.count_brighter(level) as f64 / self.total as f64
    }
}

/// Which end of the histogram a module watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExposureDirection {
    Over,
    Under,
}

/// Exposure check for one direction.
pub struct ExposureModule {
    config: ExposureConfig,
    direction: ExposureDirection,
}

impl ExposureModule {
    #[must_use]
    pub const fn new(config: ExposureConfig, direction: ExposureDirection) -> Self {
        Self { config, direction }
    }

    /// Overexposure check.
    #[must_use]
    pub const fn over(config: ExposureConfig) -> Self {
        Self::new(config, ExposureDirection::Over)
    }

    /// Underexposure check.
    #[must_use]
    pub const fn under(config: ExposureConfig) -> Self {
        Self::new(config, ExposureDirection::Under)
    }

    #[must_use]
    pub const fn config(&self) -> &ExposureConfig {
        &self.config
    }

    /// Measures the clipped share without deciding.
    #[must_use]
    pub fn measure(&self, histogram: &Histogram) -> ExposureDetails {
        match self.direction {
            ExposureDirection::Over => ExposureDetails {
                fraction: histogram.fraction_brighter(self.config.highlight_level),
                level: self.config.highlight_level,
                max_fraction: self.config.max_highlight_fraction,
            },
            ExposureDirection::Under => ExposureDetails {
                fraction: histogram.fraction_darker(self.config.shadow_level),
                level: self.config.shadow_level,
                max_fraction: self.config.max_shadow_fraction,
            },
        }
    }
}

impl DefectDetector for ExposureModule {
    fn name(&self) -> &'static str {
        match self.direction {
            ExposureDirection::Over => "overexposure",
            ExposureDirection::Under => "underexposure",
        }
    }

    fn reason(&self) -> RejectReason {
        match self.direction {
            ExposureDirection::Over => RejectReason::Overexposed,
            ExposureDirection::Under => RejectReason::Underexposed,
        }
    }

    fn detect(&self, image: &DecodedImage) -> anyhow::Result<Option<Defect>> {
        let histogram = Histogram::from_luma(&image.gray);
        let details = self.measure(&histogram);
        debug!(
            module = self.name(),
            fraction = details.fraction,
            mean = histogram.mean(),
            median = histogram.percentile(0.5),
            "exposure check"
        );

        if details.fraction > details.max_fraction {
            return Ok(Some(Defect::new(
                self.reason(),
                DefectDetails::Exposure(details),
            )));
        }
        Ok(None)
    }
}

#[cfg(test)]
#[allow(clippy::cast_possible_truncation)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn uniform(value: u8) -> DecodedImage {
        DecodedImage::from_gray(GrayImage::from_pixel(100, 100, Luma([value])))
    }

    /// `count` pixels of `value` in a 100x100 image of mid-gray.
    fn with_share(value: u8, count: u32) -> DecodedImage {
        DecodedImage::from_gray(GrayImage::from_fn(100, 100, |x, y| {
            if y * 100 + x < count {
                Luma([value])
            } else {
                Luma([128])
            }
        }))
    }

    #[test]
    fn test_default_config() {
        let config = ExposureConfig::default();
        assert_eq!(config.highlight_level, 240);
        assert!((config.max_highlight_fraction - 0.30).abs() < f64::EPSILON);
        assert_eq!(config.shadow_level, 30);
        assert!((config.max_shadow_fraction - 0.40).abs() < f64::EPSILON);
    }

    #[test]
    fn test_module_names_and_reasons() {
        let over = ExposureModule::over(ExposureConfig::default());
        let under = ExposureModule::under(ExposureConfig::default());
        assert_eq!(over.name(), "overexposure");
        assert_eq!(under.name(), "underexposure");
        assert_eq!(over.reason(), RejectReason::Overexposed);
        assert_eq!(under.reason(), RejectReason::Underexposed);
    }

    #[test]
    fn test_histogram_from_uniform() {
        let mut img = GrayImage::new(256, 1);
        for (x, _, pixel) in img.enumerate_pixels_mut() {
            pixel.0[0] = x as u8;
        }

        let hist = Histogram::from_luma(&img);
        assert_eq!(hist.total(), 256);
        for count in hist.bins {
            assert_eq!(count, 1);
        }
    }

    #[test]
    fn test_histogram_percentiles() {
        let mut img = GrayImage::new(256, 100);
        for (x, _, pixel) in img.enumerate_pixels_mut() {
            pixel.0[0] = x as u8;
        }

        let hist = Histogram::from_luma(&img);
        let p50 = hist.percentile(0.5);
        assert!(p50 > 120 && p50 < 136, "p50 should be ~128, got {p50}");
        assert_eq!(hist.percentile(0.0), 0);
        assert_eq!(hist.percentile(1.0), 255);
    }

    #[test]
    fn test_strict_level_comparisons() {
        let img = GrayImage::from_fn(4, 1, |x, _| Luma([[29, 30, 240, 241][x as usize]]));
        let hist = Histogram::from_luma(&img);
        assert_eq!(hist.count_darker(30), 1);
        assert_eq!(hist.count_brighter(240), 1);
        assert_eq!(hist.count_brighter(255), 0);
        assert_eq!(hist.count_darker(0), 0);
    }

    #[test]
    fn test_empty_histogram() {
        let hist = Histogram {
            bins: [0u64; 256],
            total: 0,
        };
        assert_eq!(hist.percentile(0.5), 0);
        assert!(hist.mean().abs() < f64::EPSILON);
        assert!(hist.fraction_darker(128).abs() < f64::EPSILON);
        assert!(hist.fraction_brighter(128).abs() < f64::EPSILON);
    }

    #[test]
    fn test_white_image_is_overexposed() {
        let over = ExposureModule::over(ExposureConfig::default());
        let defect = over.detect(&uniform(255)).unwrap().unwrap();
        assert_eq!(defect.reason, RejectReason::Overexposed);
        assert!(ExposureModule::under(ExposureConfig::default())
            .detect(&uniform(255))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_black_image_is_underexposed() {
        let under = ExposureModule::under(ExposureConfig::default());
        let defect = under.detect(&uniform(0)).unwrap().unwrap();
        assert_eq!(defect.reason, RejectReason::Underexposed);
        match defect.details {
            DefectDetails::Exposure(details) => {
                assert!((details.fraction - 1.0).abs() < f64::EPSILON);
            }
            other => panic!("unexpected details {other:?}"),
        }
    }

    #[test]
    fn test_mid_gray_passes_both() {
        let img = uniform(128);
        let config = ExposureConfig::default();
        assert!(ExposureModule::over(config.clone()).detect(&img).unwrap().is_none());
        assert!(ExposureModule::under(config).detect(&img).unwrap().is_none());
    }

    #[test]
    fn test_highlight_share_boundary() {
        let over = ExposureModule::over(ExposureConfig::default());
        // Exactly 30% is not more than 30%.
        assert!(over.detect(&with_share(250, 3_000)).unwrap().is_none());
        assert!(over.detect(&with_share(250, 3_001)).unwrap().is_some());
    }

    #[test]
    fn test_shadow_share_boundary() {
        let under = ExposureModule::under(ExposureConfig::default());
        assert!(under.detect(&with_share(10, 4_000)).unwrap().is_none());
        assert!(under.detect(&with_share(10, 4_001)).unwrap().is_some());
    }

    #[test]
    fn test_level_pixels_do_not_count() {
        let config = ExposureConfig::default();
        assert!(ExposureModule::over(config.clone())
            .detect(&uniform(240))
            .unwrap()
            .is_none());
        assert!(ExposureModule::under(config).detect(&uniform(30)).unwrap().is_none());
    }

    #[test]
    fn test_1x1_image() {
        let img = uniform(128);
        let tiny = DecodedImage::from_gray(GrayImage::from_pixel(1, 1, Luma([128])));
        let over = ExposureModule::over(ExposureConfig::default());
        assert!(over.detect(&tiny).is_ok());
        assert!(over.detect(&img).is_ok());
    }
}
