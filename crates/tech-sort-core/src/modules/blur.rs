//! Blur detection module.
//!
//! Flags images whose Laplacian variance falls below a fixed sharpness
//! threshold. Flat or out-of-focus frames have little second-derivative
//! energy and score low.

use tracing::debug;

use crate::domain::{BlurDetails, DecodedImage, Defect, DefectDetails, DefectDetector, RejectReason};
use crate::vision::laplacian_variance;

/// Configuration for blur detection.
#[derive(Debug, Clone)]
pub struct BlurConfig {
    /// Images with a Laplacian variance below this are rejected.
    pub laplacian_threshold: f64,
}

impl Default for BlurConfig {
    fn default() -> Self {
        Self {
            laplacian_threshold: 100.0,
        }
    }
}

/// Blur detection module.
pub struct BlurModule {
    config: BlurConfig,
}

impl BlurModule {
    /// Creates a new blur detection module with the given configuration.
    #[must_use]
    pub const fn new(config: BlurConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &BlurConfig {
        &self.config
    }
}

impl Default for BlurModule {
    fn default() -> Self {
        Self::new(BlurConfig::default())
    }
}

impl DefectDetector for BlurModule {
    fn name(&self) -> &'static str {
        "blur"
    }

    fn reason(&self) -> RejectReason {
        RejectReason::Blur
    }

    fn detect(&self, image: &DecodedImage) -> anyhow::Result<Option<Defect>> {
        let variance = laplacian_variance(&image.gray);
        debug!(
            variance,
            threshold = self.config.laplacian_threshold,
            "blur check"
        );

        if variance < self.config.laplacian_threshold {
            return Ok(Some(Defect::new(
                RejectReason::Blur,
                DefectDetails::Blur(BlurDetails {
                    laplacian_variance: variance,
                    threshold: self.config.laplacian_threshold,
                }),
            )));
        }
        Ok(None)
    }
}
