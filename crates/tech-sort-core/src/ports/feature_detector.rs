//! Face, eye and smile detection port.

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::domain::Rect;

/// A candidate box returned by a feature detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Box in the coordinates of the raster that was searched.
    pub rect: Rect,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f32,
}

impl Detection {
    #[must_use]
    pub const fn new(rect: Rect, confidence: f32) -> Self {
        Self { rect, confidence }
    }
}

/// Opaque face, eye and smile detection capability.
///
/// Each call searches `region` of `frame` and returns boxes in `frame`
/// coordinates.
pub trait FeatureDetector: Send + Sync {
    /// Finds frontal faces.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying model fails.
    fn detect_faces(&self, frame: &GrayImage) -> anyhow::Result<Vec<Detection>>;

    /// Finds open eyes inside `region`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying model fails.
    fn detect_eyes(&self, frame: &GrayImage, region: Rect) -> anyhow::Result<Vec<Detection>>;

    /// Finds smiles inside `region`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying model fails.
    fn detect_smiles(&self, frame: &GrayImage, region: Rect) -> anyhow::Result<Vec<Detection>>;
}
