//! Defect detector trait.

use super::{DecodedImage, Defect, RejectReason};

/// A single technical-defect check.
///
/// Detectors see the normalized grayscale raster and either report a defect
/// or nothing. The analyzer runs them in [`RejectReason`] order and stops at
/// the first positive.
pub trait DefectDetector: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// The reason this detector rejects with; fixes its place in the run order.
    fn reason(&self) -> RejectReason;

    /// Examines an image.
    ///
    /// # Errors
    ///
    /// Returns an error if the check could not be carried out. Callers treat
    /// this the same as `Ok(None)`.
    fn detect(&self, image: &DecodedImage) -> anyhow::Result<Option<Defect>>;
}
