//! Image decoding port.

use crate::domain::LoadOutcome;

/// Turns an object body into a bounded grayscale raster.
pub trait ImageDecoder: Send + Sync {
    /// Decodes `blob`, using `file_name` only to pick the RAW or raster path.
    ///
    /// Never fails: anything that cannot be decoded within the configured
    /// limits comes back as [`LoadOutcome::Skipped`].
    fn load_bounded(&self, blob: &[u8], file_name: &str, declared_size: u64) -> LoadOutcome;
}
