//! Grayscale image primitives used by the defect detectors.
//!
//! Everything here works on `image::GrayImage` and returns owned buffers.
//! Binary masks use 255 for foreground and 0 for background.

mod contours;
mod filters;
mod threshold;

pub use contours::{find_blobs, BlobShape};
pub use filters::{clahe, laplacian_variance, median_filter, region_stats, RegionStats};
pub use threshold::{
    adaptive_threshold_below, close, otsu_level, threshold_at_most, threshold_below, union,
};

/// Reflect-101 border handling: `-1 -> 1`, `n -> n - 2`.
#[inline]
pub(crate) fn reflect101(index: i64, len: i64) -> i64 {
    if len <= 1 {
        return 0;
    }
    let mut i = index;
    if i < 0 {
        i = -i;
    }
    if i >= len {
        i = 2 * len - 2 - i;
    }
    i.clamp(0, len - 1)
}
