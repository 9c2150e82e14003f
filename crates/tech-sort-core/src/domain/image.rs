//! Decoded rasters handed to the detectors.

use image::GrayImage;
use serde::{Deserialize, Serialize};

/// Axis-aligned pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle covering a whole `width` x `height` raster.
    #[must_use]
    pub const fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    #[must_use]
    pub const fn right(&self) -> u32 {
        self.x + self.width
    }

    #[must_use]
    pub const fn bottom(&self) -> u32 {
        self.y + self.height
    }

    #[must_use]
    pub const fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Intersection with a `width` x `height` raster.
    #[must_use]
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let x = self.x.min(width);
        let y = self.y.min(height);
        Self::new(
            x,
            y,
            self.right().min(width) - x,
            self.bottom().min(height) - y,
        )
    }

    /// Sub-rectangle given in fractions of this one's size.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn fraction(&self, left: f32, top: f32, right: f32, bottom: f32) -> Self {
        let w = self.width as f32;
        let h = self.height as f32;
        let x0 = (w * left).round() as u32;
        let y0 = (h * top).round() as u32;
        let x1 = ((w * right).round() as u32).max(x0);
        let y1 = ((h * bottom).round() as u32).max(y0);
        Self::new(self.x + x0, self.y + y0, x1 - x0, y1 - y0)
    }
}

/// How the loader obtained the raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeOrigin {
    /// Content-sniffed codec.
    Raster,
    /// Second codec after the first one failed.
    Fallback,
    /// JPEG preview embedded in a RAW container.
    RawPreview,
    /// Half-resolution demosaic of RAW sensor data.
    RawDemosaic,
}

/// A normalized image: 8-bit grayscale, longer edge bounded.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    /// Grayscale raster all detectors work on.
    pub gray: GrayImage,
    /// Dimensions before normalization.
    pub source_width: u32,
    pub source_height: u32,
    pub origin: DecodeOrigin,
}

impl DecodedImage {
    #[must_use]
    pub fn new(gray: GrayImage, source_width: u32, source_height: u32, origin: DecodeOrigin) -> Self {
        Self {
            gray,
            source_width,
            source_height,
            origin,
        }
    }

    /// Wraps an already normalized raster.
    #[must_use]
    pub fn from_gray(gray: GrayImage) -> Self {
        let (w, h) = gray.dimensions();
        Self::new(gray, w, h, DecodeOrigin::Raster)
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.gray.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.gray.height()
    }
}

/// Why the loader gave up on a photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// The object exceeds the byte ceiling.
    Oversized { size: u64, limit: u64 },
    /// No codec produced a raster.
    Undecodable,
    /// The object could not be fetched from the blob store.
    Unreadable,
}

/// Result of a bounded load.
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    Decoded(DecodedImage),
    Skipped(SkipReason),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_fraction_upper_middle() {
        let face = Rect::new(100, 50, 200, 200);
        let eyes = face.fraction(0.0, 0.25, 1.0, 0.5);
        assert_eq!(eyes, Rect::new(100, 100, 200, 50));
    }

    #[test]
    fn test_rect_clamp() {
        let rect = Rect::new(90, 90, 30, 30).clamp_to(100, 100);
        assert_eq!(rect, Rect::new(90, 90, 10, 10));
        assert!(Rect::new(200, 0, 10, 10).clamp_to(100, 100).is_empty());
    }
}
