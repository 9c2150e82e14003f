//! Synthetic image builders for testing.

use std::io::Cursor;

use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use tech_sort_core::domain::{DecodedImage, Rect};

/// Builder for creating synthetic test images.
///
/// Patterns are chosen so each one lands clearly on one side of a single
/// detector threshold: checkerboards are sharp and mid-toned, uniform fills
/// are blurry, and the exposure fills push one histogram tail past its limit.
pub struct SyntheticImageBuilder;

impl SyntheticImageBuilder {
    // === Sharp ===

    /// Checkerboard of 0 and 255 with 8px cells.
    #[must_use]
    pub fn checkerboard(width: u32, height: u32) -> GrayImage {
        Self::checkerboard_with(width, height, 8, 0, 255)
    }

    /// Checkerboard with custom cell size and tones.
    #[must_use]
    pub fn checkerboard_with(width: u32, height: u32, cell: u32, dark: u8, light: u8) -> GrayImage {
        let cell = cell.max(1);
        GrayImage::from_fn(width, height, |x, y| {
            if (x / cell + y / cell) % 2 == 0 {
                Luma([light])
            } else {
                Luma([dark])
            }
        })
    }

    /// A sharp image with neither histogram tail populated.
    ///
    /// 80/170 checkerboard with 6px cells: Laplacian variance far above 100,
    /// no pixel below 30 or above 240.
    #[must_use]
    pub fn well_exposed_sharp(width: u32, height: u32) -> GrayImage {
        Self::checkerboard_with(width, height, 6, 80, 170)
    }

    // === Blurry ===

    /// Uniform fill; zero Laplacian variance.
    #[must_use]
    pub fn uniform_gray(width: u32, height: u32, value: u8) -> GrayImage {
        GrayImage::from_pixel(width, height, Luma([value]))
    }

    // === Exposure ===

    /// Sharp pattern with `share` of its rows blown out to 255.
    ///
    /// The remaining rows are the 80/170 checkerboard so only the
    /// overexposure check can fire.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn overexposed(width: u32, height: u32, share: f64) -> GrayImage {
        let rows = (f64::from(height) * share).round() as u32;
        let mut img = Self::well_exposed_sharp(width, height);
        for y in 0..rows.min(height) {
            for x in 0..width {
                img.put_pixel(x, y, Luma([255]));
            }
        }
        img
    }

    /// Sharp pattern with `share` of its rows crushed to near black.
    ///
    /// Crushed rows carry a 2..14 checkerboard so the image stays sharp.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn underexposed(width: u32, height: u32, share: f64) -> GrayImage {
        let rows = (f64::from(height) * share).round() as u32;
        let dark = Self::checkerboard_with(width, height, 6, 2, 14);
        let mut img = Self::well_exposed_sharp(width, height);
        for y in 0..rows.min(height) {
            for x in 0..width {
                img.put_pixel(x, y, *dark.get_pixel(x, y));
            }
        }
        img
    }

    // === Faces ===

    /// A sharp frame with a face-sized patch whose eye band is uniformly dark.
    ///
    /// Everything outside `face` is the well-exposed checkerboard. Inside the
    /// face the eye band (rows 25% to 50%, columns 5% to 95%) is filled with
    /// `band_value`; the rest of the face is a softer 110/150 checkerboard.
    #[must_use]
    pub fn face_with_eye_band(width: u32, height: u32, face: Rect, band_value: u8) -> GrayImage {
        let band = Self::eye_band_of(face);
        let skin = Self::checkerboard_with(width, height, 6, 110, 150);
        let mut img = Self::well_exposed_sharp(width, height);
        for y in face.y..face.bottom().min(height) {
            for x in face.x..face.right().min(width) {
                let inside_band =
                    x >= band.x && x < band.right() && y >= band.y && y < band.bottom();
                let value = if inside_band {
                    Luma([band_value])
                } else {
                    *skin.get_pixel(x, y)
                };
                img.put_pixel(x, y, value);
            }
        }
        img
    }

    /// Region [`face_with_eye_band`](Self::face_with_eye_band) darkens.
    #[must_use]
    pub fn eye_band_of(face: Rect) -> Rect {
        face.fraction(0.05, 0.25, 0.95, 0.5)
    }

    // === Wrapping and encoding ===

    /// Wraps a raster as an already normalized decode.
    #[must_use]
    pub fn decoded(gray: GrayImage) -> DecodedImage {
        DecodedImage::from_gray(gray)
    }

    /// PNG bytes of a grayscale raster.
    ///
    /// # Panics
    ///
    /// Panics if the in-memory encoder fails, which only happens for
    /// zero-sized images.
    #[must_use]
    pub fn png(gray: &GrayImage) -> Vec<u8> {
        Self::encode(&DynamicImage::ImageLuma8(gray.clone()), ImageFormat::Png)
    }

    /// JPEG bytes of a grayscale raster.
    ///
    /// # Panics
    ///
    /// See [`png`](Self::png).
    #[must_use]
    pub fn jpeg(gray: &GrayImage) -> Vec<u8> {
        Self::encode(&DynamicImage::ImageLuma8(gray.clone()), ImageFormat::Jpeg)
    }

    /// Bytes of any image in any writable format.
    ///
    /// # Panics
    ///
    /// See [`png`](Self::png).
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        image
            .write_to(&mut out, format)
            .expect("encoding a synthetic image");
        out.into_inner()
    }
}
