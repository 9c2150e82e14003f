//! Bounded image decoding.
//!
//! Turns an object body into the small grayscale raster the detectors work
//! on. Every path is bounded: a byte ceiling before decoding, allocation
//! limits inside the codecs, and a longer-edge cap on the result.

use std::io::Cursor;

use image::{imageops, DynamicImage, GrayImage, ImageFormat, ImageReader, Limits};
use tech_sort_core::domain::{DecodeOrigin, DecodedImage, LoadOutcome, SkipReason};
use tech_sort_core::ports::ImageDecoder;
use tracing::debug;

use crate::raw;

/// Camera RAW extensions rawloader handles. Import classifies files with the
/// same table.
pub const RAW_EXTENSIONS: &[&str] = &["cr2", "nef", "arw", "dng", "raw", "raf", "orf", "rw2"];

/// Limits and format routing for [`BoundedDecoder`].
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Objects above this size are skipped without decoding.
    pub max_object_bytes: u64,
    /// Longer edge of the normalized raster.
    pub max_edge: u32,
    /// Lower-case extensions routed to the RAW path.
    pub raw_extensions: Vec<String>,
    /// Allocation ceiling handed to the codecs. Kept under the 256 MiB
    /// working set so the blob and the decoded frame fit together.
    pub max_alloc_bytes: u64,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_object_bytes: 35 * 1024 * 1024,
            max_edge: 800,
            raw_extensions: RAW_EXTENSIONS
                .iter()
                .map(ToString::to_string)
                .collect(),
            max_alloc_bytes: 192 * 1024 * 1024,
        }
    }
}

/// The image loader: raster codecs with one fallback, RAW previews and a
/// half-resolution RAW demosaic, EXIF orientation and downscaling.
#[derive(Debug, Clone, Default)]
pub struct BoundedDecoder {
    config: DecoderConfig,
}

impl BoundedDecoder {
    #[must_use]
    pub const fn new(config: DecoderConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub(crate) fn limits(&self) -> Limits {
        let mut limits = Limits::default();
        limits.max_alloc = Some(self.config.max_alloc_bytes);
        limits
    }

    fn is_raw(&self, ext: Option<&str>) -> bool {
        ext.is_some_and(|ext| self.config.raw_extensions.iter().any(|r| r == ext))
    }

    /// Sniffed codec first, then the extension's codec or an embedded JPEG.
    fn decode_raster(&self, blob: &[u8], ext: Option<&str>) -> Option<(DynamicImage, DecodeOrigin)> {
        let sniffed = match ImageReader::new(Cursor::new(blob)).with_guessed_format() {
            Ok(mut reader) => {
                let format = reader.format();
                reader.limits(self.limits());
                match reader.decode() {
                    Ok(img) => return Some((img, DecodeOrigin::Raster)),
                    Err(e) => {
                        debug!(?format, "primary decode failed: {e}");
                        format
                    }
                }
            }
            Err(e) => {
                debug!("format sniffing failed: {e}");
                None
            }
        };

        match ext.and_then(ImageFormat::from_extension) {
            Some(format) if Some(format) != sniffed => {
                let mut reader = ImageReader::with_format(Cursor::new(blob), format);
                reader.limits(self.limits());
                match reader.decode() {
                    Ok(img) => Some((img, DecodeOrigin::Fallback)),
                    Err(e) => {
                        debug!(?format, "fallback decode failed: {e}");
                        None
                    }
                }
            }
            _ => raw::embedded_preview(blob, &self.limits())
                .map(|img| (DynamicImage::ImageLuma8(img), DecodeOrigin::Fallback)),
        }
    }

    fn decode_raw(&self, blob: &[u8]) -> Option<(DynamicImage, DecodeOrigin)> {
        if let Some(preview) = raw::embedded_preview(blob, &self.limits()) {
            return Some((DynamicImage::ImageLuma8(preview), DecodeOrigin::RawPreview));
        }
        raw::demosaic_half(blob).map(|gray| (DynamicImage::ImageLuma8(gray), DecodeOrigin::RawDemosaic))
    }

    /// Grayscale, upright, longer edge at most `max_edge`.
    ///
    /// The full-resolution frame is consumed by the downscale; conversion and
    /// rotation only ever see the small raster.
    fn normalize(&self, img: DynamicImage, orientation: u32, origin: DecodeOrigin) -> DecodedImage {
        let (source_width, source_height) = (img.width(), img.height());
        let small = fit_within(img, self.config.max_edge);
        let gray = orient(small.into_luma8(), orientation);
        DecodedImage::new(gray, source_width, source_height, origin)
    }
}

impl ImageDecoder for BoundedDecoder {
    fn load_bounded(&self, blob: &[u8], file_name: &str, declared_size: u64) -> LoadOutcome {
        let size = declared_size.max(blob.len() as u64);
        if size > self.config.max_object_bytes {
            return LoadOutcome::Skipped(SkipReason::Oversized {
                size,
                limit: self.config.max_object_bytes,
            });
        }

        let ext = extension(file_name);
        let decoded = if self.is_raw(ext.as_deref()) {
            self.decode_raw(blob)
        } else {
            self.decode_raster(blob, ext.as_deref())
        };

        match decoded {
            Some((img, origin)) => {
                let image = self.normalize(img, exif_orientation(blob), origin);
                debug!(
                    file_name,
                    ?origin,
                    width = image.width(),
                    height = image.height(),
                    "decoded"
                );
                LoadOutcome::Decoded(image)
            }
            None => LoadOutcome::Skipped(SkipReason::Undecodable),
        }
    }
}

/// Lower-case extension of a file name.
pub(crate) fn extension(file_name: &str) -> Option<String> {
    std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
}

/// Pixel dimensions from a raster header, without decoding the body.
#[must_use]
pub fn probe_dimensions(blob: &[u8]) -> Option<(u32, u32)> {
    ImageReader::new(Cursor::new(blob))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

/// EXIF orientation tag (1..=8), `1` when absent or unreadable.
fn exif_orientation(blob: &[u8]) -> u32 {
    exif::Reader::new()
        .read_from_container(&mut Cursor::new(blob))
        .ok()
        .and_then(|exif| {
            exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
                .and_then(|field| field.value.get_uint(0))
        })
        .unwrap_or(1)
}

/// Applies an EXIF orientation so the result is upright.
fn orient(gray: GrayImage, orientation: u32) -> GrayImage {
    match orientation {
        2 => imageops::flip_horizontal(&gray),
        3 => imageops::rotate180(&gray),
        4 => imageops::flip_vertical(&gray),
        5 => imageops::flip_horizontal(&imageops::rotate90(&gray)),
        6 => imageops::rotate90(&gray),
        7 => imageops::flip_horizontal(&imageops::rotate270(&gray)),
        8 => imageops::rotate270(&gray),
        _ => gray,
    }
}

/// Area-averaging downscale so the longer edge is at most `max_edge`.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn fit_within(img: DynamicImage, max_edge: u32) -> DynamicImage {
    let (w, h) = (img.width(), img.height());
    let longer = w.max(h);
    if longer <= max_edge || max_edge == 0 {
        return img;
    }
    let scale = f64::from(max_edge) / f64::from(longer);
    let nw = ((f64::from(w) * scale).round() as u32).clamp(1, max_edge);
    let nh = ((f64::from(h) * scale).round() as u32).clamp(1, max_edge);
    img.thumbnail_exact(nw, nh)
}
