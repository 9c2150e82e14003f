//! Camera RAW support: embedded JPEG previews and a half-resolution demosaic.

use std::io::Cursor;

use image::{GrayImage, ImageFormat, ImageReader, Limits, Luma};
use tracing::debug;

/// At most this many JPEG start markers are considered per object.
const MAX_PREVIEW_CANDIDATES: usize = 64;

/// Offsets of `FF D8 FF` start-of-image markers.
fn jpeg_starts(blob: &[u8]) -> Vec<usize> {
    blob.windows(3)
        .enumerate()
        .filter(|(_, w)| w[0] == 0xFF && w[1] == 0xD8 && w[2] == 0xFF)
        .map(|(i, _)| i)
        .take(MAX_PREVIEW_CANDIDATES)
        .collect()
}

/// Decodes the largest embedded JPEG that decodes cleanly.
///
/// Candidates are ranked by the pixel count in their frame header, so a
/// full-size preview wins over the thumbnail nested inside its EXIF block.
pub(crate) fn embedded_preview(blob: &[u8], limits: &Limits) -> Option<GrayImage> {
    let mut candidates: Vec<(u64, usize)> = jpeg_starts(blob)
        .into_iter()
        .filter_map(|start| {
            ImageReader::with_format(Cursor::new(&blob[start..]), ImageFormat::Jpeg)
                .into_dimensions()
                .ok()
                .map(|(w, h)| (u64::from(w) * u64::from(h), start))
        })
        .collect();
    candidates.sort_by(|a, b| b.0.cmp(&a.0));

    for (pixels, start) in candidates {
        let mut reader = ImageReader::with_format(Cursor::new(&blob[start..]), ImageFormat::Jpeg);
        reader.limits(limits.clone());
        match reader.decode() {
            Ok(img) => {
                debug!(offset = start, pixels, "embedded JPEG decoded");
                return Some(img.into_luma8());
            }
            Err(e) => debug!(offset = start, "embedded JPEG rejected: {e}"),
        }
    }
    None
}

/// Sensor samples borrowed from the decoded RAW, read one at a time.
#[derive(Clone, Copy)]
enum Samples<'a> {
    Integer(&'a [u16]),
    Float(&'a [f32]),
}

impl Samples<'_> {
    fn len(self) -> usize {
        match self {
            Self::Integer(values) => values.len(),
            Self::Float(values) => values.len(),
        }
    }

    fn at(self, index: usize) -> f32 {
        match self {
            Self::Integer(values) => f32::from(values[index]),
            Self::Float(values) => values[index],
        }
    }
}

/// Geometry and calibration of one sensor frame.
struct Sensor<'a> {
    samples: Samples<'a>,
    width: usize,
    height: usize,
    cpp: usize,
    /// Top, right, bottom, left.
    crops: [usize; 4],
    black: f32,
    white: f32,
    wb: [f32; 4],
    cfa: &'a rawloader::CFA,
}

/// Half-resolution grayscale demosaic of RAW sensor data.
///
/// Each 2x2 Bayer quad becomes one pixel. Channels are scaled by the camera's
/// as-shot white balance and a fixed 2.2 gamma is applied; there is no
/// auto-brightening.
pub(crate) fn demosaic_half(blob: &[u8]) -> Option<GrayImage> {
    let raw = match rawloader::decode(&mut Cursor::new(blob)) {
        Ok(raw) => raw,
        Err(e) => {
            debug!("RAW decode failed: {e:?}");
            return None;
        }
    };
    let samples = match &raw.data {
        rawloader::RawImageData::Integer(values) => Samples::Integer(values),
        rawloader::RawImageData::Float(values) => Samples::Float(values),
    };
    let black = f32::from(raw.blacklevels[0]);
    let sensor = Sensor {
        samples,
        width: raw.width,
        height: raw.height,
        cpp: raw.cpp,
        crops: raw.crops,
        black,
        white: f32::from(raw.whitelevels[0]).max(black + 1.0),
        wb: white_balance(raw.wb_coeffs),
        cfa: &raw.cfa,
    };
    let gray = bin_half(&sensor)?;
    debug!(
        width = gray.width(),
        height = gray.height(),
        "RAW demosaiced at half resolution"
    );
    Some(gray)
}

/// Bins each 2x2 quad of the cropped sensor area into one gray pixel.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn bin_half(sensor: &Sensor<'_>) -> Option<GrayImage> {
    let Sensor {
        samples,
        width,
        height,
        cpp,
        crops: [top, right, bottom, left],
        black,
        white,
        wb,
        cfa,
    } = *sensor;
    let (x0, y0) = (left, top);
    let x1 = width.saturating_sub(right);
    let y1 = height.saturating_sub(bottom);
    if x1 <= x0 + 1 || y1 <= y0 + 1 || samples.len() < width * height * cpp {
        return None;
    }
    let level = |index: usize| ((samples.at(index) - black) / (white - black)).clamp(0.0, 1.0);

    let out_w = u32::try_from((x1 - x0) / 2).ok()?;
    let out_h = u32::try_from((y1 - y0) / 2).ok()?;
    let gray = if cpp >= 3 {
        GrayImage::from_fn(out_w, out_h, |ox, oy| {
            let (x, y) = (x0 + ox as usize * 2, y0 + oy as usize * 2);
            let base = (y * width + x) * cpp;
            let rgb = [
                level(base) * wb[0],
                level(base + 1) * wb[1],
                level(base + 2) * wb[2],
            ];
            Luma([encode(luma(rgb))])
        })
    } else {
        GrayImage::from_fn(out_w, out_h, |ox, oy| {
            let (x, y) = (x0 + ox as usize * 2, y0 + oy as usize * 2);
            let mut sums = [0.0f32; 3];
            let mut counts = [0u32; 3];
            for (dy, dx) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
                let color = cfa.color_at(y + dy, x + dx);
                let channel = if color == 3 { 1 } else { color.min(2) };
                sums[channel] += level((y + dy) * width + x + dx) * wb[color.min(3)];
                counts[channel] += 1;
            }
            let mean = |c: usize| {
                if counts[c] == 0 {
                    0.0
                } else {
                    sums[c] / counts[c] as f32
                }
            };
            Luma([encode(luma([mean(0), mean(1), mean(2)]))])
        })
    };
    Some(gray)
}

/// As-shot multipliers normalized to green; unusable values become neutral.
fn white_balance(coeffs: [f32; 4]) -> [f32; 4] {
    let usable = |v: f32| v.is_finite() && v > 0.0;
    let green = if usable(coeffs[1]) { coeffs[1] } else { 1.0 };
    let mut out = [1.0; 4];
    for (o, c) in out.iter_mut().zip(coeffs) {
        if usable(c) {
            *o = c / green;
        }
    }
    if !usable(coeffs[3]) {
        out[3] = out[1];
    }
    out
}

fn luma(rgb: [f32; 3]) -> f32 {
    0.299 * rgb[0] + 0.587 * rgb[1] + 0.114 * rgb[2]
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn encode(linear: f32) -> u8 {
    (linear.clamp(0.0, 1.0).powf(1.0 / 2.2) * 255.0).round() as u8
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tech_sort_test_support::SyntheticImageBuilder;

    #[test]
    fn test_jpeg_starts() {
        let blob = [0x00, 0xFF, 0xD8, 0xFF, 0xE0, 0x11, 0xFF, 0xD8, 0x00, 0xFF, 0xD8, 0xFF];
        assert_eq!(jpeg_starts(&blob), vec![1, 9]);
    }

    #[test]
    fn test_largest_preview_wins() {
        let small = SyntheticImageBuilder::jpeg(&SyntheticImageBuilder::uniform_gray(16, 16, 20));
        let large = SyntheticImageBuilder::jpeg(&SyntheticImageBuilder::uniform_gray(64, 48, 200));
        let mut blob = b"header".to_vec();
        blob.extend_from_slice(&small);
        blob.extend_from_slice(b"padding");
        blob.extend_from_slice(&large);

        let preview = embedded_preview(&blob, &Limits::default()).unwrap();
        assert_eq!(preview.dimensions(), (64, 48));
    }

    #[test]
    fn test_no_preview() {
        assert!(embedded_preview(b"plain bytes", &Limits::default()).is_none());
    }

    #[test]
    fn test_white_balance_normalization() {
        let wb = white_balance([2.0, 1.0, 1.5, f32::NAN]);
        assert!((wb[0] - 2.0).abs() < f32::EPSILON);
        assert!((wb[2] - 1.5).abs() < f32::EPSILON);
        assert!((wb[3] - 1.0).abs() < f32::EPSILON);

        let wb = white_balance([f32::NAN, 0.0, 1.0, 1.0]);
        assert!((wb[0] - 1.0).abs() < f32::EPSILON);
        assert!((wb[2] - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_encode_gamma() {
        assert_eq!(encode(0.0), 0);
        assert_eq!(encode(1.0), 255);
        assert!(encode(0.18) > 100);
    }

    fn bayer<'a>(samples: Samples<'a>, cfa: &'a rawloader::CFA, crops: [usize; 4]) -> Sensor<'a> {
        Sensor {
            samples,
            width: 6,
            height: 4,
            cpp: 1,
            crops,
            black: 0.0,
            white: 1000.0,
            wb: [1.0; 4],
            cfa,
        }
    }

    #[test]
    fn test_integer_samples_binned_in_place() {
        let cfa = rawloader::CFA::new("RGGB");
        let values = vec![1000u16; 24];
        let gray = bin_half(&bayer(Samples::Integer(&values), &cfa, [0; 4])).unwrap();
        assert_eq!(gray.dimensions(), (3, 2));
        assert!(gray.pixels().all(|p| p.0[0] == 255));

        let dark = vec![0u16; 24];
        let gray = bin_half(&bayer(Samples::Integer(&dark), &cfa, [0; 4])).unwrap();
        assert!(gray.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn test_float_samples_and_crops() {
        let cfa = rawloader::CFA::new("RGGB");
        let values = vec![250.0f32; 24];
        let gray = bin_half(&bayer(Samples::Float(&values), &cfa, [0, 2, 0, 0])).unwrap();
        assert_eq!(gray.dimensions(), (2, 2));
        assert_eq!(gray.get_pixel(0, 0).0[0], encode(0.25));
    }

    #[test]
    fn test_short_sensor_buffer_is_rejected() {
        let cfa = rawloader::CFA::new("RGGB");
        let values = vec![0u16; 10];
        assert!(bin_half(&bayer(Samples::Integer(&values), &cfa, [0; 4])).is_none());
    }

    #[test]
    fn test_demosaic_rejects_non_raw() {
        assert!(demosaic_half(b"definitely not a raw file").is_none());
    }
}
