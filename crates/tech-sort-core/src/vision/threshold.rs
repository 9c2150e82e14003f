//! Binarization and morphology.

use image::{GrayImage, Luma};

const ON: Luma<u8> = Luma([255]);
const OFF: Luma<u8> = Luma([0]);

fn mask_from(gray: &GrayImage, keep: impl Fn(u32, u32, u8) -> bool) -> GrayImage {
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if keep(x, y, gray.get_pixel(x, y).0[0]) {
            ON
        } else {
            OFF
        }
    })
}

/// Marks pixels strictly darker than `level`.
#[must_use]
pub fn threshold_below(gray: &GrayImage, level: u8) -> GrayImage {
    mask_from(gray, |_, _, v| v < level)
}

/// Marks pixels at or below `level`.
#[must_use]
pub fn threshold_at_most(gray: &GrayImage, level: u8) -> GrayImage {
    mask_from(gray, |_, _, v| v <= level)
}

/// Marks pixels darker than their local mean minus `offset`.
///
/// The mean is taken over a `(2 * radius + 1)` square window clipped to the
/// image.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn adaptive_threshold_below(gray: &GrayImage, radius: u32, offset: f64) -> GrayImage {
    let (w, h) = gray.dimensions();
    let stride = w as usize + 1;
    // Summed-area table with a zero row and column in front.
    let mut integral = vec![0u64; stride * (h as usize + 1)];
    for y in 0..h as usize {
        let mut row = 0u64;
        for x in 0..w as usize {
            #[allow(clippy::cast_possible_truncation)]
            let v = gray.get_pixel(x as u32, y as u32).0[0];
            row += u64::from(v);
            integral[(y + 1) * stride + x + 1] = integral[y * stride + x + 1] + row;
        }
    }

    mask_from(gray, |x, y, v| {
        let x0 = x.saturating_sub(radius) as usize;
        let y0 = y.saturating_sub(radius) as usize;
        let x1 = (x + radius + 1).min(w) as usize;
        let y1 = (y + radius + 1).min(h) as usize;
        let sum = integral[y1 * stride + x1] + integral[y0 * stride + x0]
            - integral[y0 * stride + x1]
            - integral[y1 * stride + x0];
        let count = ((x1 - x0) * (y1 - y0)) as f64;
        f64::from(v) < sum as f64 / count - offset
    })
}

/// Otsu's threshold: the level maximizing between-class variance.
///
/// Returns 0 when the image has a single intensity.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn otsu_level(gray: &GrayImage) -> u8 {
    let mut hist = [0u64; 256];
    for p in gray.pixels() {
        hist[p.0[0] as usize] += 1;
    }
    let total: u64 = hist.iter().sum();
    if total == 0 {
        return 0;
    }
    let sum_all: f64 = hist
        .iter()
        .enumerate()
        .map(|(i, &n)| i as f64 * n as f64)
        .sum();

    let mut best_level = 0u8;
    let mut best_var = 0.0;
    let mut weight_bg = 0u64;
    let mut sum_bg = 0.0;
    for (level, &count) in hist.iter().enumerate() {
        weight_bg += count;
        if weight_bg == 0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0 {
            break;
        }
        sum_bg += level as f64 * count as f64;
        let mean_bg = sum_bg / weight_bg as f64;
        let mean_fg = (sum_all - sum_bg) / weight_fg as f64;
        let between = weight_bg as f64 * weight_fg as f64 * (mean_bg - mean_fg).powi(2);
        if between > best_var {
            best_var = between;
            best_level = level as u8;
        }
    }
    best_level
}

/// Pixel-wise OR of equally sized masks.
#[must_use]
pub fn union(masks: &[&GrayImage]) -> GrayImage {
    let Some(first) = masks.first() else {
        return GrayImage::new(0, 0);
    };
    mask_from(first, |x, y, _| {
        masks.iter().any(|m| m.get_pixel(x, y).0[0] != 0)
    })
}

/// Morphological closing (dilate then erode) with a square element.
///
/// Pixels outside the image never affect the result.
#[must_use]
pub fn close(mask: &GrayImage, radius: u32) -> GrayImage {
    if radius == 0 {
        return mask.clone();
    }
    let dilated = sweep(mask, radius, true);
    sweep(&dilated, radius, false)
}

fn sweep(mask: &GrayImage, radius: u32, dilate: bool) -> GrayImage {
    let (w, h) = mask.dimensions();
    mask_from(mask, |x, y, _| {
        let x0 = x.saturating_sub(radius);
        let y0 = y.saturating_sub(radius);
        let x1 = (x + radius).min(w.saturating_sub(1));
        let y1 = (y + radius).min(h.saturating_sub(1));
        let mut window = (y0..=y1).flat_map(|yy| (x0..=x1).map(move |xx| (xx, yy)));
        if dilate {
            window.any(|(xx, yy)| mask.get_pixel(xx, yy).0[0] != 0)
        } else {
            window.all(|(xx, yy)| mask.get_pixel(xx, yy).0[0] != 0)
        }
    })
}
