//! Smoothing, equalization and statistics.

use image::{GrayImage, Luma};

use super::reflect101;
use crate::domain::Rect;

/// Variance of the 4-neighbour Laplacian over the whole image.
///
/// Uses the `[0 1 0; 1 -4 1; 0 1 0]` kernel with reflect-101 borders. Flat
/// images score 0; sharp detail scores in the hundreds or more.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]
pub fn laplacian_variance(gray: &GrayImage) -> f64 {
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return 0.0;
    }
    let (wi, hi) = (i64::from(w), i64::from(h));
    let px = |x: i64, y: i64| -> f64 {
        let xr = reflect101(x, wi) as u32;
        let yr = reflect101(y, hi) as u32;
        f64::from(gray.get_pixel(xr, yr).0[0])
    };

    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for y in 0..hi {
        for x in 0..wi {
            let response =
                px(x - 1, y) + px(x + 1, y) + px(x, y - 1) + px(x, y + 1) - 4.0 * px(x, y);
            sum += response;
            sum_sq += response * response;
        }
    }
    let n = (wi * hi) as f64;
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}

/// Median filter with a `(2 * radius + 1)` square window and reflect-101 borders.
#[must_use]
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss, clippy::cast_possible_truncation)]
pub fn median_filter(gray: &GrayImage, radius: u32) -> GrayImage {
    let (w, h) = gray.dimensions();
    if radius == 0 || w == 0 || h == 0 {
        return gray.clone();
    }
    let r = i64::from(radius);
    let (wi, hi) = (i64::from(w), i64::from(h));
    let side = (2 * radius + 1) as usize;
    let mut window = Vec::with_capacity(side * side);

    GrayImage::from_fn(w, h, |x, y| {
        window.clear();
        for dy in -r..=r {
            let yy = reflect101(i64::from(y) + dy, hi) as u32;
            for dx in -r..=r {
                let xx = reflect101(i64::from(x) + dx, wi) as u32;
                window.push(gray.get_pixel(xx, yy).0[0]);
            }
        }
        let mid = window.len() / 2;
        let (_, median, _) = window.select_nth_unstable(mid);
        Luma([*median])
    })
}

/// Contrast-limited adaptive histogram equalization.
///
/// The image is split into a grid of at most `tiles` x `tiles` cells. Each
/// cell's histogram is clipped at `clip_limit` times the uniform bin height,
/// the excess is spread over all bins, and the resulting mappings are
/// bilinearly blended between cell centres.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn clahe(gray: &GrayImage, clip_limit: f32, tiles: u32) -> GrayImage {
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return gray.clone();
    }
    let tile_w = w.div_ceil(tiles.clamp(1, w));
    let tile_h = h.div_ceil(tiles.clamp(1, h));
    let tiles_x = w.div_ceil(tile_w);
    let tiles_y = h.div_ceil(tile_h);

    let mut luts: Vec<[u8; 256]> = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(w);
            let y1 = (y0 + tile_h).min(h);
            luts.push(tile_lut(gray, x0, y0, x1, y1, clip_limit));
        }
    }

    let lut_at = |tx: u32, ty: u32| &luts[(ty * tiles_x + tx) as usize];
    let axis = |pos: u32, size: u32, count: u32| -> (u32, u32, f32) {
        let f = (pos as f32 + 0.5) / size as f32 - 0.5;
        if f <= 0.0 {
            return (0, 0, 0.0);
        }
        let lo = (f.floor() as u32).min(count - 1);
        let hi = (lo + 1).min(count - 1);
        (lo, hi, (f - lo as f32).clamp(0.0, 1.0))
    };

    GrayImage::from_fn(w, h, |x, y| {
        let v = gray.get_pixel(x, y).0[0] as usize;
        let (tx0, tx1, ax) = axis(x, tile_w, tiles_x);
        let (ty0, ty1, ay) = axis(y, tile_h, tiles_y);
        let top = f32::from(lut_at(tx0, ty0)[v]) * (1.0 - ax) + f32::from(lut_at(tx1, ty0)[v]) * ax;
        let bottom =
            f32::from(lut_at(tx0, ty1)[v]) * (1.0 - ax) + f32::from(lut_at(tx1, ty1)[v]) * ax;
        Luma([(top * (1.0 - ay) + bottom * ay).round().clamp(0.0, 255.0) as u8])
    })
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn tile_lut(gray: &GrayImage, x0: u32, y0: u32, x1: u32, y1: u32, clip_limit: f32) -> [u8; 256] {
    let mut hist = [0u32; 256];
    for y in y0..y1 {
        for x in x0..x1 {
            hist[gray.get_pixel(x, y).0[0] as usize] += 1;
        }
    }
    let area = (x1 - x0) * (y1 - y0);

    if clip_limit > 0.0 {
        let clip = ((clip_limit * area as f32 / 256.0) as u32).max(1);
        let mut excess = 0u32;
        for bin in &mut hist {
            if *bin > clip {
                excess += *bin - clip;
                *bin = clip;
            }
        }
        let spread = excess / 256;
        let residual = (excess % 256) as usize;
        for (i, bin) in hist.iter_mut().enumerate() {
            *bin += spread + u32::from(i < residual);
        }
    }

    let scale = 255.0 / area.max(1) as f32;
    let mut lut = [0u8; 256];
    let mut cdf = 0u32;
    for (i, bin) in hist.iter().enumerate() {
        cdf += bin;
        lut[i] = (cdf as f32 * scale).round().min(255.0) as u8;
    }
    lut
}

/// Mean and population standard deviation of a region.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RegionStats {
    pub mean: f64,
    pub std_dev: f64,
}

/// Intensity statistics of `region`, clamped to the image.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn region_stats(gray: &GrayImage, region: Rect) -> RegionStats {
    let region = region.clamp_to(gray.width(), gray.height());
    if region.is_empty() {
        return RegionStats::default();
    }
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for y in region.y..region.bottom() {
        for x in region.x..region.right() {
            let v = f64::from(gray.get_pixel(x, y).0[0]);
            sum += v;
            sum_sq += v * v;
        }
    }
    let n = region.area() as f64;
    let mean = sum / n;
    RegionStats {
        mean,
        std_dev: (sum_sq / n - mean * mean).max(0.0).sqrt(),
    }
}
