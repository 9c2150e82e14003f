//! Connected components and their outer contours.

use image::GrayImage;

use crate::domain::Rect;

/// Shape measurements of one 8-connected foreground blob.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlobShape {
    /// Area enclosed by the traced outer contour (shoelace formula).
    pub area: f64,
    /// Length of the outer contour, diagonal steps counting `sqrt(2)`.
    pub perimeter: f64,
    pub bbox: Rect,
    /// Number of foreground pixels.
    pub pixels: usize,
}

impl BlobShape {
    /// `4 * pi * area / perimeter^2`: 1 for a disc, near 0 for a line.
    #[must_use]
    pub fn circularity(&self) -> f64 {
        if self.perimeter <= 0.0 {
            return 0.0;
        }
        4.0 * std::f64::consts::PI * self.area / (self.perimeter * self.perimeter)
    }

    /// Bounding box width over height.
    #[must_use]
    pub fn aspect_ratio(&self) -> f64 {
        if self.bbox.height == 0 {
            return 0.0;
        }
        f64::from(self.bbox.width) / f64::from(self.bbox.height)
    }
}

// Clockwise neighbour order in image coordinates, starting west.
const DIRS: [(i32, i32); 8] = [
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
];

fn dir_index(dx: i32, dy: i32) -> usize {
    DIRS.iter()
        .position(|&d| d == (dx, dy))
        .unwrap_or_default()
}

/// Labels 8-connected foreground blobs of `mask` and measures each one's
/// outer contour.
#[must_use]
#[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
pub fn find_blobs(mask: &GrayImage) -> Vec<BlobShape> {
    let (w, h) = mask.dimensions();
    let idx = |x: u32, y: u32| (y * w + x) as usize;
    let mut labels = vec![0u32; (w * h) as usize];
    let mut blobs = Vec::new();
    let mut stack = Vec::new();

    for sy in 0..h {
        for sx in 0..w {
            if mask.get_pixel(sx, sy).0[0] == 0 || labels[idx(sx, sy)] != 0 {
                continue;
            }
            let label = u32::try_from(blobs.len() + 1).unwrap_or(u32::MAX);
            let (mut min_x, mut min_y, mut max_x, mut max_y) = (sx, sy, sx, sy);
            let mut pixels = 0usize;

            labels[idx(sx, sy)] = label;
            stack.push((sx, sy));
            while let Some((x, y)) = stack.pop() {
                pixels += 1;
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
                for (dx, dy) in DIRS {
                    let nx = x as i32 + dx;
                    let ny = y as i32 + dy;
                    if nx < 0 || ny < 0 || nx >= w as i32 || ny >= h as i32 {
                        continue;
                    }
                    let (nx, ny) = (nx as u32, ny as u32);
                    if mask.get_pixel(nx, ny).0[0] != 0 && labels[idx(nx, ny)] == 0 {
                        labels[idx(nx, ny)] = label;
                        stack.push((nx, ny));
                    }
                }
            }

            // Raster order makes (sx, sy) the top-left pixel of the blob.
            let contour = trace_contour(&labels, w, h, label, (sx, sy), pixels);
            let (area, perimeter) = measure(&contour);
            blobs.push(BlobShape {
                area,
                perimeter,
                bbox: Rect::new(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1),
                pixels,
            });
        }
    }
    blobs
}

/// Moore-neighbour tracing of the outer boundary.
#[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
fn trace_contour(
    labels: &[u32],
    w: u32,
    h: u32,
    label: u32,
    start: (u32, u32),
    pixels: usize,
) -> Vec<(i32, i32)> {
    let inside = |x: i32, y: i32| {
        x >= 0
            && y >= 0
            && x < w as i32
            && y < h as i32
            && labels[(y as u32 * w + x as u32) as usize] == label
    };
    let start = (start.0 as i32, start.1 as i32);
    let mut points = vec![start];
    let mut current = start;
    // The west neighbour of the top-left pixel is always background.
    let mut back = 0usize;
    let mut first_step: Option<(i32, i32)> = None;
    let max_steps = 4 * pixels + 16;

    for _ in 0..max_steps {
        let found = (1..=8).map(|k| (back + k) % 8).find(|&d| {
            let (dx, dy) = DIRS[d];
            inside(current.0 + dx, current.1 + dy)
        });
        let Some(d) = found else {
            break;
        };
        let next = (current.0 + DIRS[d].0, current.1 + DIRS[d].1);
        if current == start {
            match first_step {
                None => first_step = Some(next),
                Some(first) if first == next => break,
                Some(_) => {}
            }
        }
        let (bx, by) = DIRS[(d + 7) % 8];
        let backtrack = (current.0 + bx, current.1 + by);
        back = dir_index(backtrack.0 - next.0, backtrack.1 - next.1);
        points.push(next);
        current = next;
    }

    if points.len() > 1 && points.last() == Some(&start) {
        points.pop();
    }
    points
}

#[allow(clippy::cast_precision_loss)]
fn measure(contour: &[(i32, i32)]) -> (f64, f64) {
    if contour.len() < 2 {
        return (0.0, 0.0);
    }
    let mut twice_area = 0i64;
    let mut perimeter = 0.0;
    for (i, &(x0, y0)) in contour.iter().enumerate() {
        let (x1, y1) = contour[(i + 1) % contour.len()];
        twice_area += i64::from(x0) * i64::from(y1) - i64::from(x1) * i64::from(y0);
        perimeter += if x0 != x1 && y0 != y1 {
            std::f64::consts::SQRT_2
        } else {
            1.0
        };
    }
    (twice_area.abs() as f64 / 2.0, perimeter)
}
