//! `BlazeFace` frontal face detector.
//!
//! Candle port of the short-range `BlazeFace` network
//! (<https://github.com/hollance/BlazeFace-PyTorch> weights, `BatchNorm`
//! folded into conv biases). Runs on a 128x128 input and decodes boxes
//! against 896 fixed anchors.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]

use anyhow::{Context, Result};
use candle_core::{Device, Module, Tensor};
use candle_nn::{conv2d, Conv2d, Conv2dConfig, VarBuilder};
use image::imageops::{self, FilterType};
use image::GrayImage;

use super::sigmoid;
use crate::domain::Rect;
use crate::ports::Detection;

/// Input side length.
pub const INPUT_SIZE: usize = 128;

/// `(grid side, anchors per cell)` for the two detection heads.
const ANCHOR_GRIDS: [(usize, usize); 2] = [(16, 2), (8, 6)];

/// Values regressed per anchor: box centre and size, then 6 keypoints.
const REGRESSION_WIDTH: usize = 16;

/// `(in, out, stride)` for every block of the first backbone (16x16 output).
const BACKBONE_16: [(usize, usize, usize); 11] = [
    (24, 24, 1),
    (24, 28, 1),
    (28, 32, 2),
    (32, 36, 1),
    (36, 42, 1),
    (42, 48, 2),
    (48, 56, 1),
    (56, 64, 1),
    (64, 72, 1),
    (72, 80, 1),
    (80, 88, 1),
];

/// Blocks of the second backbone (8x8 output).
const BACKBONE_8: [(usize, usize, usize); 5] = [
    (88, 96, 2),
    (96, 96, 1),
    (96, 96, 1),
    (96, 96, 1),
    (96, 96, 1),
];

/// Depthwise-separable residual block.
struct BlazeBlock {
    depthwise: Conv2d,
    pointwise: Conv2d,
    channel_pad: usize,
    stride: usize,
}

impl BlazeBlock {
    fn new(in_channels: usize, out_channels: usize, stride: usize, vb: &VarBuilder) -> Result<Self> {
        let depthwise = conv2d(
            in_channels,
            in_channels,
            3,
            Conv2dConfig {
                stride,
                padding: usize::from(stride == 1),
                groups: in_channels,
                dilation: 1,
            },
            vb.pp("depthwise"),
        )?;
        let pointwise = conv2d(
            in_channels,
            out_channels,
            1,
            Conv2dConfig::default(),
            vb.pp("pointwise"),
        )?;
        Ok(Self {
            depthwise,
            pointwise,
            channel_pad: out_channels.saturating_sub(in_channels),
            stride,
        })
    }
}

impl Module for BlazeBlock {
    fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        let (input, shortcut) = if self.stride == 2 {
            // TF-style "same" padding for stride 2 pads only right and bottom.
            (
                x.pad_with_zeros(2, 0, 2)?.pad_with_zeros(3, 0, 2)?,
                x.max_pool2d(2)?,
            )
        } else {
            (x.clone(), x.clone())
        };

        let h = self.pointwise.forward(&self.depthwise.forward(&input)?.relu()?)?;
        let shortcut = if self.channel_pad > 0 {
            shortcut.pad_with_zeros(1, 0, self.channel_pad)?
        } else {
            shortcut
        };
        (h + shortcut)?.relu()
    }
}

/// One detection head: a classifier and a box regressor over a feature map.
struct Head {
    classifier: Conv2d,
    regressor: Conv2d,
    anchors: usize,
}

impl Head {
    fn new(channels: usize, per_cell: usize, grid: usize, vb: &VarBuilder) -> Result<Self> {
        Ok(Self {
            classifier: conv2d(
                channels,
                per_cell,
                1,
                Conv2dConfig::default(),
                vb.pp(format!("classifier_{grid}")),
            )?,
            regressor: conv2d(
                channels,
                per_cell * REGRESSION_WIDTH,
                1,
                Conv2dConfig::default(),
                vb.pp(format!("regressor_{grid}")),
            )?,
            anchors: grid * grid * per_cell,
        })
    }

    fn forward(&self, features: &Tensor) -> candle_core::Result<(Tensor, Tensor)> {
        let scores = self
            .classifier
            .forward(features)?
            .permute((0, 2, 3, 1))?
            .reshape((1, self.anchors, 1))?;
        let boxes = self
            .regressor
            .forward(features)?
            .permute((0, 2, 3, 1))?
            .reshape((1, self.anchors, REGRESSION_WIDTH))?;
        Ok((scores, boxes))
    }
}

/// `BlazeFace` face detection model.
pub struct BlazeFace {
    stem: Conv2d,
    backbone_16: Vec<BlazeBlock>,
    backbone_8: Vec<BlazeBlock>,
    head_16: Head,
    head_8: Head,
    /// Anchor centres `(cx, cy)` in normalized coordinates.
    anchors: Vec<(f32, f32)>,
    device: Device,
}

impl BlazeFace {
    /// Builds the network from weights.
    ///
    /// # Errors
    ///
    /// Returns an error if model weights cannot be loaded or are invalid.
    #[allow(clippy::needless_pass_by_value)]
    pub fn new(vb: VarBuilder) -> Result<Self> {
        let stem = conv2d(
            3,
            24,
            5,
            Conv2dConfig {
                stride: 2,
                ..Conv2dConfig::default()
            },
            vb.pp("conv0"),
        )?;
        let backbone_16 = BACKBONE_16
            .iter()
            .enumerate()
            .map(|(i, &(cin, cout, s))| BlazeBlock::new(cin, cout, s, &vb.pp(format!("backbone1.{i}"))))
            .collect::<Result<Vec<_>>>()?;
        let backbone_8 = BACKBONE_8
            .iter()
            .enumerate()
            .map(|(i, &(cin, cout, s))| BlazeBlock::new(cin, cout, s, &vb.pp(format!("backbone2.{i}"))))
            .collect::<Result<Vec<_>>>()?;

        let (grid_16, per_16) = ANCHOR_GRIDS[0];
        let (grid_8, per_8) = ANCHOR_GRIDS[1];
        Ok(Self {
            stem,
            backbone_16,
            backbone_8,
            head_16: Head::new(88, per_16, grid_16, &vb)?,
            head_8: Head::new(96, per_8, grid_8, &vb)?,
            anchors: anchor_centres(),
            device: vb.device().clone(),
        })
    }

    /// Resizes a grayscale frame to the network input, replicated over three
    /// channels and scaled to `[-1, 1]`.
    ///
    /// # Errors
    ///
    /// Returns an error if tensor creation fails.
    pub fn preprocess(&self, frame: &GrayImage) -> Result<Tensor> {
        let side = INPUT_SIZE as u32;
        let resized = imageops::resize(frame, side, side, FilterType::Triangle);
        let data: Vec<f32> = resized
            .pixels()
            .map(|p| f32::from(p.0[0]) / 127.5 - 1.0)
            .collect();
        Tensor::from_vec(data, (1, 1, INPUT_SIZE, INPUT_SIZE), &self.device)?
            .repeat((1, 3, 1, 1))
            .context("Failed to build BlazeFace input")
    }

    fn forward(&self, x: &Tensor) -> Result<(Tensor, Tensor)> {
        let x = x.pad_with_zeros(2, 1, 2)?.pad_with_zeros(3, 1, 2)?;
        let mut h = self.stem.forward(&x)?.relu()?;
        for block in &self.backbone_16 {
            h = block.forward(&h)?;
        }
        let (scores_16, boxes_16) = self.head_16.forward(&h)?;
        for block in &self.backbone_8 {
            h = block.forward(&h)?;
        }
        let (scores_8, boxes_8) = self.head_8.forward(&h)?;

        Ok((
            Tensor::cat(&[scores_16, scores_8], 1)?,
            Tensor::cat(&[boxes_16, boxes_8], 1)?,
        ))
    }

    /// Finds faces in `frame`, returning pixel boxes sorted by confidence.
    ///
    /// # Errors
    ///
    /// Returns an error if inference fails.
    pub fn detect(&self, frame: &GrayImage, min_score: f32, nms_iou: f32) -> Result<Vec<Detection>> {
        let (scores, boxes) = self.forward(&self.preprocess(frame)?)?;
        let scores = scores.squeeze(0)?.squeeze(1)?.to_vec1::<f32>()?;
        let boxes = boxes.squeeze(0)?.to_vec2::<f32>()?;

        let (fw, fh) = (frame.width() as f32, frame.height() as f32);
        let input = INPUT_SIZE as f32;
        let candidates = scores
            .iter()
            .zip(&boxes)
            .zip(&self.anchors)
            .filter_map(|((&raw, reg), &(ax, ay))| {
                let score = sigmoid(raw);
                if score < min_score {
                    return None;
                }
                let cx = ax + reg[0] / input;
                let cy = ay + reg[1] / input;
                let (w, h) = (reg[2] / input, reg[3] / input);
                let x0 = ((cx - w / 2.0).clamp(0.0, 1.0) * fw).round();
                let y0 = ((cy - h / 2.0).clamp(0.0, 1.0) * fh).round();
                let x1 = ((cx + w / 2.0).clamp(0.0, 1.0) * fw).round();
                let y1 = ((cy + h / 2.0).clamp(0.0, 1.0) * fh).round();
                let rect = Rect::new(x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32);
                (!rect.is_empty()).then_some(Detection::new(rect, score))
            })
            .collect();

        Ok(suppress(candidates, nms_iou))
    }
}

fn anchor_centres() -> Vec<(f32, f32)> {
    let mut anchors = Vec::new();
    for (grid, per_cell) in ANCHOR_GRIDS {
        let side = grid as f32;
        for y in 0..grid {
            for x in 0..grid {
                let centre = ((x as f32 + 0.5) / side, (y as f32 + 0.5) / side);
                anchors.extend(std::iter::repeat(centre).take(per_cell));
            }
        }
    }
    anchors
}

/// Greedy non-maximum suppression, highest confidence first.
pub(crate) fn suppress(mut candidates: Vec<Detection>, max_iou: f32) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::new();
    for candidate in candidates {
        if kept.iter().all(|k| iou(k.rect, candidate.rect) < max_iou) {
            kept.push(candidate);
        }
    }
    kept
}

/// Intersection over union of two pixel boxes.
pub(crate) fn iou(a: Rect, b: Rect) -> f32 {
    let x0 = a.x.max(b.x);
    let y0 = a.y.max(b.y);
    let x1 = a.right().min(b.right());
    let y1 = a.bottom().min(b.bottom());
    let inter = if x1 > x0 && y1 > y0 {
        u64::from(x1 - x0) * u64::from(y1 - y0)
    } else {
        0
    };
    let union = a.area() + b.area() - inter;
    if union == 0 {
        return 0.0;
    }
    inter as f32 / union as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anchor_count() {
        let anchors = anchor_centres();
        assert_eq!(anchors.len(), 896);
        assert_eq!(anchors[0], (0.5 / 16.0, 0.5 / 16.0));
        assert_eq!(anchors[512], (0.5 / 8.0, 0.5 / 8.0));
    }

    #[test]
    fn test_iou() {
        let a = Rect::new(0, 0, 50, 50);
        assert!((iou(a, a) - 1.0).abs() < 1e-6);
        assert!(iou(a, Rect::new(60, 60, 40, 40)).abs() < 1e-6);
        let expected = 625.0 / 4375.0;
        assert!((iou(a, Rect::new(25, 25, 50, 50)) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_suppress_keeps_best_of_overlapping() {
        let kept = suppress(
            vec![
                Detection::new(Rect::new(0, 0, 100, 100), 0.8),
                Detection::new(Rect::new(5, 5, 100, 100), 0.95),
                Detection::new(Rect::new(300, 300, 80, 80), 0.9),
            ],
            0.3,
        );
        assert_eq!(kept.len(), 2);
        assert!((kept[0].confidence - 0.95).abs() < f32::EPSILON);
        assert_eq!(kept[1].rect, Rect::new(300, 300, 80, 80));
    }
}
