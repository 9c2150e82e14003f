//! Small CNN binary classifiers over grayscale patches.
//!
//! The same three-conv, two-dense layout serves two models:
//! - eye state (34x26 eye crop, probability the eye is open)
//! - smile (64x32 mouth crop, probability of a smile)

#![allow(clippy::cast_possible_truncation)]

use anyhow::{Context, Result};
use candle_core::{Device, Module, Tensor};
use candle_nn::{conv2d, linear, Conv2d, Conv2dConfig, Linear, VarBuilder};
use image::imageops::{self, FilterType};
use image::GrayImage;

use super::sigmoid;
use crate::domain::Rect;

/// Input size of the eye state model.
pub const EYE_INPUT: (usize, usize) = (34, 26);
/// Input size of the smile model.
pub const SMILE_INPUT: (usize, usize) = (64, 32);

const CHANNELS: [usize; 4] = [1, 32, 64, 128];
const HIDDEN: usize = 256;

/// Binary patch classifier.
pub struct PatchClassifier {
    convs: Vec<Conv2d>,
    fc1: Linear,
    fc2: Linear,
    width: usize,
    height: usize,
    device: Device,
}

impl PatchClassifier {
    /// Eye state model.
    ///
    /// # Errors
    ///
    /// Returns an error if model weights cannot be loaded or are invalid.
    #[allow(clippy::needless_pass_by_value)]
    pub fn eye_state(vb: VarBuilder) -> Result<Self> {
        Self::new(&vb, EYE_INPUT)
    }

    /// Smile model.
    ///
    /// # Errors
    ///
    /// Returns an error if model weights cannot be loaded or are invalid.
    #[allow(clippy::needless_pass_by_value)]
    pub fn smile(vb: VarBuilder) -> Result<Self> {
        Self::new(&vb, SMILE_INPUT)
    }

    fn new(vb: &VarBuilder, (width, height): (usize, usize)) -> Result<Self> {
        let convs = CHANNELS
            .windows(2)
            .enumerate()
            .map(|(i, pair)| {
                conv2d(
                    pair[0],
                    pair[1],
                    3,
                    Conv2dConfig {
                        padding: 1,
                        ..Conv2dConfig::default()
                    },
                    vb.pp(format!("conv{}", i + 1)),
                )
            })
            .collect::<candle_core::Result<Vec<_>>>()?;

        let fc1 = linear(flattened_len(width, height), HIDDEN, vb.pp("fc1"))?;
        let fc2 = linear(HIDDEN, 1, vb.pp("fc2"))?;
        Ok(Self {
            convs,
            fc1,
            fc2,
            width,
            height,
            device: vb.device().clone(),
        })
    }

    /// Crops `region` out of `frame` and resizes it to the model input,
    /// scaled to `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the region is empty or tensor creation fails.
    pub fn preprocess(&self, frame: &GrayImage, region: Rect) -> Result<Tensor> {
        let region = region.clamp_to(frame.width(), frame.height());
        anyhow::ensure!(!region.is_empty(), "empty patch region");
        let crop =
            imageops::crop_imm(frame, region.x, region.y, region.width, region.height).to_image();
        let patch = imageops::resize(
            &crop,
            self.width as u32,
            self.height as u32,
            FilterType::Triangle,
        );
        let data: Vec<f32> = patch.pixels().map(|p| f32::from(p.0[0]) / 255.0).collect();
        Tensor::from_vec(data, (1, 1, self.height, self.width), &self.device)
            .context("Failed to create patch tensor")
    }

    /// Probability of the positive class for `region` of `frame`.
    ///
    /// # Errors
    ///
    /// Returns an error if preprocessing or inference fails.
    pub fn probability(&self, frame: &GrayImage, region: Rect) -> Result<f32> {
        let input = self.preprocess(frame, region)?;
        let logit = self.forward(&input)?.flatten_all()?.to_vec1::<f32>()?;
        let logit = logit.first().copied().context("classifier returned no output")?;
        Ok(sigmoid(logit))
    }
}

impl Module for PatchClassifier {
    fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        let mut h = x.clone();
        for conv in &self.convs {
            h = conv.forward(&h)?.relu()?.max_pool2d(2)?;
        }
        let h = self.fc1.forward(&h.flatten_from(1)?)?.relu()?;
        self.fc2.forward(&h)
    }
}

/// Dense input length after three 2x2 pools.
const fn flattened_len(width: usize, height: usize) -> usize {
    CHANNELS[3] * (width / 8) * (height / 8)
}
