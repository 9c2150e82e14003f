//! Candle-backed [`FeatureDetector`].

use std::path::PathBuf;

use anyhow::Result;
use candle_core::Device;
use image::GrayImage;
use tracing::debug;

use super::{BlazeFace, LazyModel, PatchClassifier};
use crate::domain::Rect;
use crate::ports::{Detection, FeatureDetector};

/// Weight files for [`CandleFeatureDetector`].
#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub face: PathBuf,
    pub eye_state: PathBuf,
    pub smile: PathBuf,
}

/// Decision thresholds applied to raw model output.
#[derive(Debug, Clone)]
pub struct CandleDetectorConfig {
    pub min_face_confidence: f32,
    pub nms_iou: f32,
    /// An eye half counts as an open eye at or above this probability.
    pub min_open_probability: f32,
    /// Smile probabilities below this are not reported at all.
    pub min_smile_probability: f32,
}

impl Default for CandleDetectorConfig {
    fn default() -> Self {
        Self {
            min_face_confidence: 0.75,
            nms_iou: 0.3,
            min_open_probability: 0.5,
            min_smile_probability: 0.5,
        }
    }
}

/// Faces via `BlazeFace`, eyes and smiles via patch classifiers.
///
/// Models load on first use, so constructing this never touches the disk.
pub struct CandleFeatureDetector {
    face: LazyModel<BlazeFace>,
    eye_state: LazyModel<PatchClassifier>,
    smile: LazyModel<PatchClassifier>,
    config: CandleDetectorConfig,
}

impl CandleFeatureDetector {
    #[must_use]
    pub fn new(paths: ModelPaths, device: &Device, config: CandleDetectorConfig) -> Self {
        Self {
            face: LazyModel::new(paths.face, device.clone(), BlazeFace::new),
            eye_state: LazyModel::new(paths.eye_state, device.clone(), PatchClassifier::eye_state),
            smile: LazyModel::new(paths.smile, device.clone(), PatchClassifier::smile),
            config,
        }
    }
}

impl FeatureDetector for CandleFeatureDetector {
    fn detect_faces(&self, frame: &GrayImage) -> Result<Vec<Detection>> {
        self.face
            .get()?
            .detect(frame, self.config.min_face_confidence, self.config.nms_iou)
    }

    /// Classifies the left and right halves of the region separately; each
    /// open half is reported as one eye.
    fn detect_eyes(&self, frame: &GrayImage, region: Rect) -> Result<Vec<Detection>> {
        let model = self.eye_state.get()?;
        let mut eyes = Vec::new();
        for half in [
            region.fraction(0.0, 0.0, 0.5, 1.0),
            region.fraction(0.5, 0.0, 1.0, 1.0),
        ] {
            if half.is_empty() {
                continue;
            }
            let open = model.probability(frame, half)?;
            debug!(open, "eye patch");
            if open >= self.config.min_open_probability {
                eyes.push(Detection::new(half, open));
            }
        }
        Ok(eyes)
    }

    fn detect_smiles(&self, frame: &GrayImage, region: Rect) -> Result<Vec<Detection>> {
        if region.is_empty() {
            return Ok(Vec::new());
        }
        let mouth = region.fraction(0.15, 0.2, 0.85, 0.9);
        let p = self.smile.get()?.probability(frame, mouth)?;
        debug!(smile = p, "smile patch");
        Ok(if p >= self.config.min_smile_probability {
            vec![Detection::new(mouth, p)]
        } else {
            Vec::new()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_weights_fail_on_first_use() {
        let detector = CandleFeatureDetector::new(
            ModelPaths {
                face: "/nonexistent/face.safetensors".into(),
                eye_state: "/nonexistent/eyes.safetensors".into(),
                smile: "/nonexistent/smile.safetensors".into(),
            },
            &Device::Cpu,
            CandleDetectorConfig::default(),
        );
        let frame = GrayImage::new(64, 64);
        assert!(detector.detect_faces(&frame).is_err());
        assert!(detector.detect_eyes(&frame, Rect::new(0, 0, 64, 32)).is_err());
        assert!(detector.detect_smiles(&frame, Rect::new(0, 32, 64, 32)).is_err());
        assert!(detector.detect_smiles(&frame, Rect::new(0, 0, 0, 0)).unwrap().is_empty());
    }
}
