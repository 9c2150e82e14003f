//! ML inference using Candle.
//!
//! Provides lazily loaded models behind the
//! [`FeatureDetector`](crate::ports::FeatureDetector) port:
//! - `BlazeFace` (frontal face detection)
//! - patch classifiers for eye openness and smiles

mod blazeface;
mod detector;
mod device;
mod loader;
mod patch_classifier;

pub use blazeface::BlazeFace;
pub use detector::{CandleDetectorConfig, CandleFeatureDetector, ModelPaths};
pub use device::select_device;
pub use loader::{load_safetensors, LazyModel};
pub use patch_classifier::{PatchClassifier, EYE_INPUT, SMILE_INPUT};

/// Logistic function mapping a logit to `(0, 1)`.
#[inline]
pub(crate) fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigmoid() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!(sigmoid(10.0) > 0.999);
        assert!(sigmoid(-10.0) < 0.001);
    }
}
