//! Defect detector implementations.
//!
//! Each module implements [`DefectDetector`](crate::domain::DefectDetector)
//! for one reject reason.

mod blur;
mod exposure;
mod eyes;

pub use blur::{BlurConfig, BlurModule};
pub use exposure::{ExposureConfig, ExposureDirection, ExposureModule, Histogram};
pub use eyes::{EyeOpenThresholds, EyesConfig, EyesModule};
