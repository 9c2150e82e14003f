//! Closed eyes detection module.
//!
//! Rejects a photo only when at least one detected face has eyes that are
//! unambiguously closed and is not smiling:
//! - Median filter + CLAHE on the grayscale frame, then face detection
//! - Small faces are upscaled before looking at them
//! - A confident smile in the lower half of the face clears it
//! - Eye detector hits, pupil-shaped dark blobs and brightness statistics of
//!   the eye band decide between open, uncertain and closed
//!
//! Anything short of "closed" is accepted.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]

use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::GrayImage;
use tracing::{debug, warn};

use crate::domain::{
    DecodedImage, Defect, DefectDetails, DefectDetector, EyeEvidence, EyesTrace, FaceTrace,
    FaceVerdict, Rect, RejectReason,
};
use crate::ports::FeatureDetector;
use crate::vision::{
    adaptive_threshold_below, clahe, close, find_blobs, median_filter, otsu_level, region_stats,
    threshold_at_most, threshold_below, union,
};

/// Cut-offs for the "eyes definitely open" rules.
#[derive(Debug, Clone)]
pub struct EyeOpenThresholds {
    /// Mean brightness that, together with one detected eye, means open.
    pub eye_with_mean: f64,
    /// Mean brightness that alone means open.
    pub bright_mean: f64,
    /// Brightness standard deviation that alone means open.
    pub contrast_std: f64,
    /// Mean brightness that, together with one pupil candidate, means open.
    pub pupil_with_mean: f64,
    /// A face can only be closed when the eye band mean is at or below this.
    pub closed_mean_floor: f64,
}

impl Default for EyeOpenThresholds {
    fn default() -> Self {
        Self {
            eye_with_mean: 50.0,
            bright_mean: 65.0,
            contrast_std: 30.0,
            pupil_with_mean: 45.0,
            closed_mean_floor: 40.0,
        }
    }
}

/// Configuration for closed eyes detection.
#[derive(Debug, Clone)]
pub struct EyesConfig {
    /// Median filter radius (1 = 3x3 window).
    pub median_radius: u32,
    /// CLAHE clip limit, relative to a flat histogram.
    pub clahe_clip_limit: f32,
    /// CLAHE grid size per axis.
    pub clahe_tiles: u32,
    /// Faces with a side below this get upscaled.
    pub min_face_side: u32,
    /// Side the upscale aims for.
    pub upscale_target: u32,
    /// Upper bound on the upscale factor.
    pub max_upscale: f32,
    /// Smile detections below this confidence are ignored.
    pub min_smile_confidence: f32,
    /// Fixed binarization level for the eye band.
    pub dark_level: u8,
    /// Window radius of the adaptive binarization.
    pub adaptive_radius: u32,
    /// How far below the local mean a pixel must be for the adaptive mask.
    pub adaptive_offset: f64,
    /// Radius of the closing applied to the combined mask.
    pub close_radius: u32,
    /// Pupil area band as fractions of the (scaled) face area.
    pub pupil_min_area: f64,
    pub pupil_max_area: f64,
    pub pupil_min_circularity: f64,
    pub pupil_min_aspect: f64,
    pub pupil_max_aspect: f64,
    pub thresholds: EyeOpenThresholds,
}

impl Default for EyesConfig {
    fn default() -> Self {
        Self {
            median_radius: 1,
            clahe_clip_limit: 2.0,
            clahe_tiles: 8,
            min_face_side: 80,
            upscale_target: 120,
            max_upscale: 1.5,
            min_smile_confidence: 0.8,
            dark_level: 40,
            adaptive_radius: 5,
            adaptive_offset: 5.0,
            close_radius: 1,
            pupil_min_area: 0.001,
            pupil_max_area: 0.02,
            pupil_min_circularity: 0.6,
            pupil_min_aspect: 0.65,
            pupil_max_aspect: 1.5,
            thresholds: EyeOpenThresholds::default(),
        }
    }
}

/// Closed eyes detection module.
pub struct EyesModule {
    config: EyesConfig,
    detector: Arc<dyn FeatureDetector>,
}

impl EyesModule {
    /// Creates the module on top of a feature detector.
    #[must_use]
    pub fn new(config: EyesConfig, detector: Arc<dyn FeatureDetector>) -> Self {
        Self { config, detector }
    }

    #[must_use]
    pub const fn config(&self) -> &EyesConfig {
        &self.config
    }

    /// Denoises and equalizes the frame faces are searched in.
    #[must_use]
    pub fn normalize(&self, gray: &GrayImage) -> GrayImage {
        let denoised = median_filter(gray, self.config.median_radius);
        clahe(
            &denoised,
            self.config.clahe_clip_limit,
            self.config.clahe_tiles,
        )
    }

    /// Runs the full check and returns the per-face trace.
    ///
    /// # Errors
    ///
    /// Returns an error if face detection fails.
    pub fn trace(&self, image: &DecodedImage) -> anyhow::Result<EyesTrace> {
        let frame = self.normalize(&image.gray);
        let faces = self.detector.detect_faces(&frame)?;
        debug!(faces = faces.len(), "face detection");

        let faces = faces
            .iter()
            .map(|face| self.judge_face(&frame, face.rect))
            .collect();
        Ok(EyesTrace { faces })
    }

    fn judge_face(&self, frame: &GrayImage, bbox: Rect) -> FaceTrace {
        let bbox = bbox.clamp_to(frame.width(), frame.height());
        let mut trace = FaceTrace {
            bbox,
            scale: 1.0,
            smiling: false,
            evidence: None,
            verdict: FaceVerdict::Uncertain,
        };
        if bbox.is_empty() {
            return trace;
        }

        let (face, scale) = self.face_crop(frame, bbox);
        trace.scale = scale;
        let area = Rect::full(face.width(), face.height());

        match self.detector.detect_smiles(&face, area.fraction(0.0, 0.5, 1.0, 1.0)) {
            Ok(smiles) => {
                trace.smiling = smiles
                    .iter()
                    .any(|s| s.confidence >= self.config.min_smile_confidence);
            }
            Err(e) => {
                warn!("Smile detection failed, face left uncertain: {e:#}");
                return trace;
            }
        }
        if trace.smiling {
            trace.verdict = FaceVerdict::Smiling;
            return trace;
        }

        let eye_band = area.fraction(0.1, 0.25, 0.9, 0.5);
        let eyes = match self.detector.detect_eyes(&face, eye_band) {
            Ok(eyes) => eyes.len(),
            Err(e) => {
                warn!("Eye detection failed, face left uncertain: {e:#}");
                return trace;
            }
        };
        let stats = region_stats(&face, eye_band);
        let evidence = EyeEvidence {
            eyes,
            pupils: self.count_pupils(&face, eye_band, area.area()),
            mean: stats.mean,
            std_dev: stats.std_dev,
        };
        trace.evidence = Some(evidence);
        trace.verdict = self.classify(&evidence);
        trace
    }

    /// Crops the face and upscales it when it is small.
    fn face_crop(&self, frame: &GrayImage, bbox: Rect) -> (GrayImage, f32) {
        let crop = imageops::crop_imm(frame, bbox.x, bbox.y, bbox.width, bbox.height).to_image();
        if bbox.width.min(bbox.height) >= self.config.min_face_side {
            return (crop, 1.0);
        }
        let side = bbox.width.max(bbox.height) as f32;
        let scale = (self.config.upscale_target as f32 / side).clamp(1.0, self.config.max_upscale);
        if scale <= 1.0 {
            return (crop, 1.0);
        }
        let width = (bbox.width as f32 * scale).round().max(1.0) as u32;
        let height = (bbox.height as f32 * scale).round().max(1.0) as u32;
        (
            imageops::resize(&crop, width, height, FilterType::Triangle),
            scale,
        )
    }

    /// Counts dark, round, pupil-sized blobs inside the eye band.
    fn count_pupils(&self, face: &GrayImage, band: Rect, face_area: u64) -> usize {
        if band.is_empty() {
            return 0;
        }
        let region = imageops::crop_imm(face, band.x, band.y, band.width, band.height).to_image();

        let fixed = threshold_below(&region, self.config.dark_level);
        let adaptive = adaptive_threshold_below(
            &region,
            self.config.adaptive_radius,
            self.config.adaptive_offset,
        );
        let otsu = threshold_at_most(&region, otsu_level(&region));
        let mask = close(
            &union(&[&fixed, &adaptive, &otsu]),
            self.config.close_radius,
        );

        let face_area = face_area as f64;
        let min_area = face_area * self.config.pupil_min_area;
        let max_area = face_area * self.config.pupil_max_area;
        find_blobs(&mask)
            .into_iter()
            .filter(|blob| {
                let aspect = blob.aspect_ratio();
                (min_area..=max_area).contains(&blob.area)
                    && blob.circularity() > self.config.pupil_min_circularity
                    && (self.config.pupil_min_aspect..=self.config.pupil_max_aspect)
                        .contains(&aspect)
            })
            .count()
    }

    /// Applies the open / closed rules to gathered evidence.
    #[must_use]
    pub fn classify(&self, ev: &EyeEvidence) -> FaceVerdict {
        let t = &self.config.thresholds;
        let open = ev.eyes >= 2
            || ev.pupils >= 2
            || (ev.eyes >= 1 && ev.mean > t.eye_with_mean)
            || ev.mean > t.bright_mean
            || ev.std_dev > t.contrast_std
            || (ev.pupils >= 1 && ev.mean > t.pupil_with_mean);
        if open {
            FaceVerdict::Open
        } else if ev.eyes == 0 && ev.pupils == 0 && ev.mean <= t.closed_mean_floor {
            FaceVerdict::Closed
        } else {
            FaceVerdict::Uncertain
        }
    }
}

impl DefectDetector for EyesModule {
    fn name(&self) -> &'static str {
        "closed_eyes"
    }

    fn reason(&self) -> RejectReason {
        RejectReason::ClosedEyes
    }

    fn detect(&self, image: &DecodedImage) -> anyhow::Result<Option<Defect>> {
        let trace = self.trace(image)?;
        for face in &trace.faces {
            debug!("{face}");
        }
        if trace.any_closed() {
            return Ok(Some(Defect::new(
                RejectReason::ClosedEyes,
                DefectDetails::Eyes(trace),
            )));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::Detection;
    use image::Luma;

    /// Returns fixed answers.
    struct FixedDetector {
        faces: Vec<Rect>,
        eyes: usize,
        smile_confidence: Option<f32>,
        fail_eyes: bool,
    }

    impl FixedDetector {
        fn faces(faces: Vec<Rect>) -> Self {
            Self {
                faces,
                eyes: 0,
                smile_confidence: None,
                fail_eyes: false,
            }
        }
    }

    impl FeatureDetector for FixedDetector {
        fn detect_faces(&self, _frame: &GrayImage) -> anyhow::Result<Vec<Detection>> {
            Ok(self.faces.iter().map(|r| Detection::new(*r, 0.9)).collect())
        }

        fn detect_eyes(&self, _frame: &GrayImage, region: Rect) -> anyhow::Result<Vec<Detection>> {
            if self.fail_eyes {
                anyhow::bail!("eye model exploded");
            }
            Ok(vec![Detection::new(region, 0.9); self.eyes])
        }

        fn detect_smiles(&self, _frame: &GrayImage, region: Rect) -> anyhow::Result<Vec<Detection>> {
            Ok(self
                .smile_confidence
                .map(|c| vec![Detection::new(region, c)])
                .unwrap_or_default())
        }
    }

    fn module(detector: FixedDetector) -> EyesModule {
        EyesModule::new(EyesConfig::default(), Arc::new(detector))
    }

    /// Mid-gray frame with a dark band where the eyes of a face at
    /// (40, 40, 120, 120) would be.
    fn closed_eye_frame() -> DecodedImage {
        let mut img = GrayImage::from_fn(200, 200, |x, y| {
            if ((x / 6) + (y / 6)) % 2 == 0 {
                Luma([110])
            } else {
                Luma([150])
            }
        });
        for y in 65..105 {
            for x in 40..160 {
                img.put_pixel(x, y, Luma([6]));
            }
        }
        DecodedImage::from_gray(img)
    }

    fn evidence(eyes: usize, pupils: usize, mean: f64, std_dev: f64) -> EyeEvidence {
        EyeEvidence {
            eyes,
            pupils,
            mean,
            std_dev,
        }
    }

    #[test]
    fn test_default_config() {
        let config = EyesConfig::default();
        assert_eq!(config.min_face_side, 80);
        assert_eq!(config.upscale_target, 120);
        assert!((config.max_upscale - 1.5).abs() < f32::EPSILON);
        assert_eq!(config.dark_level, 40);
        assert!((config.thresholds.bright_mean - 65.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_classify_open_rules() {
        let m = module(FixedDetector::faces(vec![]));
        assert_eq!(m.classify(&evidence(2, 0, 0.0, 0.0)), FaceVerdict::Open);
        assert_eq!(m.classify(&evidence(0, 2, 0.0, 0.0)), FaceVerdict::Open);
        assert_eq!(m.classify(&evidence(1, 0, 51.0, 0.0)), FaceVerdict::Open);
        assert_eq!(m.classify(&evidence(0, 0, 66.0, 0.0)), FaceVerdict::Open);
        assert_eq!(m.classify(&evidence(0, 0, 0.0, 31.0)), FaceVerdict::Open);
        assert_eq!(m.classify(&evidence(0, 1, 46.0, 0.0)), FaceVerdict::Open);
    }

    #[test]
    fn test_classify_closed_needs_all_evidence_absent() {
        let m = module(FixedDetector::faces(vec![]));
        assert_eq!(m.classify(&evidence(0, 0, 20.0, 5.0)), FaceVerdict::Closed);
        assert_eq!(m.classify(&evidence(0, 0, 40.0, 5.0)), FaceVerdict::Closed);
        assert_eq!(m.classify(&evidence(1, 0, 20.0, 5.0)), FaceVerdict::Uncertain);
        assert_eq!(m.classify(&evidence(0, 1, 20.0, 5.0)), FaceVerdict::Uncertain);
        assert_eq!(m.classify(&evidence(0, 0, 41.0, 5.0)), FaceVerdict::Uncertain);
    }

    #[test]
    fn test_no_faces_never_rejects() {
        let m = module(FixedDetector::faces(vec![]));
        let image = closed_eye_frame();
        assert!(m.detect(&image).unwrap().is_none());
    }

    #[test]
    fn test_dark_eye_band_is_closed() {
        let m = module(FixedDetector::faces(vec![Rect::new(40, 40, 120, 120)]));
        let defect = m.detect(&closed_eye_frame()).unwrap().unwrap();
        assert_eq!(defect.reason, RejectReason::ClosedEyes);
        let DefectDetails::Eyes(trace) = defect.details else {
            panic!("expected an eyes trace");
        };
        assert_eq!(trace.faces.len(), 1);
        let ev = trace.faces[0].evidence.unwrap();
        assert_eq!(ev.eyes, 0);
        assert_eq!(ev.pupils, 0);
        assert!(ev.mean < 40.0, "mean {}", ev.mean);
    }

    #[test]
    fn test_smile_overrides_closed_eyes() {
        let mut detector = FixedDetector::faces(vec![Rect::new(40, 40, 120, 120)]);
        detector.smile_confidence = Some(0.95);
        let trace = module(detector).trace(&closed_eye_frame()).unwrap();
        assert_eq!(trace.faces[0].verdict, FaceVerdict::Smiling);
        assert!(!trace.any_closed());
    }

    #[test]
    fn test_weak_smile_is_ignored() {
        let mut detector = FixedDetector::faces(vec![Rect::new(40, 40, 120, 120)]);
        detector.smile_confidence = Some(0.3);
        let trace = module(detector).trace(&closed_eye_frame()).unwrap();
        assert!(!trace.faces[0].smiling);
        assert_eq!(trace.faces[0].verdict, FaceVerdict::Closed);
    }

    #[test]
    fn test_two_detected_eyes_mean_open() {
        let mut detector = FixedDetector::faces(vec![Rect::new(40, 40, 120, 120)]);
        detector.eyes = 2;
        let m = module(detector);
        assert!(m.detect(&closed_eye_frame()).unwrap().is_none());
    }

    #[test]
    fn test_eye_failure_leaves_face_uncertain() {
        let mut detector = FixedDetector::faces(vec![Rect::new(40, 40, 120, 120)]);
        detector.fail_eyes = true;
        let trace = module(detector).trace(&closed_eye_frame()).unwrap();
        assert_eq!(trace.faces[0].verdict, FaceVerdict::Uncertain);
    }

    #[test]
    fn test_small_face_is_upscaled() {
        let m = module(FixedDetector::faces(vec![]));
        let frame = GrayImage::from_pixel(100, 100, Luma([90]));
        let (face, scale) = m.face_crop(&frame, Rect::new(10, 10, 60, 60));
        assert!((scale - 1.5).abs() < f32::EPSILON);
        assert_eq!(face.dimensions(), (90, 90));

        let (face, scale) = m.face_crop(&frame, Rect::new(0, 0, 100, 100));
        assert!((scale - 1.0).abs() < f32::EPSILON);
        assert_eq!(face.dimensions(), (100, 100));
    }

    #[test]
    fn test_pupils_found_in_open_eye_band() {
        let m = module(FixedDetector::faces(vec![]));
        let mut face = GrayImage::from_pixel(200, 200, Luma([170]));
        for (cx, cy) in [(65i32, 75i32), (135, 75)] {
            for y in 60..90 {
                for x in (cx - 15)..(cx + 15) {
                    let (dx, dy) = (x - cx, y - cy);
                    if dx * dx + dy * dy <= 36 {
                        face.put_pixel(x as u32, y as u32, Luma([10]));
                    }
                }
            }
        }
        let band = Rect::full(200, 200).fraction(0.1, 0.25, 0.9, 0.5);
        assert_eq!(m.count_pupils(&face, band, 40_000), 2);
    }
}
