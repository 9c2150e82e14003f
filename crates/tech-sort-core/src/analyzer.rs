//! Photo analyzer: bounded decode followed by the defect detectors.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, warn};

use crate::domain::{
    DecodedImage, Defect, DefectDetector, LoadOutcome, SkipReason, Verdict,
};
use crate::modules::{BlurConfig, BlurModule, ExposureConfig, ExposureModule};
use crate::ports::ImageDecoder;

/// Verdict plus what led to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub verdict: Verdict,
    /// The finding behind a rejection.
    pub defect: Option<Defect>,
    /// Set when the loader gave up; such photos are always accepted.
    pub skipped: Option<SkipReason>,
}

impl Analysis {
    #[must_use]
    pub fn accepted() -> Self {
        Self {
            verdict: Verdict::Accepted,
            defect: None,
            skipped: None,
        }
    }

    #[must_use]
    pub fn skipped(reason: SkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::accepted()
        }
    }

    #[must_use]
    pub fn rejected(defect: Defect) -> Self {
        Self {
            verdict: Verdict::Rejected(defect.reason),
            defect: Some(defect),
            skipped: None,
        }
    }
}

/// Decodes one photo and runs the detectors in priority order.
///
/// Never fails: undecodable input, detector errors and panics all end in
/// [`Verdict::Accepted`].
pub struct PhotoAnalyzer {
    decoder: Box<dyn ImageDecoder>,
    detectors: Vec<Box<dyn DefectDetector>>,
}

impl PhotoAnalyzer {
    /// An analyzer with no detectors; every photo is accepted.
    #[must_use]
    pub fn new(decoder: Box<dyn ImageDecoder>) -> Self {
        Self {
            decoder,
            detectors: Vec::new(),
        }
    }

    /// Adds the blur, overexposure and underexposure checks.
    #[must_use]
    pub fn with_standard_detectors(self, blur: BlurConfig, exposure: &ExposureConfig) -> Self {
        self.with_detector(Box::new(BlurModule::new(blur)))
            .with_detector(Box::new(ExposureModule::over(exposure.clone())))
            .with_detector(Box::new(ExposureModule::under(exposure.clone())))
    }

    /// Registers a detector. The run order follows
    /// [`RejectReason`](crate::domain::RejectReason), not registration order.
    #[must_use]
    pub fn with_detector(mut self, detector: Box<dyn DefectDetector>) -> Self {
        self.detectors.push(detector);
        self.detectors.sort_by_key(|d| d.reason());
        self
    }

    /// Detector names in run order.
    #[must_use]
    pub fn detector_names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    /// `analyze(photo) -> (rejected, reason)` as a [`Verdict`].
    #[must_use]
    pub fn analyze(&self, blob: &[u8], file_name: &str, declared_size: u64) -> Verdict {
        self.analyze_detailed(blob, file_name, declared_size).verdict
    }

    /// Like [`analyze`](Self::analyze), keeping the finding and skip reason.
    #[must_use]
    pub fn analyze_detailed(&self, blob: &[u8], file_name: &str, declared_size: u64) -> Analysis {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.decoder.load_bounded(blob, file_name, declared_size)
        }));
        match outcome {
            Ok(LoadOutcome::Decoded(image)) => self.analyze_image(&image),
            Ok(LoadOutcome::Skipped(reason)) => {
                debug!(file_name, ?reason, "photo skipped by loader");
                Analysis::skipped(reason)
            }
            Err(payload) => {
                warn!(
                    "Decoder panicked on {file_name}: {}",
                    panic_message(payload.as_ref())
                );
                Analysis::skipped(SkipReason::Undecodable)
            }
        }
    }

    /// Runs the detectors on an already decoded image.
    #[must_use]
    pub fn analyze_image(&self, image: &DecodedImage) -> Analysis {
        for detector in &self.detectors {
            let result = panic::catch_unwind(AssertUnwindSafe(|| detector.detect(image)));
            match result {
                Ok(Ok(Some(defect))) => {
                    debug!(detector = detector.name(), reason = %defect.reason, "defect found");
                    return Analysis::rejected(defect);
                }
                Ok(Ok(None)) => {}
                Ok(Err(e)) => warn!("{} check failed, treated as clean: {e:#}", detector.name()),
                Err(payload) => warn!(
                    "{} check panicked, treated as clean: {}",
                    detector.name(),
                    panic_message(payload.as_ref())
                ),
            }
        }
        Analysis::accepted()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DefectDetails, ExposureDetails, RejectReason};
    use image::{GrayImage, Luma};

    /// Decodes a single byte into a uniform 64x64 frame; empty input is undecodable.
    struct ByteDecoder;

    impl ImageDecoder for ByteDecoder {
        fn load_bounded(&self, blob: &[u8], _file_name: &str, _declared: u64) -> LoadOutcome {
            match blob.first() {
                Some(&v) => LoadOutcome::Decoded(DecodedImage::from_gray(GrayImage::from_pixel(
                    64,
                    64,
                    Luma([v]),
                ))),
                None => LoadOutcome::Skipped(SkipReason::Undecodable),
            }
        }
    }

    struct PanickingDecoder;

    impl ImageDecoder for PanickingDecoder {
        fn load_bounded(&self, _blob: &[u8], _file_name: &str, _declared: u64) -> LoadOutcome {
            panic!("codec bug")
        }
    }

    /// Always reports its reason.
    struct Always(RejectReason);

    impl DefectDetector for Always {
        fn name(&self) -> &'static str {
            "always"
        }

        fn reason(&self) -> RejectReason {
            self.0
        }

        fn detect(&self, _image: &DecodedImage) -> anyhow::Result<Option<Defect>> {
            Ok(Some(Defect::new(
                self.0,
                DefectDetails::Exposure(ExposureDetails {
                    fraction: 1.0,
                    level: 0,
                    max_fraction: 0.0,
                }),
            )))
        }
    }

    struct Failing {
        panic: bool,
    }

    impl DefectDetector for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn reason(&self) -> RejectReason {
            RejectReason::Blur
        }

        fn detect(&self, _image: &DecodedImage) -> anyhow::Result<Option<Defect>> {
            if self.panic {
                panic!("detector bug");
            }
            anyhow::bail!("detector error")
        }
    }

    fn standard() -> PhotoAnalyzer {
        PhotoAnalyzer::new(Box::new(ByteDecoder))
            .with_standard_detectors(BlurConfig::default(), &ExposureConfig::default())
    }

    #[test]
    fn test_standard_detector_order() {
        assert_eq!(
            standard().detector_names(),
            vec!["blur", "overexposure", "underexposure"]
        );
    }

    #[test]
    fn test_registration_order_does_not_matter() {
        let analyzer = PhotoAnalyzer::new(Box::new(ByteDecoder))
            .with_detector(Box::new(Always(RejectReason::ClosedEyes)))
            .with_detector(Box::new(Always(RejectReason::Overexposed)))
            .with_detector(Box::new(Always(RejectReason::Blur)));
        assert_eq!(
            analyzer.analyze(&[128], "a.jpg", 1),
            Verdict::Rejected(RejectReason::Blur)
        );
    }

    #[test]
    fn test_blur_wins_over_overexposure() {
        // A white frame is both flat and blown out.
        assert_eq!(
            standard().analyze(&[255], "white.jpg", 1),
            Verdict::Rejected(RejectReason::Blur)
        );
    }

    #[test]
    fn test_black_frame_is_blur() {
        assert_eq!(
            standard().analyze(&[0], "black.jpg", 1),
            Verdict::Rejected(RejectReason::Blur)
        );
    }

    #[test]
    fn test_undecodable_is_accepted() {
        let analysis = standard().analyze_detailed(&[], "broken.jpg", 0);
        assert_eq!(analysis.verdict, Verdict::Accepted);
        assert_eq!(analysis.skipped, Some(SkipReason::Undecodable));
        assert_eq!(analysis.verdict.as_pair(), (false, ""));
    }

    #[test]
    fn test_decoder_panic_is_accepted() {
        let analyzer = PhotoAnalyzer::new(Box::new(PanickingDecoder))
            .with_detector(Box::new(Always(RejectReason::Blur)));
        assert_eq!(analyzer.analyze(&[1], "a.jpg", 1), Verdict::Accepted);
    }

    #[test]
    fn test_detector_error_and_panic_mean_nothing_found() {
        for panic in [false, true] {
            let analyzer = PhotoAnalyzer::new(Box::new(ByteDecoder))
                .with_detector(Box::new(Failing { panic }))
                .with_detector(Box::new(Always(RejectReason::Underexposed)));
            assert_eq!(
                analyzer.analyze(&[128], "a.jpg", 1),
                Verdict::Rejected(RejectReason::Underexposed)
            );
        }
    }

    #[test]
    fn test_no_detectors_accepts() {
        let analyzer = PhotoAnalyzer::new(Box::new(ByteDecoder));
        assert_eq!(analyzer.analyze(&[0], "black.jpg", 1), Verdict::Accepted);
    }
}
