//! Defect findings and per-photo verdicts.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Rect, RejectReason};

/// Final decision for one photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "snake_case")]
pub enum Verdict {
    Accepted,
    Rejected(RejectReason),
}

impl Verdict {
    #[must_use]
    pub fn is_rejected(self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// The `(rejected, reason)` pair, with an empty reason for accepted photos.
    #[must_use]
    pub fn as_pair(self) -> (bool, &'static str) {
        match self {
            Self::Accepted => (false, ""),
            Self::Rejected(reason) => (true, reason.as_str()),
        }
    }
}

/// A positive finding from one defect detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Defect {
    pub reason: RejectReason,
    pub details: DefectDetails,
}

impl Defect {
    #[must_use]
    pub fn new(reason: RejectReason, details: DefectDetails) -> Self {
        Self { reason, details }
    }
}

/// Measurements behind a finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefectDetails {
    Blur(BlurDetails),
    Exposure(ExposureDetails),
    Eyes(EyesTrace),
}

/// Blur measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlurDetails {
    /// Variance of the Laplacian response.
    pub laplacian_variance: f64,
    pub threshold: f64,
}

/// Exposure measurement for one direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExposureDetails {
    /// Share of pixels past `level`, in `[0, 1]`.
    pub fraction: f64,
    /// Intensity cut-off the fraction was measured against.
    pub level: u8,
    /// Fraction that must be exceeded to reject.
    pub max_fraction: f64,
}

/// Reasoned trace of the closed-eyes check, one entry per detected face.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EyesTrace {
    pub faces: Vec<FaceTrace>,
}

impl EyesTrace {
    /// Whether any face was judged definitely closed.
    #[must_use]
    pub fn any_closed(&self) -> bool {
        self.faces
            .iter()
            .any(|face| face.verdict == FaceVerdict::Closed)
    }
}

/// Judgement for one face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaceVerdict {
    /// Eye evidence says open.
    Open,
    /// A smile overrides the eye evidence.
    Smiling,
    /// Evidence is mixed or a sub-check failed; accepted.
    Uncertain,
    /// No eye, pupil or brightness evidence at all.
    Closed,
}

/// Evidence gathered from the eye region of one face.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EyeEvidence {
    /// Eyes reported by the feature detector.
    pub eyes: usize,
    /// Dark round blobs that look like pupils.
    pub pupils: usize,
    /// Mean intensity of the eye region.
    pub mean: f64,
    /// Population standard deviation of the eye region.
    pub std_dev: f64,
}

/// Trace of one face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceTrace {
    /// Face box in the normalized frame.
    pub bbox: Rect,
    /// Scale applied before analysis, 1.0 when the face was large enough.
    pub scale: f32,
    pub smiling: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<EyeEvidence>,
    pub verdict: FaceVerdict,
}

impl fmt::Display for FaceTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "face {}x{}@({},{}) {:?}",
            self.bbox.width, self.bbox.height, self.bbox.x, self.bbox.y, self.verdict
        )?;
        if let Some(ev) = self.evidence {
            write!(
                f,
                " eyes={} pupils={} mean={:.1} std={:.1}",
                ev.eyes, ev.pupils, ev.mean, ev.std_dev
            )?;
        }
        Ok(())
    }
}
