//! Core domain types for technical-defect analysis and reject routing.

mod defect;
mod detector;
mod image;
mod photo;
mod report;

pub use defect::{
    BlurDetails, Defect, DefectDetails, EyeEvidence, EyesTrace, ExposureDetails, FaceTrace,
    FaceVerdict, Verdict,
};
pub use detector::DefectDetector;
pub use image::{DecodeOrigin, DecodedImage, LoadOutcome, Rect, SkipReason};
pub use photo::{
    Folder, FolderId, FolderType, NewFolder, Photo, PhotoId, RejectReason, TechState, UserId,
};
pub use report::{
    FolderStatus, PassReport, PassState, PhotoFailure, PhotoOutcome, ResetReport, RestoreReport,
};
