//! tech-sort core: technical-defect detection and reject routing.
//!
//! This crate holds the domain types, the ports adapters implement, the
//! blur / exposure / closed-eyes detectors, the photo analyzer and the batch
//! orchestrator that moves rejected photos into a managed rejects folder.

pub mod analyzer;
pub mod domain;
pub mod error;
pub mod inference;
pub mod modules;
pub mod pass;
pub mod ports;
pub mod vision;

pub use analyzer::{Analysis, PhotoAnalyzer};
pub use domain::{
    DecodedImage, Defect, Folder, FolderId, FolderStatus, LoadOutcome, PassReport, Photo, PhotoId,
    RejectReason, ResetReport, RestoreReport, SkipReason, TechState, UserId, Verdict,
};
pub use error::{PassError, StoreError};
pub use pass::{DefectPass, PassConfig};
pub use ports::{BlobStore, FeatureDetector, ImageDecoder, PhotoStore, ProgressEvent, ProgressSink};
