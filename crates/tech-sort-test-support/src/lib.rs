//! Test support for tech-sort.
//!
//! In-memory stores, a scripted feature detector and synthetic image
//! builders for exercising the defect pass without a database, object
//! storage or model weights.
//!
//! # Example
//!
//! ```
//! use tech_sort_test_support::{MemoryPhotoStore, SyntheticImageBuilder};
//!
//! let sharp = SyntheticImageBuilder::well_exposed_sharp(128, 128);
//! let png = SyntheticImageBuilder::png(&sharp);
//! assert!(!png.is_empty());
//!
//! let store = MemoryPhotoStore::new();
//! assert!(store.folders().is_empty());
//! ```

mod builders;
mod mocks;

pub use builders::SyntheticImageBuilder;
pub use mocks::{
    FlakyPhotoStore, MemoryBlobStore, MemoryPhotoStore, RecordingProgressSink,
    ScriptedFeatureDetector, SimpleDecoder,
};
