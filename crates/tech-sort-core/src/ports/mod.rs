//! Port definitions for hexagonal architecture.
//!
//! These traits define the boundaries between the domain core and external adapters.

mod blob_store;
mod feature_detector;
mod image_decoder;
mod photo_store;
mod progress;

pub use blob_store::BlobStore;
pub use feature_detector::{Detection, FeatureDetector};
pub use image_decoder::ImageDecoder;
pub use photo_store::{PhotoStore, StateCounts};
pub use progress::{ProgressEvent, ProgressSink};
