//! Progress reporting port for UI integration.

use crate::domain::{PhotoId, SkipReason, Verdict};

/// Events emitted while a batch is processed.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// A batch was selected.
    BatchStarted {
        /// Photos in this batch.
        size: usize,
        /// Unanalyzed photos in the folder before the batch.
        pending: u64,
    },
    /// Analysis started for a photo.
    Started {
        photo_id: PhotoId,
        file_name: String,
        /// Index in the batch (0-based).
        index: usize,
    },
    /// The photo's verdict was committed.
    Completed { photo_id: PhotoId, verdict: Verdict },
    /// The loader skipped the photo; it is accepted.
    Skipped { photo_id: PhotoId, reason: SkipReason },
    /// The verdict could not be persisted.
    Failed { photo_id: PhotoId, error: String },
    /// The batch is done.
    Finished {
        processed: usize,
        rejected: usize,
        remaining: u64,
    },
}

/// Port for receiving progress events.
pub trait ProgressSink: Send + Sync {
    /// Called when a progress event occurs.
    fn on_event(&self, event: ProgressEvent);
}
