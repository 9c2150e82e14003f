//! Results returned by orchestrator operations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{FolderId, PhotoId, RejectReason, SkipReason, Verdict};

/// Where a folder stands after a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassState {
    /// Nothing was committed this call and photos remain.
    HasUnanalyzedPhotos,
    /// A batch was committed and more photos remain.
    BatchComplete,
    /// No unanalyzed photos remain.
    FolderFullyAnalyzed,
}

/// Outcome of one photo in a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoOutcome {
    pub photo_id: PhotoId,
    pub file_name: String,
    #[serde(flatten)]
    pub verdict: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<SkipReason>,
}

/// A photo whose outcome could not be persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoFailure {
    pub photo_id: PhotoId,
    pub error: String,
}

/// Summary of one defect pass invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassReport {
    pub folder_id: FolderId,
    pub rejects_folder_id: FolderId,
    /// Photos whose outcome was committed in this call.
    pub processed: usize,
    /// Of those, how many went to the rejects folder.
    pub rejected: usize,
    /// Unanalyzed photos left in the source folder.
    pub remaining: u64,
    /// Set when the pass started with a reset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset: Option<ResetReport>,
    pub outcomes: Vec<PhotoOutcome>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<PhotoFailure>,
}

impl PassReport {
    #[must_use]
    pub fn state(&self) -> PassState {
        if self.remaining == 0 {
            PassState::FolderFullyAnalyzed
        } else if self.processed > 0 {
            PassState::BatchComplete
        } else {
            PassState::HasUnanalyzedPhotos
        }
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.remaining == 0
    }
}

/// Summary of a folder reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetReport {
    pub folder_id: FolderId,
    /// Photos moved back from the rejects folder.
    pub restored: u64,
    /// Photos whose analysis flag was cleared.
    pub cleared: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed_rejects_folder: Option<FolderId>,
}

/// Summary of a single-photo restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreReport {
    pub photo_id: PhotoId,
    /// Folder the photo was moved back to.
    pub folder_id: FolderId,
    /// Reason the photo had been rejected with.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_reason: Option<RejectReason>,
    /// Set when the rejects folder became empty and was removed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed_rejects_folder: Option<FolderId>,
}

/// Analysis counts for a source folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderStatus {
    pub folder_id: FolderId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejects_folder_id: Option<FolderId>,
    /// Eligible photos still waiting for a pass.
    pub unanalyzed: u64,
    /// Analyzed photos kept in the source folder.
    pub accepted: u64,
    /// Videos, never analyzed.
    pub videos: u64,
    /// Photos in the rejects folder by reason.
    pub rejected: BTreeMap<RejectReason, u64>,
}

impl FolderStatus {
    #[must_use]
    pub fn rejected_total(&self) -> u64 {
        self.rejected.values().sum()
    }
}
