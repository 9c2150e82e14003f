//! Typed errors for persistence and the defect pass.

use thiserror::Error;

use crate::domain::{FolderId, PhotoId, UserId};

/// Persistence failure reported by a [`PhotoStore`](crate::ports::PhotoStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    /// A uniqueness rule was violated, e.g. a second live rejects folder.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    /// Wraps any backend error.
    pub fn backend(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Backend(err.into())
    }
}

/// Why a defect pass, reset, restore or status query was refused.
///
/// Photo-level problems never show up here; they end in an accepted photo
/// or a [`PhotoFailure`](crate::domain::PhotoFailure) entry.
#[derive(Debug, Error)]
pub enum PassError {
    #[error("folder {0} not found")]
    FolderNotFound(FolderId),

    #[error("folder {folder} does not belong to user {user}")]
    AccessDenied { folder: FolderId, user: UserId },

    #[error("folder {0} is a rejects folder")]
    RejectsFolder(FolderId),

    #[error("photo {0} not found")]
    PhotoNotFound(PhotoId),

    #[error("photo {0} is not in a rejects folder")]
    NotRejected(PhotoId),

    #[error("rejects folder {0} has no live parent folder")]
    OrphanRejectsFolder(FolderId),

    #[error(transparent)]
    Store(#[from] StoreError),
}
