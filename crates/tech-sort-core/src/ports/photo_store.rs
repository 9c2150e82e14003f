//! Folder and photo persistence port.

use std::collections::BTreeMap;

use crate::domain::{Folder, FolderId, NewFolder, Photo, PhotoId, RejectReason, TechState};
use crate::error::StoreError;

/// Per-state photo counts of one folder, live photos only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateCounts {
    pub unanalyzed: u64,
    pub accepted: u64,
    pub rejected: BTreeMap<RejectReason, u64>,
    pub videos: u64,
}

/// The subset of folder and photo records the defect pass touches.
///
/// Soft-deleted folders are returned by [`PhotoStore::folder`] with
/// `deleted` set; every photo query only sees live photos.
pub trait PhotoStore: Send + Sync {
    /// Looks up a folder by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on storage failure.
    fn folder(&self, id: FolderId) -> Result<Option<Folder>, StoreError>;

    /// The live rejects child of `parent`, if one exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on storage failure.
    fn rejects_folder_of(&self, parent: FolderId) -> Result<Option<Folder>, StoreError>;

    /// Creates a folder.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when a live rejects folder already
    /// exists for the same parent, [`StoreError::Backend`] otherwise.
    fn create_folder(&self, folder: NewFolder) -> Result<Folder, StoreError>;

    /// Marks a folder deleted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the folder does not exist.
    fn soft_delete_folder(&self, id: FolderId) -> Result<(), StoreError>;

    /// Looks up a live photo by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on storage failure.
    fn photo(&self, id: PhotoId) -> Result<Option<Photo>, StoreError>;

    /// Up to `limit` eligible unanalyzed photos of `folder`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on storage failure.
    fn unanalyzed_photos(&self, folder: FolderId, limit: usize) -> Result<Vec<Photo>, StoreError>;

    /// Number of eligible unanalyzed photos of `folder`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on storage failure.
    fn count_unanalyzed(&self, folder: FolderId) -> Result<u64, StoreError>;

    /// Number of live photos in `folder`, videos included.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on storage failure.
    fn count_photos(&self, folder: FolderId) -> Result<u64, StoreError>;

    /// Writes a photo's analysis state and folder in one update.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the photo does not exist.
    fn record_state(&self, photo: PhotoId, folder: FolderId, state: TechState)
        -> Result<(), StoreError>;

    /// Moves every live photo of `from` into `to`, clearing reject reasons.
    /// The analysis flag is left alone. Returns the number of photos moved.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on storage failure.
    fn move_all(&self, from: FolderId, to: FolderId) -> Result<u64, StoreError>;

    /// Resets every live photo of `folder` to unanalyzed. Returns the number
    /// of photos that were analyzed before.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on storage failure.
    fn clear_analysis(&self, folder: FolderId) -> Result<u64, StoreError>;

    /// Live photo counts of `folder` by state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on storage failure.
    fn state_counts(&self, folder: FolderId) -> Result<StateCounts, StoreError>;
}
