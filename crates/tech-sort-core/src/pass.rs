//! Batch orchestrator and reject router.
//!
//! One call to [`DefectPass::run`] analyzes at most one bounded batch of
//! unanalyzed photos, commits each verdict as it goes, and reports how many
//! photos remain. Progress lives entirely in the store, so callers simply
//! invoke again until `remaining` reaches zero.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::analyzer::{Analysis, PhotoAnalyzer};
use crate::domain::{
    Folder, FolderId, FolderStatus, NewFolder, PassReport, Photo, PhotoFailure, PhotoId,
    PhotoOutcome, ResetReport, RestoreReport, SkipReason, TechState, UserId, Verdict,
};
use crate::error::{PassError, StoreError};
use crate::ports::{BlobStore, PhotoStore, ProgressEvent, ProgressSink};

/// Tunables for the defect pass.
#[derive(Debug, Clone)]
pub struct PassConfig {
    /// Photos analyzed per invocation.
    pub batch_size: usize,
    /// Objects larger than this are accepted without being downloaded.
    pub max_object_bytes: u64,
    /// Rejects folders are named `"<source> - <suffix>"`.
    pub rejects_suffix: String,
}

impl Default for PassConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            max_object_bytes: 35 * 1024 * 1024,
            rejects_suffix: "Tech rejects".to_string(),
        }
    }
}

/// Runs defect passes against a photo store and a blob store.
pub struct DefectPass {
    store: Arc<dyn PhotoStore>,
    blobs: Arc<dyn BlobStore>,
    analyzer: PhotoAnalyzer,
    config: PassConfig,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl DefectPass {
    #[must_use]
    pub fn new(
        store: Arc<dyn PhotoStore>,
        blobs: Arc<dyn BlobStore>,
        analyzer: PhotoAnalyzer,
        config: PassConfig,
    ) -> Self {
        Self {
            store,
            blobs,
            analyzer,
            config,
            progress: None,
        }
    }

    /// Attaches a progress sink.
    #[must_use]
    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    #[must_use]
    pub const fn config(&self) -> &PassConfig {
        &self.config
    }

    /// Analyzes one batch of `folder_id`, optionally resetting it first.
    ///
    /// # Errors
    ///
    /// Fails when the folder is missing, owned by someone else or is itself
    /// a rejects folder, or when the store fails outside a single photo
    /// update. Problems with individual photos never fail the pass.
    pub fn run(&self, owner: UserId, folder_id: FolderId, reset: bool) -> Result<PassReport, PassError> {
        let source = self.source_folder(owner, folder_id)?;
        let reset = if reset {
            Some(self.reset_folder(&source)?)
        } else {
            None
        };
        let rejects = self.ensure_rejects_folder(&source)?;

        let batch = self
            .store
            .unanalyzed_photos(source.id, self.config.batch_size)?;
        let pending = self.store.count_unanalyzed(source.id)?;
        self.emit(ProgressEvent::BatchStarted {
            size: batch.len(),
            pending,
        });

        let mut outcomes = Vec::with_capacity(batch.len());
        let mut failed = Vec::new();
        for (index, photo) in batch.iter().enumerate() {
            self.emit(ProgressEvent::Started {
                photo_id: photo.id,
                file_name: photo.file_name.clone(),
                index,
            });

            let analysis = self.fetch_and_analyze(photo);
            if let Some(reason) = analysis.skipped {
                self.emit(ProgressEvent::Skipped {
                    photo_id: photo.id,
                    reason,
                });
            }

            let (target, state) = match analysis.verdict {
                Verdict::Accepted => (source.id, TechState::Accepted),
                Verdict::Rejected(reason) => (rejects.id, TechState::Rejected(reason)),
            };
            match self.persist(photo.id, target, state) {
                Ok(()) => {
                    debug!(photo = %photo.id, file = %photo.file_name, ?state, "verdict committed");
                    self.emit(ProgressEvent::Completed {
                        photo_id: photo.id,
                        verdict: analysis.verdict,
                    });
                    outcomes.push(PhotoOutcome {
                        photo_id: photo.id,
                        file_name: photo.file_name.clone(),
                        verdict: analysis.verdict,
                        skipped: analysis.skipped,
                    });
                }
                Err(e) => {
                    warn!("Could not record verdict for photo {}: {e}", photo.id);
                    self.emit(ProgressEvent::Failed {
                        photo_id: photo.id,
                        error: e.to_string(),
                    });
                    failed.push(PhotoFailure {
                        photo_id: photo.id,
                        error: e.to_string(),
                    });
                }
            }
        }

        let processed = outcomes.len();
        let rejected = outcomes.iter().filter(|o| o.verdict.is_rejected()).count();
        let remaining = self.store.count_unanalyzed(source.id)?;
        self.emit(ProgressEvent::Finished {
            processed,
            rejected,
            remaining,
        });
        info!(
            folder = %source.id,
            processed,
            rejected,
            remaining,
            failed = failed.len(),
            "defect pass finished"
        );

        Ok(PassReport {
            folder_id: source.id,
            rejects_folder_id: rejects.id,
            processed,
            rejected,
            remaining,
            reset,
            outcomes,
            failed,
        })
    }

    /// Undoes every pass over `folder_id`: rejected photos go back, the
    /// rejects folder is removed and all analysis flags are cleared.
    ///
    /// # Errors
    ///
    /// Same folder checks as [`run`](Self::run).
    pub fn reset(&self, owner: UserId, folder_id: FolderId) -> Result<ResetReport, PassError> {
        let source = self.source_folder(owner, folder_id)?;
        self.reset_folder(&source)
    }

    /// Moves a single rejected photo back to its source folder, keeping it
    /// marked analyzed. An emptied rejects folder is removed.
    ///
    /// # Errors
    ///
    /// Fails when the photo is missing, not in a rejects folder, owned by
    /// someone else, or its rejects folder has no live parent.
    pub fn restore_photo(&self, owner: UserId, photo_id: PhotoId) -> Result<RestoreReport, PassError> {
        let photo = self
            .store
            .photo(photo_id)?
            .ok_or(PassError::PhotoNotFound(photo_id))?;
        let rejects = self.live_folder(photo.folder_id)?;
        if rejects.owner != owner {
            return Err(PassError::AccessDenied {
                folder: rejects.id,
                user: owner,
            });
        }
        if !rejects.is_rejects() {
            return Err(PassError::NotRejected(photo_id));
        }
        let parent = rejects
            .parent
            .and_then(|id| self.live_folder(id).ok())
            .ok_or(PassError::OrphanRejectsFolder(rejects.id))?;

        self.persist(photo.id, parent.id, TechState::Accepted)?;
        let removed_rejects_folder = if self.store.count_photos(rejects.id)? == 0 {
            self.store.soft_delete_folder(rejects.id)?;
            Some(rejects.id)
        } else {
            None
        };
        info!(photo = %photo.id, folder = %parent.id, "photo restored from rejects");

        Ok(RestoreReport {
            photo_id: photo.id,
            folder_id: parent.id,
            previous_reason: photo.state.reason(),
            removed_rejects_folder,
        })
    }

    /// Analysis counts for a source folder and its rejects folder.
    ///
    /// # Errors
    ///
    /// Same folder checks as [`run`](Self::run).
    pub fn status(&self, owner: UserId, folder_id: FolderId) -> Result<FolderStatus, PassError> {
        let source = self.source_folder(owner, folder_id)?;
        let counts = self.store.state_counts(source.id)?;
        let rejects = self.store.rejects_folder_of(source.id)?;
        let rejected = match &rejects {
            Some(folder) => self.store.state_counts(folder.id)?.rejected,
            None => BTreeMap::new(),
        };
        Ok(FolderStatus {
            folder_id: source.id,
            rejects_folder_id: rejects.map(|f| f.id),
            unanalyzed: counts.unanalyzed,
            accepted: counts.accepted,
            videos: counts.videos,
            rejected,
        })
    }

    fn live_folder(&self, id: FolderId) -> Result<Folder, PassError> {
        self.store
            .folder(id)?
            .filter(|f| !f.deleted)
            .ok_or(PassError::FolderNotFound(id))
    }

    fn source_folder(&self, owner: UserId, id: FolderId) -> Result<Folder, PassError> {
        let folder = self.live_folder(id)?;
        if folder.owner != owner {
            return Err(PassError::AccessDenied {
                folder: id,
                user: owner,
            });
        }
        if folder.is_rejects() {
            return Err(PassError::RejectsFolder(id));
        }
        Ok(folder)
    }

    /// Finds or creates the live rejects child of `source`.
    fn ensure_rejects_folder(&self, source: &Folder) -> Result<Folder, PassError> {
        if let Some(existing) = self.store.rejects_folder_of(source.id)? {
            return Ok(existing);
        }
        match self
            .store
            .create_folder(NewFolder::rejects_for(source, &self.config.rejects_suffix))
        {
            Ok(created) => {
                info!(folder = %created.id, name = %created.name, "rejects folder created");
                Ok(created)
            }
            Err(StoreError::Conflict(detail)) => {
                debug!("Rejects folder created concurrently: {detail}");
                self.store.rejects_folder_of(source.id)?.ok_or_else(|| {
                    StoreError::NotFound(format!("rejects folder of {}", source.id)).into()
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn reset_folder(&self, source: &Folder) -> Result<ResetReport, PassError> {
        let mut report = ResetReport {
            folder_id: source.id,
            restored: 0,
            cleared: 0,
            removed_rejects_folder: None,
        };
        if let Some(rejects) = self.store.rejects_folder_of(source.id)? {
            report.restored = self.store.move_all(rejects.id, source.id)?;
            self.store.soft_delete_folder(rejects.id)?;
            report.removed_rejects_folder = Some(rejects.id);
        }
        report.cleared = self.store.clear_analysis(source.id)?;
        info!(
            folder = %source.id,
            restored = report.restored,
            cleared = report.cleared,
            "folder reset"
        );
        Ok(report)
    }

    /// Downloads and analyzes one photo. The body is dropped before returning.
    fn fetch_and_analyze(&self, photo: &Photo) -> Analysis {
        let size = match self.blobs.head(&photo.storage_key) {
            Ok(size) => size,
            Err(e) => {
                warn!("Could not stat {}: {e:#}", photo.storage_key);
                photo.size_bytes
            }
        };
        if size > self.config.max_object_bytes {
            debug!(photo = %photo.id, size, "object too large, accepted unseen");
            return Analysis::skipped(SkipReason::Oversized {
                size,
                limit: self.config.max_object_bytes,
            });
        }

        let body = match self.blobs.get(&photo.storage_key) {
            Ok(body) => body,
            Err(e) => {
                warn!("Could not fetch {}: {e:#}", photo.storage_key);
                return Analysis::skipped(SkipReason::Unreadable);
            }
        };
        self.analyzer
            .analyze_detailed(&body, &photo.file_name, size)
    }

    /// Writes a photo state, retrying once.
    fn persist(&self, photo: PhotoId, folder: FolderId, state: TechState) -> Result<(), StoreError> {
        match self.store.record_state(photo, folder, state) {
            Ok(()) => Ok(()),
            Err(first) => {
                debug!("Retrying update of photo {photo} after: {first}");
                self.store.record_state(photo, folder, state)
            }
        }
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(sink) = &self.progress {
            sink.on_event(event);
        }
    }
}
