//! In-memory and scripted implementations of the core ports.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, bail};
use chrono::{DateTime, Utc};
use image::GrayImage;
use tech_sort_core::domain::{
    DecodeOrigin, DecodedImage, Folder, FolderId, FolderType, LoadOutcome, NewFolder, Photo, PhotoId, Rect,
    SkipReason, TechState,
};
use tech_sort_core::error::StoreError;
use tech_sort_core::ports::{
    BlobStore, Detection, FeatureDetector, ImageDecoder, PhotoStore, ProgressEvent, ProgressSink,
    StateCounts,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// === Photo store ===

#[derive(Default)]
struct Records {
    folders: BTreeMap<FolderId, Folder>,
    photos: BTreeMap<PhotoId, Photo>,
    next_folder: i64,
    next_photo: i64,
}

/// `PhotoStore` backed by two maps behind a mutex.
///
/// Photo ids and `created_at` both increase with insertion order, so
/// batches come back in the order photos were added.
#[derive(Default)]
pub struct MemoryPhotoStore {
    records: Mutex<Records>,
}

impl MemoryPhotoStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a folder, panicking on conflicts.
    ///
    /// # Panics
    ///
    /// Panics if a second live rejects folder is requested for a parent.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn add_folder(&self, folder: NewFolder) -> Folder {
        self.create_folder(folder).expect("adding a test folder")
    }

    /// Adds an unanalyzed still photo with key `<folder prefix><file_name>`.
    ///
    /// # Panics
    ///
    /// Panics if `folder` does not exist.
    pub fn add_photo(&self, folder: FolderId, file_name: &str, size_bytes: u64) -> Photo {
        self.insert(folder, file_name, size_bytes, false)
    }

    /// Adds a video; videos are never analyzed.
    ///
    /// # Panics
    ///
    /// Panics if `folder` does not exist.
    pub fn add_video(&self, folder: FolderId, file_name: &str) -> Photo {
        self.insert(folder, file_name, 1024, true)
    }

    #[allow(clippy::expect_used)]
    fn insert(&self, folder: FolderId, file_name: &str, size_bytes: u64, is_video: bool) -> Photo {
        let mut records = lock(&self.records);
        let prefix = records
            .folders
            .get(&folder)
            .map(|f| f.storage_prefix.clone())
            .expect("photo added to unknown folder");
        records.next_photo += 1;
        let id = PhotoId(records.next_photo);
        let photo = Photo {
            id,
            folder_id: folder,
            storage_key: format!("{prefix}{file_name}"),
            file_name: file_name.to_string(),
            content_type: if is_video { "video/mp4" } else { "image/jpeg" }.to_string(),
            size_bytes,
            width: None,
            height: None,
            is_video,
            state: TechState::Unanalyzed,
            deleted: false,
            created_at: DateTime::<Utc>::from_timestamp(id.0, 0).unwrap_or_default(),
        };
        records.photos.insert(id, photo.clone());
        photo
    }

    /// Applies `edit` to a stored photo, deleted or not.
    pub fn update_photo(&self, id: PhotoId, edit: impl FnOnce(&mut Photo)) {
        if let Some(photo) = lock(&self.records).photos.get_mut(&id) {
            edit(photo);
        }
    }

    /// A photo regardless of its deleted flag.
    #[must_use]
    pub fn raw_photo(&self, id: PhotoId) -> Option<Photo> {
        lock(&self.records).photos.get(&id).cloned()
    }

    /// Live photos of a folder in id order.
    #[must_use]
    pub fn photos_in(&self, folder: FolderId) -> Vec<Photo> {
        lock(&self.records)
            .photos
            .values()
            .filter(|p| p.folder_id == folder && !p.deleted)
            .cloned()
            .collect()
    }

    /// Every folder ever created, soft-deleted ones included.
    #[must_use]
    pub fn folders(&self) -> Vec<Folder> {
        lock(&self.records).folders.values().cloned().collect()
    }
}

impl PhotoStore for MemoryPhotoStore {
    fn folder(&self, id: FolderId) -> Result<Option<Folder>, StoreError> {
        Ok(lock(&self.records).folders.get(&id).cloned())
    }

    fn rejects_folder_of(&self, parent: FolderId) -> Result<Option<Folder>, StoreError> {
        Ok(lock(&self.records)
            .folders
            .values()
            .find(|f| f.parent == Some(parent) && f.is_rejects() && !f.deleted)
            .cloned())
    }

    fn create_folder(&self, folder: NewFolder) -> Result<Folder, StoreError> {
        let mut records = lock(&self.records);
        if folder.folder_type == FolderType::TechRejects
            && records
                .folders
                .values()
                .any(|f| f.parent == folder.parent && f.is_rejects() && !f.deleted)
        {
            return Err(StoreError::Conflict(format!(
                "live rejects folder already exists under {:?}",
                folder.parent
            )));
        }
        records.next_folder += 1;
        let created = Folder {
            id: FolderId(records.next_folder),
            owner: folder.owner,
            parent: folder.parent,
            name: folder.name,
            folder_type: folder.folder_type,
            storage_prefix: folder.storage_prefix,
            deleted: false,
        };
        records.folders.insert(created.id, created.clone());
        Ok(created)
    }

    fn soft_delete_folder(&self, id: FolderId) -> Result<(), StoreError> {
        let mut records = lock(&self.records);
        let folder = records
            .folders
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("folder {id}")))?;
        folder.deleted = true;
        Ok(())
    }

    fn photo(&self, id: PhotoId) -> Result<Option<Photo>, StoreError> {
        Ok(lock(&self.records)
            .photos
            .get(&id)
            .filter(|p| !p.deleted)
            .cloned())
    }

    fn unanalyzed_photos(&self, folder: FolderId, limit: usize) -> Result<Vec<Photo>, StoreError> {
        let records = lock(&self.records);
        let mut eligible: Vec<Photo> = records
            .photos
            .values()
            .filter(|p| p.folder_id == folder && p.is_eligible())
            .cloned()
            .collect();
        eligible.sort_by_key(|p| (p.created_at, p.id));
        eligible.truncate(limit);
        Ok(eligible)
    }

    fn count_unanalyzed(&self, folder: FolderId) -> Result<u64, StoreError> {
        let records = lock(&self.records);
        Ok(records
            .photos
            .values()
            .filter(|p| p.folder_id == folder && p.is_eligible())
            .count() as u64)
    }

    fn count_photos(&self, folder: FolderId) -> Result<u64, StoreError> {
        let records = lock(&self.records);
        Ok(records
            .photos
            .values()
            .filter(|p| p.folder_id == folder && !p.deleted)
            .count() as u64)
    }

    fn record_state(&self, photo: PhotoId, folder: FolderId, state: TechState) -> Result<(), StoreError> {
        let mut records = lock(&self.records);
        let stored = records
            .photos
            .get_mut(&photo)
            .filter(|p| !p.deleted)
            .ok_or_else(|| StoreError::NotFound(format!("photo {photo}")))?;
        stored.folder_id = folder;
        stored.state = state;
        Ok(())
    }

    fn move_all(&self, from: FolderId, to: FolderId) -> Result<u64, StoreError> {
        let mut records = lock(&self.records);
        let mut moved = 0;
        for photo in records
            .photos
            .values_mut()
            .filter(|p| p.folder_id == from && !p.deleted)
        {
            photo.folder_id = to;
            if photo.state.is_analyzed() {
                photo.state = TechState::Accepted;
            }
            moved += 1;
        }
        Ok(moved)
    }

    fn clear_analysis(&self, folder: FolderId) -> Result<u64, StoreError> {
        let mut records = lock(&self.records);
        let mut cleared = 0;
        for photo in records
            .photos
            .values_mut()
            .filter(|p| p.folder_id == folder && !p.deleted && p.state.is_analyzed())
        {
            photo.state = TechState::Unanalyzed;
            cleared += 1;
        }
        Ok(cleared)
    }

    fn state_counts(&self, folder: FolderId) -> Result<StateCounts, StoreError> {
        let records = lock(&self.records);
        let mut counts = StateCounts::default();
        for photo in records
            .photos
            .values()
            .filter(|p| p.folder_id == folder && !p.deleted)
        {
            if photo.is_video {
                counts.videos += 1;
                continue;
            }
            match photo.state {
                TechState::Unanalyzed => counts.unanalyzed += 1,
                TechState::Accepted => counts.accepted += 1,
                TechState::Rejected(reason) => *counts.rejected.entry(reason).or_default() += 1,
            }
        }
        Ok(counts)
    }
}

/// Wraps a [`MemoryPhotoStore`] and makes `record_state` fail on demand.
pub struct FlakyPhotoStore {
    inner: Arc<MemoryPhotoStore>,
    transient_failures: Mutex<u32>,
    broken: Mutex<Vec<PhotoId>>,
    record_calls: Mutex<u32>,
}

impl FlakyPhotoStore {
    #[must_use]
    pub fn new(inner: Arc<MemoryPhotoStore>) -> Self {
        Self {
            inner,
            transient_failures: Mutex::new(0),
            broken: Mutex::new(Vec::new()),
            record_calls: Mutex::new(0),
        }
    }

    /// The next `count` state updates fail, whatever photo they target.
    #[must_use]
    pub fn failing_next(self, count: u32) -> Self {
        *lock(&self.transient_failures) = count;
        self
    }

    /// Every state update for `photo` fails.
    #[must_use]
    pub fn always_failing_for(self, photo: PhotoId) -> Self {
        lock(&self.broken).push(photo);
        self
    }

    /// Number of `record_state` calls seen, failed ones included.
    #[must_use]
    pub fn record_calls(&self) -> u32 {
        *lock(&self.record_calls)
    }
}

impl PhotoStore for FlakyPhotoStore {
    fn folder(&self, id: FolderId) -> Result<Option<Folder>, StoreError> {
        self.inner.folder(id)
    }

    fn rejects_folder_of(&self, parent: FolderId) -> Result<Option<Folder>, StoreError> {
        self.inner.rejects_folder_of(parent)
    }

    fn create_folder(&self, folder: NewFolder) -> Result<Folder, StoreError> {
        self.inner.create_folder(folder)
    }

    fn soft_delete_folder(&self, id: FolderId) -> Result<(), StoreError> {
        self.inner.soft_delete_folder(id)
    }

    fn photo(&self, id: PhotoId) -> Result<Option<Photo>, StoreError> {
        self.inner.photo(id)
    }

    fn unanalyzed_photos(&self, folder: FolderId, limit: usize) -> Result<Vec<Photo>, StoreError> {
        self.inner.unanalyzed_photos(folder, limit)
    }

    fn count_unanalyzed(&self, folder: FolderId) -> Result<u64, StoreError> {
        self.inner.count_unanalyzed(folder)
    }

    fn count_photos(&self, folder: FolderId) -> Result<u64, StoreError> {
        self.inner.count_photos(folder)
    }

    fn record_state(&self, photo: PhotoId, folder: FolderId, state: TechState) -> Result<(), StoreError> {
        *lock(&self.record_calls) += 1;
        if lock(&self.broken).contains(&photo) {
            return Err(StoreError::backend(format!("update of photo {photo} refused")));
        }
        {
            let mut remaining = lock(&self.transient_failures);
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StoreError::backend("transient write failure"));
            }
        }
        self.inner.record_state(photo, folder, state)
    }

    fn move_all(&self, from: FolderId, to: FolderId) -> Result<u64, StoreError> {
        self.inner.move_all(from, to)
    }

    fn clear_analysis(&self, folder: FolderId) -> Result<u64, StoreError> {
        self.inner.clear_analysis(folder)
    }

    fn state_counts(&self, folder: FolderId) -> Result<StateCounts, StoreError> {
        self.inner.state_counts(folder)
    }
}

// === Blob store ===

/// `BlobStore` over a hash map, counting downloads.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    gets: Mutex<Vec<String>>,
    failing_gets: Mutex<bool>,
}

impl MemoryBlobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, data: Vec<u8>) {
        lock(&self.objects).insert(key.into(), data);
    }

    /// Makes every `get` fail while `head` keeps working.
    pub fn fail_gets(&self) {
        *lock(&self.failing_gets) = true;
    }

    /// Keys passed to `get`, in call order.
    #[must_use]
    pub fn downloaded(&self) -> Vec<String> {
        lock(&self.gets).clone()
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        lock(&self.objects).contains_key(key)
    }
}

impl BlobStore for MemoryBlobStore {
    fn head(&self, key: &str) -> anyhow::Result<u64> {
        lock(&self.objects)
            .get(key)
            .map(|data| data.len() as u64)
            .ok_or_else(|| anyhow!("no object at {key}"))
    }

    fn get(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        lock(&self.gets).push(key.to_string());
        if *lock(&self.failing_gets) {
            bail!("download of {key} interrupted");
        }
        lock(&self.objects)
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow!("no object at {key}"))
    }

    fn put(&self, key: &str, data: &[u8]) -> anyhow::Result<()> {
        self.insert(key, data.to_vec());
        Ok(())
    }

    fn copy(&self, from: &str, to: &str) -> anyhow::Result<()> {
        let data = self.get(from)?;
        self.insert(to, data);
        Ok(())
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        lock(&self.objects).remove(key);
        Ok(())
    }
}

// === Decoding ===

/// Decoder that trusts the `image` crate's sniffing and nothing else.
///
/// No size ceiling, no downscaling, no RAW support.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleDecoder;

impl ImageDecoder for SimpleDecoder {
    fn load_bounded(&self, blob: &[u8], _file_name: &str, _declared_size: u64) -> LoadOutcome {
        match image::load_from_memory(blob) {
            Ok(img) => {
                let (w, h) = (img.width(), img.height());
                LoadOutcome::Decoded(DecodedImage::new(img.to_luma8(), w, h, DecodeOrigin::Raster))
            }
            Err(_) => LoadOutcome::Skipped(SkipReason::Undecodable),
        }
    }
}

// === Feature detection ===

/// Rule for when [`ScriptedFeatureDetector`] reports a face.
#[derive(Debug, Clone, Copy)]
enum FaceRule {
    Always(Rect),
    /// Report `face` only while the sampled pixel is darker than `below`.
    WhenDark { face: Rect, at: (u32, u32), below: u8 },
}

/// `FeatureDetector` that answers from a script instead of a model.
#[derive(Debug, Clone, Default)]
pub struct ScriptedFeatureDetector {
    faces: Vec<FaceRule>,
    eyes: usize,
    smile: Option<f32>,
    failing_eyes: bool,
    failing_faces: bool,
}

impl ScriptedFeatureDetector {
    /// Finds nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Always reports `face`.
    #[must_use]
    pub fn with_face(mut self, face: Rect) -> Self {
        self.faces.push(FaceRule::Always(face));
        self
    }

    /// Reports `face` only when pixel `at` of the searched frame is
    /// darker than `below`.
    #[must_use]
    pub fn with_face_when_dark(mut self, face: Rect, at: (u32, u32), below: u8) -> Self {
        self.faces.push(FaceRule::WhenDark { face, at, below });
        self
    }

    /// Reports `count` eyes spread across each searched region.
    #[must_use]
    pub const fn with_eyes(mut self, count: usize) -> Self {
        self.eyes = count;
        self
    }

    /// Reports one smile of `confidence` in each searched region.
    #[must_use]
    pub const fn with_smile(mut self, confidence: f32) -> Self {
        self.smile = Some(confidence);
        self
    }

    #[must_use]
    pub const fn failing_eyes(mut self) -> Self {
        self.failing_eyes = true;
        self
    }

    #[must_use]
    pub const fn failing_faces(mut self) -> Self {
        self.failing_faces = true;
        self
    }
}

impl FeatureDetector for ScriptedFeatureDetector {
    fn detect_faces(&self, frame: &GrayImage) -> anyhow::Result<Vec<Detection>> {
        if self.failing_faces {
            bail!("face model unavailable");
        }
        Ok(self
            .faces
            .iter()
            .filter_map(|rule| match *rule {
                FaceRule::Always(face) => Some(face),
                FaceRule::WhenDark { face, at, below } => frame
                    .get_pixel_checked(at.0, at.1)
                    .filter(|p| p.0[0] < below)
                    .map(|_| face),
            })
            .map(|face| Detection::new(face, 0.95))
            .collect())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn detect_eyes(&self, _frame: &GrayImage, region: Rect) -> anyhow::Result<Vec<Detection>> {
        if self.failing_eyes {
            bail!("eye model unavailable");
        }
        let count = self.eyes as u32;
        if count == 0 {
            return Ok(Vec::new());
        }
        let width = (region.width / count).max(1);
        Ok((0..count)
            .map(|i| {
                Detection::new(
                    Rect::new(region.x + i * width, region.y, width, region.height),
                    0.9,
                )
            })
            .collect())
    }

    fn detect_smiles(&self, _frame: &GrayImage, region: Rect) -> anyhow::Result<Vec<Detection>> {
        Ok(self
            .smile
            .map(|confidence| Detection::new(region, confidence))
            .into_iter()
            .collect())
    }
}

// === Progress ===

/// `ProgressSink` that records every event.
#[derive(Default)]
pub struct RecordingProgressSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgressSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<ProgressEvent> {
        lock(&self.events).clone()
    }

    #[must_use]
    pub fn started_count(&self) -> usize {
        self.count(|e| matches!(e, ProgressEvent::Started { .. }))
    }

    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.count(|e| matches!(e, ProgressEvent::Completed { .. }))
    }

    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.count(|e| matches!(e, ProgressEvent::Skipped { .. }))
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.count(|e| matches!(e, ProgressEvent::Failed { .. }))
    }

    /// `(processed, rejected, remaining)` from the `Finished` event, if any.
    #[must_use]
    pub fn finished(&self) -> Option<(usize, usize, u64)> {
        self.events().iter().find_map(|e| match *e {
            ProgressEvent::Finished {
                processed,
                rejected,
                remaining,
            } => Some((processed, rejected, remaining)),
            _ => None,
        })
    }

    fn count(&self, pred: impl Fn(&ProgressEvent) -> bool) -> usize {
        lock(&self.events).iter().filter(|e| pred(e)).count()
    }
}

impl ProgressSink for RecordingProgressSink {
    fn on_event(&self, event: ProgressEvent) {
        lock(&self.events).push(event);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tech_sort_core::domain::{RejectReason, UserId, Verdict};

    fn store_with_folder() -> (MemoryPhotoStore, Folder) {
        let store = MemoryPhotoStore::new();
        let folder = store.add_folder(NewFolder::regular(UserId(1), "Trip", "u1/trip/"));
        (store, folder)
    }

    #[test]
    fn test_rejects_folder_is_unique_while_live() {
        let (store, folder) = store_with_folder();
        let rejects = store
            .create_folder(NewFolder::rejects_for(&folder, "Tech rejects"))
            .unwrap();
        assert_eq!(rejects.folder_type, FolderType::TechRejects);
        assert!(matches!(
            store.create_folder(NewFolder::rejects_for(&folder, "Tech rejects")),
            Err(StoreError::Conflict(_))
        ));

        store.soft_delete_folder(rejects.id).unwrap();
        assert!(store.rejects_folder_of(folder.id).unwrap().is_none());
        assert!(store
            .create_folder(NewFolder::rejects_for(&folder, "Tech rejects"))
            .is_ok());
    }

    #[test]
    fn test_batches_skip_videos_and_deleted() {
        let (store, folder) = store_with_folder();
        let a = store.add_photo(folder.id, "a.jpg", 10);
        store.add_video(folder.id, "clip.mp4");
        let gone = store.add_photo(folder.id, "gone.jpg", 10);
        store.update_photo(gone.id, |p| p.deleted = true);
        let b = store.add_photo(folder.id, "b.jpg", 10);

        let batch = store.unanalyzed_photos(folder.id, 5).unwrap();
        assert_eq!(batch.iter().map(|p| p.id).collect::<Vec<_>>(), vec![a.id, b.id]);
        assert_eq!(store.count_unanalyzed(folder.id).unwrap(), 2);
        assert_eq!(store.count_photos(folder.id).unwrap(), 3);
    }

    #[test]
    fn test_state_counts() {
        let (store, folder) = store_with_folder();
        let a = store.add_photo(folder.id, "a.jpg", 10);
        let b = store.add_photo(folder.id, "b.jpg", 10);
        store.add_photo(folder.id, "c.jpg", 10);
        store.add_video(folder.id, "v.mp4");
        store.record_state(a.id, folder.id, TechState::Accepted).unwrap();
        store
            .record_state(b.id, folder.id, TechState::Rejected(RejectReason::Blur))
            .unwrap();

        let counts = store.state_counts(folder.id).unwrap();
        assert_eq!(counts.unanalyzed, 1);
        assert_eq!(counts.accepted, 1);
        assert_eq!(counts.videos, 1);
        assert_eq!(counts.rejected.get(&RejectReason::Blur), Some(&1));
    }

    #[test]
    fn test_flaky_store_fails_then_recovers() {
        let (store, folder) = store_with_folder();
        let photo = store.add_photo(folder.id, "a.jpg", 10);
        let flaky = FlakyPhotoStore::new(Arc::new(store)).failing_next(1);
        assert!(flaky.record_state(photo.id, folder.id, TechState::Accepted).is_err());
        assert!(flaky.record_state(photo.id, folder.id, TechState::Accepted).is_ok());
        assert_eq!(flaky.record_calls(), 2);
    }

    #[test]
    fn test_blob_store_round_trip_and_failures() {
        let blobs = MemoryBlobStore::new();
        blobs.insert("k", vec![1, 2, 3]);
        assert_eq!(blobs.head("k").unwrap(), 3);
        assert_eq!(blobs.get("k").unwrap(), vec![1, 2, 3]);
        assert!(blobs.head("missing").is_err());
        blobs.delete("missing").unwrap();

        blobs.fail_gets();
        assert!(blobs.get("k").is_err());
        assert_eq!(blobs.downloaded(), vec!["k".to_string(), "k".to_string()]);
    }

    #[test]
    fn test_scripted_face_when_dark() {
        let face = Rect::new(10, 10, 20, 20);
        let detector = ScriptedFeatureDetector::new().with_face_when_dark(face, (15, 15), 20);
        let bright = GrayImage::from_pixel(40, 40, image::Luma([200]));
        let dark = GrayImage::from_pixel(40, 40, image::Luma([5]));
        assert!(detector.detect_faces(&bright).unwrap().is_empty());
        assert_eq!(detector.detect_faces(&dark).unwrap()[0].rect, face);
    }

    #[test]
    fn test_recording_sink() {
        let sink = RecordingProgressSink::new();
        sink.on_event(ProgressEvent::Completed {
            photo_id: PhotoId(1),
            verdict: Verdict::Accepted,
        });
        sink.on_event(ProgressEvent::Finished {
            processed: 1,
            rejected: 0,
            remaining: 4,
        });
        assert_eq!(sink.completed_count(), 1);
        assert_eq!(sink.finished(), Some((1, 0, 4)));
    }
}
