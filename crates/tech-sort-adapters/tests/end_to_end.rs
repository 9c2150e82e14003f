//! Defect passes over the real adapters: SQLite records, a directory blob
//! store and the bounded decoder.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use chrono::DateTime;
use image::GrayImage;
use tech_sort_adapters::{BoundedDecoder, Database, FsBlobStore, NewPhoto, SqlitePhotoStore};
use tech_sort_core::domain::{Folder, NewFolder, Photo, Rect, RejectReason, TechState, UserId};
use tech_sort_core::modules::{BlurConfig, EyesConfig, EyesModule, ExposureConfig};
use tech_sort_core::ports::{BlobStore, PhotoStore};
use tech_sort_core::{DefectPass, PassConfig, PhotoAnalyzer};
use tech_sort_test_support::{ScriptedFeatureDetector, SyntheticImageBuilder};
use tempfile::TempDir;

const OWNER: UserId = UserId(1);
const FACE: Rect = Rect::new(40, 40, 120, 120);

struct Library {
    _dir: TempDir,
    store: Arc<SqlitePhotoStore>,
    blobs: Arc<FsBlobStore>,
    folder: Folder,
    next: i64,
}

impl Library {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("library.db")).unwrap();
        let store = Arc::new(SqlitePhotoStore::new(db));
        let blobs = Arc::new(FsBlobStore::open(dir.path().join("blobs")).unwrap());
        let folder = store
            .create_folder(NewFolder::regular(OWNER, "Holiday", "u1/holiday/"))
            .unwrap();
        Self {
            _dir: dir,
            store,
            blobs,
            folder,
            next: 0,
        }
    }

    fn add(&mut self, name: &str, bytes: &[u8]) -> Photo {
        let key = format!("{}{name}", self.folder.storage_prefix);
        self.blobs.put(&key, bytes).unwrap();
        self.next += 1;
        self.store
            .insert_photo(&NewPhoto {
                folder_id: self.folder.id,
                storage_key: key,
                file_name: name.to_string(),
                content_type: "image/png".to_string(),
                size_bytes: bytes.len() as u64,
                width: None,
                height: None,
                is_video: false,
                created_at: DateTime::from_timestamp(1_700_000_000 + self.next, 0).unwrap(),
            })
            .unwrap()
    }

    fn add_png(&mut self, name: &str, gray: &GrayImage) -> Photo {
        self.add(name, &SyntheticImageBuilder::png(gray))
    }

    fn pass(&self) -> DefectPass {
        let detector = ScriptedFeatureDetector::new().with_face_when_dark(FACE, (100, 87), 20);
        let analyzer = PhotoAnalyzer::new(Box::new(BoundedDecoder::default()))
            .with_standard_detectors(BlurConfig::default(), &ExposureConfig::default())
            .with_detector(Box::new(EyesModule::new(
                EyesConfig::default(),
                Arc::new(detector),
            )));
        DefectPass::new(
            self.store.clone(),
            self.blobs.clone(),
            analyzer,
            PassConfig::default(),
        )
    }

    fn state(&self, photo: &Photo) -> TechState {
        self.store.photo(photo.id).unwrap().unwrap().state
    }
}

#[test]
fn test_mixed_folder_sorted_in_one_pass() {
    let mut lib = Library::new();
    let dark = lib.add_png(
        "textured_dark.png",
        &SyntheticImageBuilder::underexposed(64, 64, 0.6),
    );
    let bright = lib.add_png(
        "textured_bright.png",
        &SyntheticImageBuilder::overexposed(64, 64, 0.5),
    );
    let flat = lib.add_png("flat.png", &SyntheticImageBuilder::uniform_gray(64, 64, 128));
    let sharp = lib.add_png("sharp.png", &SyntheticImageBuilder::well_exposed_sharp(64, 64));
    let portrait = lib.add_png(
        "portrait.png",
        &SyntheticImageBuilder::face_with_eye_band(200, 200, FACE, 6),
    );

    let report = lib.pass().run(OWNER, lib.folder.id, false).unwrap();

    assert_eq!(report.processed, 5);
    assert_eq!(report.rejected, 4);
    assert_eq!(report.remaining, 0);
    assert_eq!(lib.state(&dark), TechState::Rejected(RejectReason::Underexposed));
    assert_eq!(lib.state(&bright), TechState::Rejected(RejectReason::Overexposed));
    assert_eq!(lib.state(&flat), TechState::Rejected(RejectReason::Blur));
    assert_eq!(lib.state(&sharp), TechState::Accepted);
    assert_eq!(lib.state(&portrait), TechState::Rejected(RejectReason::ClosedEyes));

    let rejects = lib.store.rejects_folder_of(lib.folder.id).unwrap().unwrap();
    assert_eq!(rejects.id, report.rejects_folder_id);
    assert_eq!(rejects.name, "Holiday - Tech rejects");
    assert_eq!(lib.store.count_photos(rejects.id).unwrap(), 4);
}

#[test]
fn test_reset_then_rerun_reproduces_rejects() {
    let mut lib = Library::new();
    let flat = lib.add_png("flat.png", &SyntheticImageBuilder::uniform_gray(64, 64, 90));
    let sharp = lib.add_png("sharp.png", &SyntheticImageBuilder::well_exposed_sharp(64, 64));
    let pass = lib.pass();

    let first = pass.run(OWNER, lib.folder.id, false).unwrap();
    assert_eq!(first.rejected, 1);

    let reset = pass.reset(OWNER, lib.folder.id).unwrap();
    assert_eq!(reset.restored, 1);
    assert_eq!(reset.cleared, 2);
    assert_eq!(reset.removed_rejects_folder, Some(first.rejects_folder_id));
    assert!(lib.store.rejects_folder_of(lib.folder.id).unwrap().is_none());
    assert_eq!(lib.store.count_unanalyzed(lib.folder.id).unwrap(), 2);

    let second = pass.run(OWNER, lib.folder.id, false).unwrap();
    assert_eq!(second.rejected, 1);
    assert_ne!(second.rejects_folder_id, first.rejects_folder_id);
    assert_eq!(lib.state(&flat), TechState::Rejected(RejectReason::Blur));
    assert_eq!(lib.state(&sharp), TechState::Accepted);
}

#[test]
fn test_unreadable_objects_are_accepted() {
    let mut lib = Library::new();
    let garbage = lib.add("notes.jpg", b"definitely not a jpeg");
    let missing = lib.add_png("gone.png", &SyntheticImageBuilder::uniform_gray(8, 8, 0));
    lib.blobs.delete(&missing.storage_key).unwrap();

    let report = lib.pass().run(OWNER, lib.folder.id, false).unwrap();
    assert_eq!(report.processed, 2);
    assert_eq!(report.rejected, 0);
    assert_eq!(lib.state(&garbage), TechState::Accepted);
    assert_eq!(lib.state(&missing), TechState::Accepted);
}

#[test]
fn test_jpeg_with_wrong_extension_still_analyzed() {
    let mut lib = Library::new();
    let bytes = SyntheticImageBuilder::jpeg(&SyntheticImageBuilder::uniform_gray(64, 64, 250));
    let photo = lib.add("mislabeled.png", &bytes);

    lib.pass().run(OWNER, lib.folder.id, false).unwrap();
    assert!(matches!(lib.state(&photo), TechState::Rejected(_)));
}

#[test]
fn test_database_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("library.db");
    let folder = {
        let store = SqlitePhotoStore::new(Database::open(&path).unwrap());
        store
            .create_folder(NewFolder::regular(OWNER, "Kept", "u1/kept/"))
            .unwrap()
    };
    let store = SqlitePhotoStore::new(Database::open(&path).unwrap());
    assert_eq!(store.folder(folder.id).unwrap(), Some(folder));
}
