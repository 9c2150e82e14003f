//! `PhotoStore` over the `folders` and `photos` tables.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use tech_sort_core::domain::{
    Folder, FolderId, FolderType, NewFolder, Photo, PhotoId, RejectReason, TechState, UserId,
};
use tech_sort_core::error::StoreError;
use tech_sort_core::ports::{PhotoStore, StateCounts};
use tracing::debug;

use super::Database;

const FOLDER_COLUMNS: &str =
    "id, owner_id, parent_id, name, folder_type, storage_prefix, is_deleted";
const PHOTO_COLUMNS: &str = "id, folder_id, storage_key, file_name, content_type, size_bytes, \
     width, height, is_video, tech_analyzed, tech_reject_reason, is_deleted, created_at";
/// Live, still, unanalyzed photos.
const ELIGIBLE: &str = "tech_analyzed = 0 AND is_video = 0 AND is_deleted = 0";

/// Parameters for registering a photo.
#[derive(Debug, Clone)]
pub struct NewPhoto {
    pub folder_id: FolderId,
    pub storage_key: String,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub is_video: bool,
    pub created_at: DateTime<Utc>,
}

/// SQLite-backed folder and photo store.
#[derive(Clone)]
pub struct SqlitePhotoStore {
    db: Database,
}

fn conversion_error(column: usize, ty: Type, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, ty, msg.into())
}

fn folder_from_row(row: &Row<'_>) -> Result<Folder, rusqlite::Error> {
    let folder_type: String = row.get(4)?;
    Ok(Folder {
        id: FolderId(row.get(0)?),
        owner: UserId(row.get(1)?),
        parent: row.get::<_, Option<i64>>(2)?.map(FolderId),
        name: row.get(3)?,
        folder_type: folder_type
            .parse::<FolderType>()
            .map_err(|e| conversion_error(4, Type::Text, e))?,
        storage_prefix: row.get(5)?,
        deleted: row.get(6)?,
    })
}

fn photo_from_row(row: &Row<'_>) -> Result<Photo, rusqlite::Error> {
    let reason = row
        .get::<_, Option<String>>(10)?
        .map(|r| r.parse::<RejectReason>())
        .transpose()
        .map_err(|e| conversion_error(10, Type::Text, e))?;
    let size: i64 = row.get(5)?;
    let micros: i64 = row.get(12)?;
    Ok(Photo {
        id: PhotoId(row.get(0)?),
        folder_id: FolderId(row.get(1)?),
        storage_key: row.get(2)?,
        file_name: row.get(3)?,
        content_type: row.get(4)?,
        size_bytes: u64::try_from(size).unwrap_or(0),
        width: row.get(6)?,
        height: row.get(7)?,
        is_video: row.get(8)?,
        state: TechState::from_columns(row.get(9)?, reason),
        deleted: row.get(11)?,
        created_at: DateTime::from_timestamp_micros(micros).ok_or_else(|| {
            conversion_error(12, Type::Integer, format!("timestamp {micros} out of range"))
        })?,
    })
}

fn to_micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

impl SqlitePhotoStore {
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Registers a photo as unanalyzed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if the folder does not exist.
    pub fn insert_photo(&self, photo: &NewPhoto) -> Result<Photo, StoreError> {
        let id = self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO photos (folder_id, storage_key, file_name, content_type, size_bytes,
                 width, height, is_video, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    photo.folder_id.0,
                    photo.storage_key,
                    photo.file_name,
                    photo.content_type,
                    to_i64(photo.size_bytes),
                    photo.width,
                    photo.height,
                    photo.is_video,
                    to_micros(photo.created_at),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })?;
        self.photo(PhotoId(id))?
            .ok_or_else(|| StoreError::NotFound(format!("photo {id}")))
    }

    /// Live top-level and rejects folders of `owner`, by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on storage failure.
    pub fn folders_of(&self, owner: UserId) -> Result<Vec<Folder>, StoreError> {
        Ok(self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {FOLDER_COLUMNS} FROM folders
                 WHERE owner_id = ?1 AND is_deleted = 0 ORDER BY id"
            ))?;
            let rows = stmt.query_map([owner.0], folder_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })?)
    }

    fn count(&self, sql: &str, folder: FolderId) -> Result<u64, StoreError> {
        let n: i64 = self
            .db
            .with_conn(|conn| Ok(conn.query_row(sql, [folder.0], |r| r.get(0))?))?;
        Ok(u64::try_from(n).unwrap_or(0))
    }
}

impl PhotoStore for SqlitePhotoStore {
    fn folder(&self, id: FolderId) -> Result<Option<Folder>, StoreError> {
        Ok(self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {FOLDER_COLUMNS} FROM folders WHERE id = ?1"),
                    [id.0],
                    folder_from_row,
                )
                .optional()?)
        })?)
    }

    fn rejects_folder_of(&self, parent: FolderId) -> Result<Option<Folder>, StoreError> {
        Ok(self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!(
                        "SELECT {FOLDER_COLUMNS} FROM folders
                         WHERE parent_id = ?1 AND folder_type = 'tech_rejects' AND is_deleted = 0"
                    ),
                    [parent.0],
                    folder_from_row,
                )
                .optional()?)
        })?)
    }

    fn create_folder(&self, folder: NewFolder) -> Result<Folder, StoreError> {
        let id = self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO folders (owner_id, parent_id, name, folder_type, storage_prefix)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    folder.owner.0,
                    folder.parent.map(|p| p.0),
                    folder.name,
                    folder.folder_type.as_str(),
                    folder.storage_prefix,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })?;
        debug!(folder = id, name = %folder.name, "folder created");
        self.folder(FolderId(id))?
            .ok_or_else(|| StoreError::NotFound(format!("folder {id}")))
    }

    fn soft_delete_folder(&self, id: FolderId) -> Result<(), StoreError> {
        let changed = self.db.with_conn(|conn| {
            Ok(conn.execute("UPDATE folders SET is_deleted = 1 WHERE id = ?1", [id.0])?)
        })?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("folder {id}")));
        }
        Ok(())
    }

    fn photo(&self, id: PhotoId) -> Result<Option<Photo>, StoreError> {
        Ok(self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {PHOTO_COLUMNS} FROM photos WHERE id = ?1 AND is_deleted = 0"),
                    [id.0],
                    photo_from_row,
                )
                .optional()?)
        })?)
    }

    fn unanalyzed_photos(&self, folder: FolderId, limit: usize) -> Result<Vec<Photo>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        Ok(self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PHOTO_COLUMNS} FROM photos
                 WHERE folder_id = ?1 AND {ELIGIBLE}
                 ORDER BY created_at, id LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![folder.0, limit], photo_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })?)
    }

    fn count_unanalyzed(&self, folder: FolderId) -> Result<u64, StoreError> {
        self.count(
            &format!("SELECT COUNT(*) FROM photos WHERE folder_id = ?1 AND {ELIGIBLE}"),
            folder,
        )
    }

    fn count_photos(&self, folder: FolderId) -> Result<u64, StoreError> {
        self.count(
            "SELECT COUNT(*) FROM photos WHERE folder_id = ?1 AND is_deleted = 0",
            folder,
        )
    }

    fn record_state(&self, photo: PhotoId, folder: FolderId, state: TechState) -> Result<(), StoreError> {
        let (analyzed, reason) = state.to_columns();
        let changed = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE photos SET folder_id = ?2, tech_analyzed = ?3, tech_reject_reason = ?4
                 WHERE id = ?1 AND is_deleted = 0",
                params![photo.0, folder.0, analyzed, reason.map(RejectReason::as_str)],
            )?)
        })?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("photo {photo}")));
        }
        Ok(())
    }

    fn move_all(&self, from: FolderId, to: FolderId) -> Result<u64, StoreError> {
        let moved = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE photos SET folder_id = ?2, tech_reject_reason = NULL
                 WHERE folder_id = ?1 AND is_deleted = 0",
                [from.0, to.0],
            )?)
        })?;
        Ok(moved as u64)
    }

    fn clear_analysis(&self, folder: FolderId) -> Result<u64, StoreError> {
        let cleared = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE photos SET tech_analyzed = 0, tech_reject_reason = NULL
                 WHERE folder_id = ?1 AND is_deleted = 0 AND tech_analyzed = 1",
                [folder.0],
            )?)
        })?;
        Ok(cleared as u64)
    }

    fn state_counts(&self, folder: FolderId) -> Result<StateCounts, StoreError> {
        let rows = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT is_video, tech_analyzed, tech_reject_reason, COUNT(*) FROM photos
                 WHERE folder_id = ?1 AND is_deleted = 0
                 GROUP BY is_video, tech_analyzed, tech_reject_reason",
            )?;
            let rows = stmt.query_map([folder.0], |r| {
                Ok((
                    r.get::<_, bool>(0)?,
                    r.get::<_, bool>(1)?,
                    r.get::<_, Option<String>>(2)?,
                    r.get::<_, i64>(3)?,
                ))
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })?;

        let mut counts = StateCounts {
            rejected: BTreeMap::new(),
            ..StateCounts::default()
        };
        for (is_video, analyzed, reason, n) in rows {
            let n = u64::try_from(n).unwrap_or(0);
            if is_video {
                counts.videos += n;
                continue;
            }
            let reason = reason
                .map(|r| r.parse::<RejectReason>())
                .transpose()
                .map_err(StoreError::backend)?;
            match TechState::from_columns(analyzed, reason) {
                TechState::Unanalyzed => counts.unanalyzed += n,
                TechState::Accepted => counts.accepted += n,
                TechState::Rejected(reason) => *counts.rejected.entry(reason).or_default() += n,
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn store() -> SqlitePhotoStore {
        SqlitePhotoStore::new(Database::open_in_memory().unwrap())
    }

    fn add(store: &SqlitePhotoStore, folder: FolderId, name: &str, secs: i64, video: bool) -> Photo {
        store
            .insert_photo(&NewPhoto {
                folder_id: folder,
                storage_key: format!("u1/{name}"),
                file_name: name.to_string(),
                content_type: "image/jpeg".to_string(),
                size_bytes: 1234,
                width: Some(10),
                height: None,
                is_video: video,
                created_at: DateTime::from_timestamp(secs, 0).unwrap(),
            })
            .unwrap()
    }

    fn folder(store: &SqlitePhotoStore) -> Folder {
        store
            .create_folder(NewFolder::regular(UserId(1), "Trip", "u1/"))
            .unwrap()
    }

    #[test]
    fn test_photo_round_trip() {
        let store = store();
        let folder = folder(&store);
        let photo = add(&store, folder.id, "a.jpg", 1_700_000_000, false);
        assert_eq!(photo.folder_id, folder.id);
        assert_eq!(photo.size_bytes, 1234);
        assert_eq!(photo.width, Some(10));
        assert_eq!(photo.height, None);
        assert_eq!(photo.state, TechState::Unanalyzed);
        assert_eq!(photo.created_at.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_oldest_first_excluding_videos() {
        let store = store();
        let folder = folder(&store);
        let newer = add(&store, folder.id, "newer.jpg", 200, false);
        let older = add(&store, folder.id, "older.jpg", 100, false);
        add(&store, folder.id, "clip.mp4", 50, true);

        let batch = store.unanalyzed_photos(folder.id, 5).unwrap();
        assert_eq!(
            batch.iter().map(|p| p.id).collect::<Vec<_>>(),
            vec![older.id, newer.id]
        );
        assert_eq!(store.unanalyzed_photos(folder.id, 1).unwrap().len(), 1);
        assert_eq!(store.count_unanalyzed(folder.id).unwrap(), 2);
        assert_eq!(store.count_photos(folder.id).unwrap(), 3);
    }

    #[test]
    fn test_duplicate_rejects_folder_is_conflict() {
        let store = store();
        let source = folder(&store);
        let rejects = store
            .create_folder(NewFolder::rejects_for(&source, "Tech rejects"))
            .unwrap();
        assert_eq!(store.rejects_folder_of(source.id).unwrap(), Some(rejects.clone()));

        let again = store.create_folder(NewFolder::rejects_for(&source, "Tech rejects"));
        assert!(matches!(again, Err(StoreError::Conflict(_))));

        store.soft_delete_folder(rejects.id).unwrap();
        assert!(store.rejects_folder_of(source.id).unwrap().is_none());
        assert!(store.folder(rejects.id).unwrap().unwrap().deleted);
        assert!(store
            .create_folder(NewFolder::rejects_for(&source, "Tech rejects"))
            .is_ok());
    }

    #[test]
    fn test_record_move_and_clear() {
        let store = store();
        let source = folder(&store);
        let rejects = store
            .create_folder(NewFolder::rejects_for(&source, "Tech rejects"))
            .unwrap();
        let a = add(&store, source.id, "a.jpg", 1, false);
        let b = add(&store, source.id, "b.jpg", 2, false);

        store
            .record_state(a.id, rejects.id, TechState::Rejected(RejectReason::ClosedEyes))
            .unwrap();
        store.record_state(b.id, source.id, TechState::Accepted).unwrap();
        let stored = store.photo(a.id).unwrap().unwrap();
        assert_eq!(stored.folder_id, rejects.id);
        assert_eq!(stored.state, TechState::Rejected(RejectReason::ClosedEyes));

        assert_eq!(store.move_all(rejects.id, source.id).unwrap(), 1);
        let moved = store.photo(a.id).unwrap().unwrap();
        assert_eq!((moved.folder_id, moved.state), (source.id, TechState::Accepted));
        assert_eq!(store.count_unanalyzed(source.id).unwrap(), 0);

        assert_eq!(store.clear_analysis(source.id).unwrap(), 2);
        assert_eq!(store.count_unanalyzed(source.id).unwrap(), 2);
    }

    #[test]
    fn test_record_state_on_missing_photo() {
        let store = store();
        let source = folder(&store);
        let result = store.record_state(PhotoId(99), source.id, TechState::Accepted);
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_state_counts() {
        let store = store();
        let source = folder(&store);
        let a = add(&store, source.id, "a.jpg", 1, false);
        add(&store, source.id, "b.jpg", 2, false);
        add(&store, source.id, "v.mp4", 3, true);
        store
            .record_state(a.id, source.id, TechState::Rejected(RejectReason::Blur))
            .unwrap();

        let counts = store.state_counts(source.id).unwrap();
        assert_eq!(counts.unanalyzed, 1);
        assert_eq!(counts.videos, 1);
        assert_eq!(counts.rejected.get(&RejectReason::Blur), Some(&1));
    }

    #[test]
    fn test_folders_of_owner() {
        let store = store();
        let source = folder(&store);
        store
            .create_folder(NewFolder::regular(UserId(2), "Other", "u2/"))
            .unwrap();
        let mine = store.folders_of(UserId(1)).unwrap();
        assert_eq!(mine, vec![source]);
    }
}
