//! tech-sort adapters: the concrete edges of the defect pass.
//!
//! - bounded image decoding (raster codecs, RAW previews and demosaic)
//! - a filesystem blob store and media file discovery
//! - SQLite folder and photo persistence
//! - model file management

pub mod decode;
pub mod fs;
pub mod models;
mod raw;
pub mod sqlite;

pub use decode::{probe_dimensions, BoundedDecoder, DecoderConfig, RAW_EXTENSIONS};
pub use fs::{collect_media_files, FsBlobStore, MediaKind};
pub use models::{fetch_models, list_models, model_paths, models_dir, ModelStatus};
pub use sqlite::{Database, DatabaseError, NewPhoto, SqlitePhotoStore};
