//! Folder and photo records as seen by the defect pass.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_type!(
    /// Identifier of the account that owns folders.
    UserId
);
id_type!(
    /// Folder identifier.
    FolderId
);
id_type!(
    /// Photo identifier.
    PhotoId
);

/// Why a photo was routed to the rejects folder.
///
/// Variants are declared in detector priority order, so `Ord` follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Laplacian variance below the sharpness threshold.
    Blur,
    /// Too many blown-out highlights.
    Overexposed,
    /// Too many crushed shadows.
    Underexposed,
    /// At least one face with eyes definitely closed.
    ClosedEyes,
}

impl RejectReason {
    /// All reasons in priority order.
    pub const ALL: [Self; 4] = [
        Self::Blur,
        Self::Overexposed,
        Self::Underexposed,
        Self::ClosedEyes,
    ];

    /// Stable storage value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Blur => "blur",
            Self::Overexposed => "overexposed",
            Self::Underexposed => "underexposed",
            Self::ClosedEyes => "closed_eyes",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RejectReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|reason| reason.as_str() == s)
            .ok_or_else(|| format!("unknown reject reason '{s}'"))
    }
}

/// Analysis state of a photo.
///
/// Stores persist this as the `(tech_analyzed, tech_reject_reason)` column pair;
/// use [`TechState::from_columns`] and [`TechState::to_columns`] at that boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum TechState {
    /// Not yet looked at by a defect pass.
    Unanalyzed,
    /// Analyzed and kept in place.
    Accepted,
    /// Analyzed and moved to the rejects folder.
    Rejected(RejectReason),
}

impl TechState {
    /// Rebuilds the state from its persisted columns.
    ///
    /// A reason left on an unanalyzed row is ignored.
    #[must_use]
    pub fn from_columns(analyzed: bool, reason: Option<RejectReason>) -> Self {
        match (analyzed, reason) {
            (false, _) => Self::Unanalyzed,
            (true, None) => Self::Accepted,
            (true, Some(reason)) => Self::Rejected(reason),
        }
    }

    /// Splits the state into `(tech_analyzed, tech_reject_reason)`.
    #[must_use]
    pub fn to_columns(self) -> (bool, Option<RejectReason>) {
        match self {
            Self::Unanalyzed => (false, None),
            Self::Accepted => (true, None),
            Self::Rejected(reason) => (true, Some(reason)),
        }
    }

    #[must_use]
    pub fn is_analyzed(self) -> bool {
        !matches!(self, Self::Unanalyzed)
    }

    #[must_use]
    pub fn reason(self) -> Option<RejectReason> {
        match self {
            Self::Rejected(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Discriminates user folders from the auto-managed rejects folders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderType {
    Regular,
    TechRejects,
}

impl FolderType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::TechRejects => "tech_rejects",
        }
    }
}

impl FromStr for FolderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "regular" => Ok(Self::Regular),
            "tech_rejects" => Ok(Self::TechRejects),
            other => Err(format!("unknown folder type '{other}'")),
        }
    }
}

/// A folder record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    pub id: FolderId,
    pub owner: UserId,
    pub parent: Option<FolderId>,
    pub name: String,
    pub folder_type: FolderType,
    /// Blob key prefix for photos stored under this folder, ending in `/` when non-empty.
    pub storage_prefix: String,
    pub deleted: bool,
}

impl Folder {
    #[must_use]
    pub fn is_rejects(&self) -> bool {
        self.folder_type == FolderType::TechRejects
    }
}

/// Parameters for creating a folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFolder {
    pub owner: UserId,
    pub parent: Option<FolderId>,
    pub name: String,
    pub folder_type: FolderType,
    pub storage_prefix: String,
}

impl NewFolder {
    /// A top-level user folder.
    #[must_use]
    pub fn regular(owner: UserId, name: impl Into<String>, storage_prefix: impl Into<String>) -> Self {
        Self {
            owner,
            parent: None,
            name: name.into(),
            folder_type: FolderType::Regular,
            storage_prefix: storage_prefix.into(),
        }
    }

    /// The managed rejects child of `source`, named `"<source> - <suffix>"`.
    #[must_use]
    pub fn rejects_for(source: &Folder, suffix: &str) -> Self {
        Self {
            owner: source.owner,
            parent: Some(source.id),
            name: format!("{} - {suffix}", source.name),
            folder_type: FolderType::TechRejects,
            storage_prefix: format!("{}tech_rejects/", source.storage_prefix),
        }
    }
}

/// A photo record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Photo {
    pub id: PhotoId,
    pub folder_id: FolderId,
    pub storage_key: String,
    pub file_name: String,
    pub content_type: String,
    /// Size recorded at upload time.
    pub size_bytes: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub is_video: bool,
    pub state: TechState,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

impl Photo {
    /// Whether a defect pass may pick this photo up.
    #[must_use]
    pub fn is_eligible(&self) -> bool {
        !self.is_video && !self.deleted && self.state == TechState::Unanalyzed
    }
}
