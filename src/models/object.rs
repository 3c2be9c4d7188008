//! Object metadata, both as persisted by the local store and as handed to the
//! listing and transfer pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Metadata row for one stored object. The payload lives on disk.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct StoredObject {
    pub id: Uuid,

    /// Foreign key linking to the parent bucket.
    pub bucket_id: Uuid,

    /// Object key (path-like identifier within the bucket).
    pub key: String,

    /// Content type (MIME type), carried over on copy.
    pub content_type: Option<String>,

    pub size_bytes: i64,

    /// MD5 of the payload.
    pub etag: Option<String>,

    pub last_modified: DateTime<Utc>,

    /// Soft-delete marker.
    pub is_deleted: bool,
}

/// What the lister yields for every object under a prefix.
///
/// Immutable and scoped to one execution.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ObjectRecord {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

impl ObjectRecord {
    pub fn new(key: impl Into<String>, size: u64, last_modified: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            size,
            last_modified,
        }
    }

    /// Zero-byte placeholders whose key ends in `/` emulate folders.
    pub fn is_directory_marker(&self) -> bool {
        self.key.ends_with('/')
    }
}

impl From<StoredObject> for ObjectRecord {
    fn from(obj: StoredObject) -> Self {
        Self {
            key: obj.key,
            size: obj.size_bytes.max(0) as u64,
            last_modified: obj.last_modified,
        }
    }
}
