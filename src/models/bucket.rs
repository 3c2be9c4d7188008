//! A logical bucket: the top-level namespace objects are addressed under.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Bucket {
    /// Internal identifier referenced by `objects.bucket_id`.
    pub id: Uuid,

    /// Bucket name, unique within the store.
    pub name: String,

    pub created_at: DateTime<Utc>,
}
