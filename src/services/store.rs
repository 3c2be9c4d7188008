//! The object-store seam every component talks through.
//!
//! Components never own a global client: the invocation boundary constructs a
//! store handle and passes `&dyn ObjectStore` down, so the same lister, worker
//! and orchestrator code runs against [`LocalStore`](super::local_store::LocalStore)
//! in production and against scripted doubles in tests.

use crate::models::object::ObjectRecord;
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use thiserror::Error;

/// Parameters for one page of a ListObjectsV2-style call.
#[derive(Clone, Debug, Default)]
pub struct ListObjectsParams {
    pub prefix: Option<String>,
    pub continuation_token: Option<String>,
    pub max_keys: usize,
}

/// One page of listing output, in lexicographic key order.
#[derive(Debug, Default)]
pub struct ListObjectsPage {
    pub objects: Vec<ObjectRecord>,
    pub is_truncated: bool,
    pub next_continuation_token: Option<String>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("bucket `{0}` not found")]
    NoSuchBucket(String),
    #[error("object `{key}` not found in bucket `{bucket}`")]
    NoSuchKey { bucket: String, key: String },
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("bucket `{0}` already exists")]
    BucketAlreadyExists(String),
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("invalid object key")]
    InvalidObjectKey,
    /// Any other service-side failure, e.g. throttling or a 5xx.
    #[error("{code}: {message}")]
    Service { code: String, message: String },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Store error code as reported in logs.
    pub fn code(&self) -> &str {
        match self {
            StoreError::NoSuchBucket(_) => "NoSuchBucket",
            StoreError::NoSuchKey { .. } => "NoSuchKey",
            StoreError::AccessDenied(_) => "AccessDenied",
            StoreError::BucketAlreadyExists(_) => "BucketAlreadyExists",
            StoreError::InvalidBucketName { .. } => "InvalidBucketName",
            StoreError::InvalidObjectKey => "InvalidObjectKey",
            StoreError::Service { code, .. } => code,
            StoreError::Sqlx(_) => "InternalError",
            StoreError::Io(_) => "IoError",
        }
    }

    /// Errors that make any further listing attempt pointless.
    pub fn aborts_listing(&self) -> bool {
        matches!(
            self,
            StoreError::NoSuchBucket(_) | StoreError::AccessDenied(_)
        )
    }

    /// Errors that make any further attempt on a single object pointless.
    pub fn aborts_object(&self) -> bool {
        matches!(
            self,
            StoreError::NoSuchBucket(_)
                | StoreError::NoSuchKey { .. }
                | StoreError::AccessDenied(_)
                | StoreError::InvalidObjectKey
        )
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch a single listing page.
    async fn list_objects_v2(
        &self,
        bucket: &str,
        params: ListObjectsParams,
    ) -> StoreResult<ListObjectsPage>;

    /// Server-side copy; content type and payload are carried over.
    async fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        dest_bucket: &str,
        dest_key: &str,
    ) -> StoreResult<()>;

    /// Metadata lookup. Fails with `NoSuchKey` when the object is absent.
    async fn head_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectRecord>;

    async fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()>;

    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<Bytes>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        body: Bytes,
    ) -> StoreResult<()>;

    /// Fully qualified location reported back to callers.
    fn location(&self, bucket: &str, key: &str) -> String {
        format!("s3://{}/{}", bucket, key)
    }
}
