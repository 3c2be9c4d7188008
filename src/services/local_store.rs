//! LocalStore: an [`ObjectStore`] backed by SQLite for metadata and local disk
//! for payloads, sharded beneath `base_path/{bucket}/{shard}/{shard}/{key}`.
//!
//! Listing follows ListObjectsV2 rules: lexicographic key order, prefix
//! filtering, opaque continuation tokens, soft-deleted rows hidden.

use crate::models::{bucket::Bucket, object::ObjectRecord, object::StoredObject};
use crate::services::store::{
    ListObjectsPage, ListObjectsParams, ObjectStore, StoreError, StoreResult,
};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut, stream};
use md5::Context;
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::{AsyncReadExt, AsyncWriteExt},
};
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");
const MAX_OBJECT_KEY_LEN: usize = 1024;
const MAX_PAGE_KEYS: usize = 1000;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;
/// First path segments claimed by fixed HTTP routes.
pub const RESERVED_BUCKET_NAMES: &[&str] = &["invoke", "healthz", "readyz"];

const OBJECT_COLUMNS: &str =
    "id, bucket_id, key, content_type, size_bytes, etag, last_modified, is_deleted";

#[derive(Clone)]
pub struct LocalStore {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,
}

impl LocalStore {
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
        }
    }

    /// Apply the embedded schema. Every statement is idempotent.
    pub async fn migrate(&self) -> StoreResult<usize> {
        let statements: Vec<&str> = SCHEMA
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        for stmt in &statements {
            debug!("executing schema statement: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(statements.len())
    }

    /// Rejects empty or oversized keys, absolute keys, `..` segments, control
    /// characters and directory markers, which have no payload path.
    fn ensure_key_safe(key: &str) -> StoreResult<()> {
        let unsafe_key = key.is_empty()
            || key.len() > MAX_OBJECT_KEY_LEN
            || key.starts_with('/')
            || key.ends_with('/')
            || key.contains("..")
            || key.bytes().any(|b| b.is_ascii_control() || b == b'\\');
        if unsafe_key {
            return Err(StoreError::InvalidObjectKey);
        }
        Ok(())
    }

    /// S3-like naming: 3-63 chars of lowercase letters, digits, dots and
    /// hyphens, starting and ending alphanumerically, no `..`. Names of the
    /// fixed HTTP routes are refused so every bucket stays addressable.
    fn ensure_bucket_name_safe(name: &str) -> StoreResult<()> {
        let invalid = |reason: &str| {
            Err(StoreError::InvalidBucketName {
                name: name.to_string(),
                reason: reason.to_string(),
            })
        };

        if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&name.len()) {
            return invalid("must be between 3 and 63 characters");
        }
        if !name
            .chars()
            .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
        {
            return invalid("allowed characters are lowercase letters, digits, dots, and hyphens");
        }
        let edge_ok = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric());
        if !edge_ok(name.chars().next()) || !edge_ok(name.chars().last()) {
            return invalid("must start and end with a lowercase letter or digit");
        }
        if name.contains("..") {
            return invalid("cannot contain consecutive dots");
        }
        if RESERVED_BUCKET_NAMES.contains(&name) {
            return invalid("name is reserved by the HTTP API");
        }
        Ok(())
    }

    fn bucket_root(&self, bucket_name: &str) -> PathBuf {
        self.base_path.join(bucket_name)
    }

    /// Two-level shard directories from MD5(bucket/key), keeping per-directory
    /// file counts low.
    fn object_path(&self, bucket_name: &str, key: &str) -> PathBuf {
        let digest = md5::compute(format!("{}/{}", bucket_name, key));
        self.bucket_root(bucket_name)
            .join(format!("{:02x}", digest[0]))
            .join(format!("{:02x}", digest[1]))
            .join(key)
    }

    async fn fetch_bucket(&self, bucket: &str) -> StoreResult<Bucket> {
        Self::ensure_bucket_name_safe(bucket)
            .map_err(|_| StoreError::NoSuchBucket(bucket.to_string()))?;
        sqlx::query_as::<Sqlite, Bucket>("SELECT id, name, created_at FROM buckets WHERE name = ?")
            .bind(bucket)
            .fetch_one(&*self.db)
            .await
            .map_err(|err| match err {
                sqlx::Error::RowNotFound => StoreError::NoSuchBucket(bucket.to_string()),
                other => StoreError::Sqlx(other),
            })
    }

    async fn fetch_object(&self, bucket: &Bucket, key: &str) -> StoreResult<StoredObject> {
        sqlx::query_as::<_, StoredObject>(&format!(
            "SELECT {} FROM objects WHERE key = ? AND bucket_id = ? AND is_deleted = 0",
            OBJECT_COLUMNS
        ))
        .bind(key)
        .bind(bucket.id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StoreError::NoSuchKey {
                bucket: bucket.name.clone(),
                key: key.to_string(),
            },
            other => StoreError::Sqlx(other),
        })
    }

    pub async fn create_bucket(&self, name: &str) -> StoreResult<Bucket> {
        Self::ensure_bucket_name_safe(name)?;
        fs::create_dir_all(self.bucket_root(name)).await?;

        let bucket = Bucket {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: Utc::now(),
        };

        match sqlx::query("INSERT INTO buckets (id, name, created_at) VALUES (?, ?, ?)")
            .bind(bucket.id)
            .bind(&bucket.name)
            .bind(bucket.created_at)
            .execute(&*self.db)
            .await
        {
            Ok(_) => Ok(bucket),
            Err(err) if is_unique_violation(&err) => {
                Err(StoreError::BucketAlreadyExists(name.to_string()))
            }
            Err(err) => Err(StoreError::Sqlx(err)),
        }
    }

    /// Stream an object to a temp file, fsync, rename into place, then upsert
    /// its metadata row. Overwrites an existing key.
    pub async fn upload_object_stream<S>(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<String>,
        body: S,
    ) -> StoreResult<StoredObject>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        Self::ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;

        let file_path = self.object_path(&bucket_rec.name, key);
        let parent = file_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| io::Error::other("object path has no parent"))?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        let written = write_payload(&tmp_path, body).await;
        let (size_bytes, etag) = match written {
            Ok(done) => done,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StoreError::Io(err));
            }
        };

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }

        let upserted = sqlx::query_as::<_, StoredObject>(&format!(
            r#"
            INSERT INTO objects ({cols})
            VALUES (?, ?, ?, ?, ?, ?, ?, 0)
            ON CONFLICT(bucket_id, key) DO UPDATE SET
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                last_modified = excluded.last_modified,
                is_deleted = 0
            RETURNING {cols}
            "#,
            cols = OBJECT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(bucket_rec.id)
        .bind(key)
        .bind(content_type)
        .bind(size_bytes)
        .bind(&etag)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await;

        match upserted {
            Ok(obj) => Ok(obj),
            Err(err) => {
                let _ = fs::remove_file(&file_path).await;
                Err(StoreError::Sqlx(err))
            }
        }
    }

    /// Metadata plus an open payload handle, ready for streaming out.
    pub async fn get_object_reader(
        &self,
        bucket: &str,
        key: &str,
    ) -> StoreResult<(StoredObject, File)> {
        Self::ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;
        let object = self.fetch_object(&bucket_rec, key).await?;

        let file = File::open(self.object_path(&bucket_rec.name, key))
            .await
            .map_err(|err| match err.kind() {
                ErrorKind::NotFound => StoreError::NoSuchKey {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                },
                _ => StoreError::Io(err),
            })?;

        Ok((object, file))
    }

    pub async fn list_page(
        &self,
        bucket: &str,
        params: ListObjectsParams,
    ) -> StoreResult<ListObjectsPage> {
        let bucket_rec = self.fetch_bucket(bucket).await?;
        let max_keys = params.max_keys.clamp(1, MAX_PAGE_KEYS);

        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM objects WHERE is_deleted = 0 AND bucket_id = ",
            OBJECT_COLUMNS
        ));
        builder.push_bind(bucket_rec.id);

        if let Some(prefix) = params.prefix.as_ref().filter(|p| !p.is_empty()) {
            builder.push(" AND substr(key, 1, length(");
            builder.push_bind(prefix.clone());
            builder.push(")) = ");
            builder.push_bind(prefix.clone());
        }

        if let Some(after) = params.continuation_token.as_deref().map(decode_token) {
            builder.push(" AND key > ");
            builder.push_bind(after);
        }

        // One extra row tells whether another page exists.
        builder.push(" ORDER BY key ASC LIMIT ");
        builder.push_bind((max_keys + 1) as i64);

        let mut rows: Vec<StoredObject> = builder.build_query_as().fetch_all(&*self.db).await?;

        let is_truncated = rows.len() > max_keys;
        rows.truncate(max_keys);
        let next_continuation_token = if is_truncated {
            rows.last().map(|last| encode_token(&last.key))
        } else {
            None
        };

        Ok(ListObjectsPage {
            objects: rows.into_iter().map(ObjectRecord::from).collect(),
            is_truncated,
            next_continuation_token,
        })
    }

    /// Soft-delete the metadata row, then remove the payload and prune empty
    /// shard directories.
    pub async fn remove_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        Self::ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;

        let result = sqlx::query(
            "UPDATE objects SET is_deleted = 1 WHERE key = ? AND bucket_id = ? AND is_deleted = 0",
        )
        .bind(key)
        .bind(bucket_rec.id)
        .execute(&*self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NoSuchKey {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }

        let file_path = self.object_path(&bucket_rec.name, key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed payload {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("payload {} already missing", file_path.display());
            }
            Err(err) => return Err(StoreError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            prune_empty_dirs(parent, &self.bucket_root(&bucket_rec.name)).await;
        }

        Ok(())
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn list_objects_v2(
        &self,
        bucket: &str,
        params: ListObjectsParams,
    ) -> StoreResult<ListObjectsPage> {
        self.list_page(bucket, params).await
    }

    async fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        dest_bucket: &str,
        dest_key: &str,
    ) -> StoreResult<()> {
        let (meta, file) = self.get_object_reader(source_bucket, source_key).await?;
        self.upload_object_stream(dest_bucket, dest_key, meta.content_type, ReaderStream::new(file))
            .await?;
        Ok(())
    }

    async fn head_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectRecord> {
        Self::ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;
        Ok(self.fetch_object(&bucket_rec, key).await?.into())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        self.remove_object(bucket, key).await
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<Bytes> {
        let (meta, mut file) = self.get_object_reader(bucket, key).await?;
        let mut buf = Vec::with_capacity(meta.size_bytes.max(0) as usize);
        file.read_to_end(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        body: Bytes,
    ) -> StoreResult<()> {
        let body = stream::iter([Ok::<_, io::Error>(body)]);
        self.upload_object_stream(bucket, key, Some(content_type.to_string()), body)
            .await?;
        Ok(())
    }
}

/// Write `body` to `path` durably, returning its size and MD5 etag.
async fn write_payload<S>(path: &Path, body: S) -> io::Result<(i64, String)>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    let mut file = File::create(path).await?;
    let mut size_bytes: i64 = 0;
    let mut digest = Context::new();

    pin_mut!(body);
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        size_bytes += chunk.len() as i64;
        digest.consume(&chunk);
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    file.sync_all().await?;

    Ok((size_bytes, format!("{:x}", digest.compute())))
}

/// Remove empty directories from `start` up to, not including, `stop`.
async fn prune_empty_dirs(start: &Path, stop: &Path) {
    let mut current = start.to_path_buf();
    while current.starts_with(stop) && current != stop {
        match fs::remove_dir(&current).await {
            Ok(_) => match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => break,
            },
            Err(err) if err.kind() == ErrorKind::NotFound => break,
            Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
            Err(err) => {
                debug!("failed to prune directory {}: {}", current.display(), err);
                break;
            }
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

fn encode_token(last_key: &str) -> String {
    general_purpose::STANDARD.encode(last_key)
}

fn decode_token(token: &str) -> String {
    general_purpose::STANDARD
        .decode(token)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| token.to_string())
}
