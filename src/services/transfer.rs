//! Per-object store work: moving one object and reading one object's text.
//!
//! A move is copy, then verify, then delete. The source is deleted only after
//! a metadata lookup has confirmed the copy at the destination, so a failed
//! move never loses data; at worst the object exists in both buckets.

use crate::services::retry::Backoff;
use crate::services::store::ObjectStore;
use tracing::{debug, error, warn};

const DEFAULT_MAX_ATTEMPTS: u32 = 2;

/// Destination key for `source_key`, preserving its path below `source_prefix`.
pub fn destination_key(source_key: &str, source_prefix: &str, dest_prefix: &str) -> String {
    let relative = match source_key.strip_prefix(source_prefix) {
        Some(rest) if !source_prefix.is_empty() => rest.trim_start_matches('/'),
        _ => source_key,
    };
    join_key(dest_prefix, relative)
}

/// `prefix/name`, or just `name` when there is no prefix.
pub fn join_key(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix.trim_end_matches('/'), name)
    }
}

pub struct TransferWorker<'a> {
    store: &'a dyn ObjectStore,
    max_attempts: u32,
    backoff: Backoff,
}

impl<'a> TransferWorker<'a> {
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self {
            store,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Backoff::per_object(),
        }
    }

    /// Move one object. Returns whether the source now lives only at the
    /// destination.
    ///
    /// A destination equal to the source is refused without touching the
    /// store: the copy would overwrite the object in place and the delete
    /// would then remove the only copy.
    pub async fn move_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        dest_bucket: &str,
        dest_key: &str,
    ) -> bool {
        if source_bucket == dest_bucket && source_key == dest_key {
            error!(
                bucket = source_bucket,
                key = source_key,
                "destination is the source object, refusing to move"
            );
            return false;
        }

        for attempt in 0..self.max_attempts {
            let last = attempt + 1 == self.max_attempts;

            if let Err(err) = self
                .store
                .copy_object(source_bucket, source_key, dest_bucket, dest_key)
                .await
            {
                error!(
                    key = source_key,
                    attempt = attempt + 1,
                    code = err.code(),
                    error = %err,
                    "copy failed"
                );
                if err.aborts_object() {
                    return false;
                }
                if !last {
                    self.backoff.wait(attempt).await;
                }
                continue;
            }

            if let Err(err) = self.store.head_object(dest_bucket, dest_key).await {
                error!(
                    key = dest_key,
                    attempt = attempt + 1,
                    code = err.code(),
                    "copy not visible at destination"
                );
                if !last {
                    self.backoff.wait(attempt).await;
                }
                continue;
            }

            match self.store.delete_object(source_bucket, source_key).await {
                Ok(()) => {
                    debug!(source = source_key, dest = dest_key, "object moved");
                    return true;
                }
                Err(err) => {
                    error!(
                        key = source_key,
                        attempt = attempt + 1,
                        code = err.code(),
                        error = %err,
                        "delete of copied source failed"
                    );
                    if err.aborts_object() {
                        return false;
                    }
                    if !last {
                        self.backoff.wait(attempt).await;
                    }
                }
            }
        }

        false
    }

    /// Read an object as UTF-8 text. `None` when the object cannot be read
    /// after retrying or is not valid UTF-8.
    pub async fn read_text(&self, bucket: &str, key: &str) -> Option<String> {
        for attempt in 0..self.max_attempts {
            match self.store.get_object(bucket, key).await {
                Ok(bytes) => {
                    return match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => Some(text),
                        Err(_) => {
                            warn!(key, "object is not valid UTF-8");
                            None
                        }
                    };
                }
                Err(err) => {
                    error!(
                        key,
                        attempt = attempt + 1,
                        code = err.code(),
                        error = %err,
                        "read failed"
                    );
                    if err.aborts_object() {
                        return None;
                    }
                    if attempt + 1 < self.max_attempts {
                        self.backoff.wait(attempt).await;
                    }
                }
            }
        }
        None
    }
}
