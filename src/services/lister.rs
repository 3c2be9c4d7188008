//! Listing that survives eventually-consistent stores.
//!
//! After a burst of writes a store may list a prefix as empty or short for a
//! while. Each attempt runs the paginated listing first and then, if that came
//! back empty, the fallback assigned to that attempt:
//!
//! | attempt | strategies                        |
//! |---------|-----------------------------------|
//! | 1       | paginated, manual pagination      |
//! | 2       | paginated, recent window          |
//! | 3+      | paginated                         |
//!
//! Failed attempts are followed by exponential backoff with jitter. A listing
//! that stays empty through every attempt is reported as empty, not as an
//! error. Missing buckets and denied access abort immediately.

use crate::models::object::ObjectRecord;
use crate::services::retry::Backoff;
use crate::services::store::{ListObjectsParams, ObjectStore, StoreResult};
use chrono::{DateTime, TimeDelta, Utc};
use std::fmt;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

const MAX_PAGE_SIZE: usize = 1000;
const RECENT_PAGE_SIZE: usize = 500;

/// Which keys a listing keeps. Directory markers are never kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFilter {
    Any,
    /// Case-insensitive `.csv` suffix.
    Csv,
}

impl KeyFilter {
    pub fn accepts(&self, record: &ObjectRecord) -> bool {
        if record.is_directory_marker() {
            return false;
        }
        match self {
            KeyFilter::Any => true,
            KeyFilter::Csv => record.key.to_ascii_lowercase().ends_with(".csv"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingStrategy {
    /// Native pagination, scanning at most `cap` entries.
    Paginated,
    /// Explicit continuation tokens with a pause between pages.
    ManualPagination,
    /// Up to `2 * cap` entries, keeping only recently modified objects.
    RecentWindow,
}

impl ListingStrategy {
    /// Strategies tried, in order, during zero-based `attempt`.
    pub fn for_attempt(attempt: u32) -> &'static [ListingStrategy] {
        use ListingStrategy::*;
        match attempt {
            0 => &[Paginated, ManualPagination],
            1 => &[Paginated, RecentWindow],
            _ => &[Paginated],
        }
    }
}

impl fmt::Display for ListingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ListingStrategy::Paginated => "paginated",
            ListingStrategy::ManualPagination => "manual-pagination",
            ListingStrategy::RecentWindow => "recent-window",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct ListerConfig {
    pub max_attempts: u32,
    /// Pause between pages of the manual-pagination strategy.
    pub page_pause: Duration,
    /// How far back the recent-window strategy looks.
    pub recent_window: TimeDelta,
    pub backoff: Backoff,
}

impl Default for ListerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            page_pause: Duration::from_millis(100),
            recent_window: TimeDelta::hours(24),
            backoff: Backoff::listing(),
        }
    }
}

impl ListerConfig {
    /// Windows too large to represent saturate, reaching back to the
    /// earliest representable time.
    pub fn with_recent_window_hours(mut self, hours: i64) -> Self {
        self.recent_window = TimeDelta::try_hours(hours).unwrap_or(TimeDelta::MAX);
        self
    }

    /// Oldest modification time the recent-window strategy keeps.
    pub fn recent_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.recent_window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

pub struct ResilientLister<'a> {
    store: &'a dyn ObjectStore,
    config: &'a ListerConfig,
    filter: KeyFilter,
}

impl<'a> ResilientLister<'a> {
    pub fn new(store: &'a dyn ObjectStore, config: &'a ListerConfig, filter: KeyFilter) -> Self {
        Self {
            store,
            config,
            filter,
        }
    }

    /// List up to `max_objects` matching objects under `prefix`.
    pub async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        max_objects: usize,
    ) -> StoreResult<Vec<ObjectRecord>> {
        let attempts = self.config.max_attempts.max(1);

        for attempt in 0..attempts {
            info!(bucket, prefix, attempt = attempt + 1, "listing objects");

            match self.run_attempt(attempt, bucket, prefix, max_objects).await {
                Ok(Some((strategy, files))) => {
                    info!(
                        bucket,
                        attempt = attempt + 1,
                        %strategy,
                        found = files.len(),
                        "listing found objects"
                    );
                    return Ok(files);
                }
                Ok(None) => {}
                Err(err) if err.aborts_listing() => {
                    error!(
                        bucket,
                        attempt = attempt + 1,
                        code = err.code(),
                        error = %err,
                        "listing failed permanently"
                    );
                    return Err(err);
                }
                Err(err) => {
                    error!(
                        bucket,
                        attempt = attempt + 1,
                        code = err.code(),
                        error = %err,
                        "listing attempt failed"
                    );
                }
            }

            if attempt + 1 < attempts {
                self.config.backoff.wait(attempt).await;
            }
        }

        warn!(bucket, prefix, attempts, "every listing attempt came back empty");
        Ok(Vec::new())
    }

    async fn run_attempt(
        &self,
        attempt: u32,
        bucket: &str,
        prefix: &str,
        max_objects: usize,
    ) -> StoreResult<Option<(ListingStrategy, Vec<ObjectRecord>)>> {
        for &strategy in ListingStrategy::for_attempt(attempt) {
            let files = self.run_strategy(strategy, bucket, prefix, max_objects).await?;
            if !files.is_empty() {
                return Ok(Some((strategy, files)));
            }
        }
        Ok(None)
    }

    pub async fn run_strategy(
        &self,
        strategy: ListingStrategy,
        bucket: &str,
        prefix: &str,
        max_objects: usize,
    ) -> StoreResult<Vec<ObjectRecord>> {
        match strategy {
            ListingStrategy::Paginated => {
                self.scan(bucket, prefix, max_objects, max_objects, MAX_PAGE_SIZE, None)
                    .await
            }
            ListingStrategy::ManualPagination => {
                self.manual_pagination(bucket, prefix, max_objects).await
            }
            ListingStrategy::RecentWindow => {
                let cutoff = self.config.recent_cutoff(Utc::now());
                let scanned = self
                    .scan(
                        bucket,
                        prefix,
                        max_objects,
                        max_objects.saturating_mul(2),
                        RECENT_PAGE_SIZE,
                        Some(cutoff),
                    )
                    .await;
                match scanned {
                    Err(err) if !err.aborts_listing() => {
                        error!(bucket, code = err.code(), error = %err, "recent-window listing failed");
                        Ok(Vec::new())
                    }
                    other => other,
                }
            }
        }
    }

    /// Walk pages until `max_objects` matches are found or `raw_limit`
    /// entries have been scanned.
    async fn scan(
        &self,
        bucket: &str,
        prefix: &str,
        max_objects: usize,
        raw_limit: usize,
        page_size: usize,
        modified_since: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<ObjectRecord>> {
        let mut files = Vec::new();
        let mut scanned = 0usize;
        let mut token = None;

        while files.len() < max_objects && scanned < raw_limit {
            let params = ListObjectsParams {
                prefix: non_empty(prefix),
                continuation_token: token.take(),
                max_keys: page_size.min(raw_limit - scanned),
            };
            let page = self.store.list_objects_v2(bucket, params).await?;
            scanned += page.objects.len();

            for obj in page.objects {
                if !self.filter.accepts(&obj) {
                    continue;
                }
                if modified_since.is_some_and(|cutoff| obj.last_modified < cutoff) {
                    continue;
                }
                files.push(obj);
                if files.len() >= max_objects {
                    break;
                }
            }

            match page.next_continuation_token {
                Some(next) if page.is_truncated => token = Some(next),
                _ => break,
            }
        }

        Ok(files)
    }

    async fn manual_pagination(
        &self,
        bucket: &str,
        prefix: &str,
        max_objects: usize,
    ) -> StoreResult<Vec<ObjectRecord>> {
        let mut files = Vec::new();
        let mut token: Option<String> = None;

        while files.len() < max_objects {
            let params = ListObjectsParams {
                prefix: non_empty(prefix),
                continuation_token: token.take(),
                max_keys: MAX_PAGE_SIZE.min(max_objects - files.len()),
            };
            let page = self.store.list_objects_v2(bucket, params).await?;
            if page.objects.is_empty() {
                break;
            }

            files.extend(page.objects.into_iter().filter(|obj| self.filter.accepts(obj)));

            match page.next_continuation_token {
                Some(next) if page.is_truncated => token = Some(next),
                _ => break,
            }

            sleep(self.config.page_pause).await;
        }

        files.truncate(max_objects);
        Ok(files)
    }
}

fn non_empty(prefix: &str) -> Option<String> {
    (!prefix.is_empty()).then(|| prefix.to_string())
}
