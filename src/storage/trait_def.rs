use crate::models::{AccessEvent, Ad, AdSummary, ConversionEvent, Media, MediaSummary, NewAccess, ReportPeriod};
use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("record already exists")]
    Conflict,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::Other(err.into())
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Initialize the storage (create tables and indexes)
    async fn init(&self) -> Result<()>;

    /// Create a media group
    async fn create_media(&self, name: &str) -> Result<Media>;

    /// Create an ad; fails with `Conflict` when the tracking code is taken
    async fn create_ad(&self, media_id: i64, name: &str, code: &str) -> StorageResult<Ad>;

    /// Soft delete a media group
    async fn deactivate_media(&self, media_id: i64) -> Result<bool>;

    /// Soft delete an ad. The tracking code stays reserved.
    async fn deactivate_ad(&self, ad_id: i64) -> Result<bool>;

    /// List active media ordered by id
    async fn list_media(&self) -> Result<Vec<Media>>;

    /// List active ads ordered by id
    async fn list_ads(&self) -> Result<Vec<Ad>>;

    /// Look up an active ad by its tracking code
    async fn get_active_ad_by_code(&self, code: &str) -> Result<Option<Ad>>;

    /// Most recent access of a visitor whose last activity is after `active_after`
    async fn find_open_access(
        &self,
        unique_id: &str,
        active_after: i64,
    ) -> Result<Option<AccessEvent>>;

    /// Append a new access row with `history = 0`
    async fn insert_access(&self, access: &NewAccess) -> Result<AccessEvent>;

    /// Atomically bump the repeat counter and last activity of an access row
    async fn increment_access_history(&self, access_id: i64, now: i64) -> Result<bool>;

    /// All access rows of a visitor, oldest first
    async fn list_accesses_by_visitor(&self, unique_id: &str) -> Result<Vec<AccessEvent>>;

    /// Whether any access row exists for a visitor
    async fn has_access(&self, unique_id: &str) -> Result<bool>;

    async fn get_conversion_by_order(&self, order_id: i64) -> Result<Option<ConversionEvent>>;

    /// Insert a conversion; fails with `Conflict` when the order already converted
    async fn insert_conversion(
        &self,
        order_id: i64,
        unique_id: &str,
        created_at: i64,
    ) -> StorageResult<ConversionEvent>;

    /// Per-media rollup of active media, ordered by media id
    async fn media_summary(&self, period: &ReportPeriod) -> Result<Vec<MediaSummary>>;

    /// Per-ad rollup of active ads, ordered by ad id
    async fn ad_summary(&self, period: &ReportPeriod) -> Result<Vec<AdSummary>>;
}

pub(crate) fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}
