//! Storage double for exercising the best-effort failure paths

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{
    AccessEvent, Ad, AdSummary, ConversionEvent, Media, MediaSummary, NewAccess, ReportPeriod,
};
use crate::storage::{Storage, StorageResult};

/// Every call fails, either at once or after stalling for a while
pub(crate) enum UnavailableStorage {
    Failing,
    Stalled(Duration),
}

impl UnavailableStorage {
    async fn outage<T>(&self) -> Result<T> {
        if let UnavailableStorage::Stalled(delay) = self {
            tokio::time::sleep(*delay).await;
        }
        Err(anyhow!("database unavailable"))
    }
}

#[async_trait]
impl Storage for UnavailableStorage {
    async fn init(&self) -> Result<()> {
        self.outage().await
    }

    async fn create_media(&self, _name: &str) -> Result<Media> {
        self.outage().await
    }

    async fn create_ad(&self, _media_id: i64, _name: &str, _code: &str) -> StorageResult<Ad> {
        Ok(self.outage().await?)
    }

    async fn deactivate_media(&self, _media_id: i64) -> Result<bool> {
        self.outage().await
    }

    async fn deactivate_ad(&self, _ad_id: i64) -> Result<bool> {
        self.outage().await
    }

    async fn list_media(&self) -> Result<Vec<Media>> {
        self.outage().await
    }

    async fn list_ads(&self) -> Result<Vec<Ad>> {
        self.outage().await
    }

    async fn get_active_ad_by_code(&self, _code: &str) -> Result<Option<Ad>> {
        self.outage().await
    }

    async fn find_open_access(
        &self,
        _unique_id: &str,
        _active_after: i64,
    ) -> Result<Option<AccessEvent>> {
        self.outage().await
    }

    async fn insert_access(&self, _access: &NewAccess) -> Result<AccessEvent> {
        self.outage().await
    }

    async fn increment_access_history(&self, _access_id: i64, _now: i64) -> Result<bool> {
        self.outage().await
    }

    async fn list_accesses_by_visitor(&self, _unique_id: &str) -> Result<Vec<AccessEvent>> {
        self.outage().await
    }

    async fn has_access(&self, _unique_id: &str) -> Result<bool> {
        self.outage().await
    }

    async fn get_conversion_by_order(&self, _order_id: i64) -> Result<Option<ConversionEvent>> {
        self.outage().await
    }

    async fn insert_conversion(
        &self,
        _order_id: i64,
        _unique_id: &str,
        _created_at: i64,
    ) -> StorageResult<ConversionEvent> {
        Ok(self.outage().await?)
    }

    async fn media_summary(&self, _period: &ReportPeriod) -> Result<Vec<MediaSummary>> {
        self.outage().await
    }

    async fn ad_summary(&self, _period: &ReportPeriod) -> Result<Vec<AdSummary>> {
        self.outage().await
    }
}
