use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::models::{AdSummary, MediaSummary, ReportPeriod};
use crate::storage::{Storage, StorageError};

/// Report query failure. Always worth retrying.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report query failed: {0}")]
    Storage(#[from] StorageError),
    #[error("report query timed out after {0:?}")]
    Timeout(Duration),
}

impl From<anyhow::Error> for ReportError {
    fn from(err: anyhow::Error) -> Self {
        ReportError::Storage(StorageError::Other(err))
    }
}

/// Read-only rollups of the access and conversion logs
pub struct SummaryAggregator {
    storage: Arc<dyn Storage>,
    timeout: Duration,
}

impl SummaryAggregator {
    pub fn new(storage: Arc<dyn Storage>, timeout: Duration) -> Self {
        Self { storage, timeout }
    }

    /// One row per active media, zero-activity media included
    pub async fn media_summary(&self, period: ReportPeriod) -> Result<Vec<MediaSummary>, ReportError> {
        let rows = tokio::time::timeout(self.timeout, self.storage.media_summary(&period))
            .await
            .map_err(|_| ReportError::Timeout(self.timeout))??;

        Ok(rows.into_iter().map(MediaSummary::with_rate).collect())
    }

    /// One row per active ad
    pub async fn ad_summary(&self, period: ReportPeriod) -> Result<Vec<AdSummary>, ReportError> {
        let rows = tokio::time::timeout(self.timeout, self.storage.ad_summary(&period))
            .await
            .map_err(|_| ReportError::Timeout(self.timeout))??;

        Ok(rows.into_iter().map(AdSummary::with_rate).collect())
    }
}
