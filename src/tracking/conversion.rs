use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::visitor::VisitorId;
use crate::storage::trait_def::unix_now;
use crate::storage::{Storage, StorageError};

/// Result of an order-completion call, for diagnostics only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConversionOutcome {
    Recorded { conversion_id: i64 },
    /// The order was attributed by an earlier call
    AlreadyRecorded,
    /// No visitor id, or the visitor never came through the tracker
    NoAttributableVisit,
    /// Storage failed or timed out, nothing was written
    Dropped,
}

/// Attributes completed orders to logged visits
pub struct ConversionRecorder {
    storage: Arc<dyn Storage>,
    timeout: Duration,
}

impl ConversionRecorder {
    pub fn new(storage: Arc<dyn Storage>, timeout: Duration) -> Self {
        Self { storage, timeout }
    }

    /// Record that `order_id` completed for the given visitor.
    ///
    /// Safe to call any number of times per order; only the first successful
    /// call writes a row. Never returns an error to the checkout flow.
    pub async fn on_order_completed(
        &self,
        order_id: i64,
        visitor_id: Option<&str>,
    ) -> ConversionOutcome {
        let Some(visitor) = visitor_id.and_then(VisitorId::parse) else {
            debug!(order_id, "order completed without a visitor id");
            return ConversionOutcome::NoAttributableVisit;
        };

        match tokio::time::timeout(self.timeout, self.attribute(order_id, &visitor)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                warn!(order_id, visitor = %visitor, error = %err, "failed to record conversion, dropping it");
                ConversionOutcome::Dropped
            }
            Err(_) => {
                warn!(
                    order_id,
                    visitor = %visitor,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "recording conversion timed out, dropping it"
                );
                ConversionOutcome::Dropped
            }
        }
    }

    async fn attribute(
        &self,
        order_id: i64,
        visitor: &VisitorId,
    ) -> anyhow::Result<ConversionOutcome> {
        if self
            .storage
            .get_conversion_by_order(order_id)
            .await?
            .is_some()
        {
            debug!(order_id, "order already converted");
            return Ok(ConversionOutcome::AlreadyRecorded);
        }

        if !self.storage.has_access(visitor.as_str()).await? {
            debug!(order_id, visitor = %visitor, "no visit to attribute the order to");
            return Ok(ConversionOutcome::NoAttributableVisit);
        }

        match self
            .storage
            .insert_conversion(order_id, visitor.as_str(), unix_now())
            .await
        {
            Ok(conversion) => {
                info!(
                    order_id,
                    conversion_id = conversion.conversion_id,
                    "order attributed to ad visit"
                );
                Ok(ConversionOutcome::Recorded {
                    conversion_id: conversion.conversion_id,
                })
            }
            // Lost a race against a concurrent call for the same order
            Err(StorageError::Conflict) => Ok(ConversionOutcome::AlreadyRecorded),
            Err(StorageError::Other(err)) => Err(err),
        }
    }
}
