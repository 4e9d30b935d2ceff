use arc_swap::ArcSwap;
use moka::future::Cache;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::visitor::{self, VisitorId};
use super::TrackingSettings;
use crate::models::NewAccess;
use crate::storage::trait_def::unix_now;
use crate::storage::Storage;

/// Request details captured before the handler runs
#[derive(Debug, Clone)]
pub struct PageHit {
    /// Raw visitor token from the cookie, if any
    pub visitor_token: Option<String>,
    pub ad_code: Option<String>,
    pub referrer: Option<String>,
    pub ip: IpAddr,
    pub user_agent: String,
    pub page: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessOutcome {
    /// Tracking is switched off
    Disabled,
    /// Request matched the exclusion lists
    Excluded,
    /// A new visit was logged
    Created(i64),
    /// The open visit's repeat counter was bumped
    Repeated(i64),
    /// Storage failed or timed out, nothing was written
    Dropped,
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub outcome: AccessOutcome,
    /// Visitor id issued for this request, to be persisted to the client
    pub issued_visitor: Option<VisitorId>,
}

/// Logs qualifying visits to the access table
pub struct AccessRecorder {
    storage: Arc<dyn Storage>,
    settings: ArcSwap<TrackingSettings>,
    /// Tracking code -> whether an active ad uses it
    known_ads: Cache<String, bool>,
}

impl AccessRecorder {
    pub fn new(storage: Arc<dyn Storage>, settings: TrackingSettings, ad_cache_ttl: Duration) -> Self {
        let known_ads = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(ad_cache_ttl)
            .build();

        Self {
            storage,
            settings: ArcSwap::from_pointee(settings),
            known_ads,
        }
    }

    /// Current settings snapshot
    pub fn settings(&self) -> Arc<TrackingSettings> {
        self.settings.load_full()
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.load().enabled
    }

    /// Replace the settings, e.g. after the configuration was re-read
    pub fn reload(&self, settings: TrackingSettings) {
        tracing::info!(
            enabled = settings.enabled,
            visit_timeout_secs = settings.visit_timeout_secs,
            "Tracking settings reloaded"
        );
        self.settings.store(Arc::new(settings));
        self.known_ads.invalidate_all();
    }

    /// Log a page view.
    ///
    /// Never fails: problems end up as [`AccessOutcome::Dropped`]. A visitor
    /// id is issued whenever tracking is on and the request carried none, so
    /// the client keeps a stable identity even when nothing is written.
    pub async fn record(&self, hit: PageHit) -> Recorded {
        let settings = self.settings.load_full();
        if !settings.enabled {
            return Recorded {
                outcome: AccessOutcome::Disabled,
                issued_visitor: None,
            };
        }

        let (visitor, is_new) = visitor::resolve(hit.visitor_token.as_deref());
        let outcome = self.log_visit(&settings, &visitor, &hit).await;

        Recorded {
            outcome,
            issued_visitor: is_new.then_some(visitor),
        }
    }

    async fn log_visit(
        &self,
        settings: &TrackingSettings,
        visitor: &VisitorId,
        hit: &PageHit,
    ) -> AccessOutcome {
        let ip_address = hit.ip.to_string();
        if settings.exclusion.is_excluded(&ip_address, &hit.user_agent) {
            debug!(ip = %ip_address, "request excluded from tracking");
            return AccessOutcome::Excluded;
        }

        let write = self.write_access(settings, visitor, hit, ip_address);
        match tokio::time::timeout(settings.write_timeout, write).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                warn!(visitor = %visitor, error = %err, "failed to record access, dropping it");
                AccessOutcome::Dropped
            }
            Err(_) => {
                warn!(
                    visitor = %visitor,
                    timeout_ms = settings.write_timeout.as_millis() as u64,
                    "recording access timed out, dropping it"
                );
                AccessOutcome::Dropped
            }
        }
    }

    async fn write_access(
        &self,
        settings: &TrackingSettings,
        visitor: &VisitorId,
        hit: &PageHit,
        ip_address: String,
    ) -> anyhow::Result<AccessOutcome> {
        let ad_code = match hit.ad_code.as_deref() {
            Some(code) => self.known_ad_code(code).await?,
            None => None,
        };

        let now = unix_now();
        let open = self
            .storage
            .find_open_access(visitor.as_str(), now - settings.visit_timeout_secs)
            .await?;

        if let Some(open) = open {
            // A landing with another ad starts a new visit
            let same_visit = match &ad_code {
                Some(code) => open.ad_code.as_deref() == Some(code.as_str()),
                None => true,
            };
            if same_visit {
                self.storage
                    .increment_access_history(open.access_id, now)
                    .await?;
                return Ok(AccessOutcome::Repeated(open.access_id));
            }
        }

        let access = NewAccess {
            unique_id: visitor.as_str().to_string(),
            referrer: hit.referrer.clone(),
            ad_code,
            ip_address: Some(ip_address),
            user_agent: Some(hit.user_agent.clone()).filter(|ua| !ua.is_empty()),
            page: Some(hit.page.clone()),
            created_at: now,
        };
        let row = self.storage.insert_access(&access).await?;

        Ok(AccessOutcome::Created(row.access_id))
    }

    /// The code itself when an active ad uses it, `None` otherwise
    async fn known_ad_code(&self, code: &str) -> anyhow::Result<Option<String>> {
        let known = match self.known_ads.get(code).await {
            Some(known) => known,
            None => {
                let known = self.storage.get_active_ad_by_code(code).await?.is_some();
                self.known_ads.insert(code.to_string(), known).await;
                known
            }
        };

        if !known {
            debug!(ad_code = %code, "unknown ad code, recording visit without attribution");
            return Ok(None);
        }
        Ok(Some(code.to_string()))
    }
}
