//! Ad visit tracking and order attribution
//!
//! Every storefront response passes through [`middleware::track_access`],
//! which logs the visit through [`AccessRecorder`]. Completed orders are
//! attributed by [`ConversionRecorder`] and the resulting event log is rolled
//! up by [`SummaryAggregator`].
//!
//! The tracking path is best-effort: storage failures and timeouts are
//! logged and dropped, never surfaced to the visitor or the checkout.

pub mod conversion;
pub mod exclusion;
pub mod ip_extractor;
pub mod middleware;
pub mod recorder;
pub mod summary;
pub mod visitor;

use std::time::Duration;

use crate::config::{TrackingConfig, MAX_COOKIE_DAYS};

pub use conversion::{ConversionOutcome, ConversionRecorder};
pub use exclusion::ExclusionPolicy;
pub use ip_extractor::{extract_client_ip, ProxyTrust};
pub use middleware::{track_access, with_tracking};
pub use recorder::{AccessOutcome, AccessRecorder, PageHit, Recorded};
pub use summary::{ReportError, SummaryAggregator};
pub use visitor::{VisitorCookie, VisitorId};

/// Immutable snapshot of everything the tracking path reads per request.
///
/// Built at startup and swapped as a whole by [`AccessRecorder::reload`].
#[derive(Debug, Clone)]
pub struct TrackingSettings {
    pub enabled: bool,
    pub ad_param: String,
    pub cookie: VisitorCookie,
    pub visit_timeout_secs: i64,
    pub write_timeout: Duration,
    pub proxy_trust: ProxyTrust,
    pub exclusion: ExclusionPolicy,
}

impl TrackingSettings {
    pub fn from_config(config: &TrackingConfig) -> Self {
        Self {
            enabled: config.enabled,
            ad_param: config.ad_param.clone(),
            cookie: VisitorCookie {
                name: config.cookie_name.clone(),
                max_age_days: config.cookie_days.clamp(1, MAX_COOKIE_DAYS),
                secure: config.cookie_secure,
            },
            visit_timeout_secs: config.visit_timeout_secs.max(0),
            write_timeout: Duration::from_millis(config.write_timeout_ms),
            proxy_trust: ProxyTrust::from_config(config),
            exclusion: ExclusionPolicy::from_config(&config.exclude),
        }
    }
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self::from_config(&TrackingConfig::default())
    }
}
