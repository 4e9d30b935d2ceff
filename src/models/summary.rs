//! Report rows produced by the summary queries

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Time window applied to access events (Unix seconds)
///
/// `start` is inclusive, `end` is exclusive. Missing bounds are open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPeriod {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

impl ReportPeriod {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(start: i64, end: i64) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MediaSummary {
    pub media_id: i64,
    pub media_name: Option<String>,
    pub total_accesses: i64,
    pub unique_visitors: i64,
    pub conversions: i64,
    #[sqlx(skip)]
    pub conversion_rate: f64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AdSummary {
    pub ad_id: i64,
    pub ad_name: String,
    pub ad_code: String,
    pub media_id: i64,
    pub total_accesses: i64,
    pub unique_visitors: i64,
    pub conversions: i64,
    #[sqlx(skip)]
    pub conversion_rate: f64,
}

/// Conversions per unique visitor, 0.0 when nobody visited
pub fn conversion_rate(conversions: i64, unique_visitors: i64) -> f64 {
    if unique_visitors <= 0 {
        return 0.0;
    }
    conversions as f64 / unique_visitors as f64
}

impl MediaSummary {
    pub(crate) fn with_rate(mut self) -> Self {
        self.conversion_rate = conversion_rate(self.conversions, self.unique_visitors);
        self
    }
}

impl AdSummary {
    pub(crate) fn with_rate(mut self) -> Self {
        self.conversion_rate = conversion_rate(self.conversions, self.unique_visitors);
        self
    }
}
