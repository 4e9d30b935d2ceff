//! Ad performance report handlers

use axum::{
    extract::{Query, State},
    http::{header::RETRY_AFTER, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::handlers::{AppState, ErrorResponse};
use crate::models::ReportPeriod;
use crate::tracking::ReportError;

#[derive(Debug, Deserialize)]
pub struct ReportQueryParams {
    /// Start time (Unix timestamp, inclusive)
    pub start_time: Option<i64>,

    /// End time (Unix timestamp, exclusive)
    pub end_time: Option<i64>,
}

impl ReportQueryParams {
    fn period(&self) -> ReportPeriod {
        ReportPeriod {
            start: self.start_time,
            end: self.end_time,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReportResponse<T> {
    pub rows: Vec<T>,
    pub total: usize,
}

impl<T> From<Vec<T>> for ReportResponse<T> {
    fn from(rows: Vec<T>) -> Self {
        let total = rows.len();
        Self { rows, total }
    }
}

fn report_failure(err: ReportError) -> Response {
    tracing::error!("Failed to build report: {}", err);
    (
        StatusCode::SERVICE_UNAVAILABLE,
        [(RETRY_AFTER, "5")],
        Json(ErrorResponse {
            error: "Report temporarily unavailable, please retry".to_string(),
        }),
    )
        .into_response()
}

/// Per-media performance summary
pub async fn media_report(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReportQueryParams>,
) -> Response {
    match state.summaries.media_summary(params.period()).await {
        Ok(rows) => Json(ReportResponse::from(rows)).into_response(),
        Err(e) => report_failure(e),
    }
}

/// Per-ad performance summary
pub async fn ad_report(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReportQueryParams>,
) -> Response {
    match state.summaries.ad_summary(params.period()).await {
        Ok(rows) => Json(ReportResponse::from(rows)).into_response(),
        Err(e) => report_failure(e),
    }
}
