use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::models::{Ad, Media};
use crate::storage::Storage;
use crate::tracking::{ConversionOutcome, ConversionRecorder, SummaryAggregator};

pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub conversions: Arc<ConversionRecorder>,
    pub summaries: Arc<SummaryAggregator>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct SuccessResponse {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct OrderCompletedRequest {
    pub order_id: i64,
    /// Visitor token read from the shopper's tracking cookie
    pub visitor_id: Option<String>,
}

/// Order-completion hook called by the checkout.
///
/// Always answers 200; the outcome is informational only.
pub async fn order_completed(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<OrderCompletedRequest>,
) -> Json<ConversionOutcome> {
    let outcome = state
        .conversions
        .on_order_completed(payload.order_id, payload.visitor_id.as_deref())
        .await;
    Json(outcome)
}

/// List active media
pub async fn list_media(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Media>>, (StatusCode, Json<ErrorResponse>)> {
    match state.storage.list_media().await {
        Ok(media) => Ok(Json(media)),
        Err(e) => {
            tracing::error!("Failed to list media: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Failed to list media".to_string(),
                }),
            ))
        }
    }
}

/// List active ads
pub async fn list_ads(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Ad>>, (StatusCode, Json<ErrorResponse>)> {
    match state.storage.list_ads().await {
        Ok(ads) => Ok(Json(ads)),
        Err(e) => {
            tracing::error!("Failed to list ads: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Failed to list ads".to_string(),
                }),
            ))
        }
    }
}

/// Health check endpoint
pub async fn health_check() -> Json<SuccessResponse> {
    Json(SuccessResponse {
        message: "OK".to_string(),
    })
}
