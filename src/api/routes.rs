use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::services::ServeDir;

use crate::auth::{auth_middleware, AuthService};
use crate::tracking::{with_tracking, AccessRecorder};

use super::handlers::{health_check, list_ads, list_media, order_completed, AppState};
use super::reports::{ad_report, media_report};

pub fn create_api_router(state: Arc<AppState>, auth_service: Arc<AuthService>) -> Router {
    let protected_routes = Router::new()
        .route("/conversions", post(order_completed))
        .route("/media", get(list_media))
        .route("/ads", get(list_ads))
        .route("/reports/media", get(media_report))
        .route("/reports/ads", get(ad_report))
        .route_layer(middleware::from_fn_with_state(auth_service, auth_middleware))
        .with_state(state);

    let api = Router::new()
        .route("/health", get(health_check))
        .merge(protected_routes);

    Router::new().nest("/api", api)
}

/// Static storefront behind the access tracker
pub fn create_storefront_router(recorder: Arc<AccessRecorder>, static_dir: &str) -> Router {
    let tracked = Router::new().fallback_service(ServeDir::new(static_dir));

    with_tracking(tracked, recorder).route("/health", get(health_check))
}
