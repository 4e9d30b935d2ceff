use axum::{
    extract::{ConnectInfo, Query, Request, State},
    http::{
        header::{COOKIE, REFERER, SET_COOKIE, USER_AGENT},
        HeaderMap, HeaderValue, Method, Uri,
    },
    middleware::{self, Next},
    response::Response,
    Router,
};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, warn};

use super::ip_extractor::extract_client_ip;
use super::recorder::{AccessRecorder, PageHit};

/// Wrap every route of `router` with the access tracker
pub fn with_tracking<S>(router: Router<S>, recorder: Arc<AccessRecorder>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(middleware::from_fn_with_state(recorder, track_access))
}

/// Post-response hook logging storefront visits.
///
/// The handler always runs first and its response is passed through
/// untouched, apart from a `Set-Cookie` for visitors seen for the first time.
/// Only successful or redirected `GET` requests are tracked.
pub async fn track_access(
    State(recorder): State<Arc<AccessRecorder>>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() != Method::GET || !recorder.is_enabled() {
        return next.run(request).await;
    }

    let settings = recorder.settings();
    let socket_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    let headers = request.headers();
    let hit = PageHit {
        visitor_token: header_str(headers, COOKIE).and_then(|h| settings.cookie.read(h)),
        ad_code: ad_code_from_uri(request.uri(), &settings.ad_param),
        referrer: header_str(headers, REFERER).map(str::to_string),
        ip: extract_client_ip(headers, socket_ip, &settings.proxy_trust),
        user_agent: header_str(headers, USER_AGENT).unwrap_or_default().to_string(),
        page: request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| request.uri().path().to_string()),
    };

    let mut response = next.run(request).await;

    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        return response;
    }

    let recorded = recorder.record(hit).await;
    debug!(outcome = ?recorded.outcome, "access tracked");

    if let Some(visitor) = recorded.issued_visitor {
        let cookie = settings.cookie.build(&visitor);
        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(value) => {
                response.headers_mut().append(SET_COOKIE, value);
            }
            Err(err) => warn!(error = %err, "failed to encode visitor cookie"),
        }
    }

    response
}

fn header_str(headers: &HeaderMap, name: axum::http::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|h| h.to_str().ok())
}

/// Ad tracking code from the landing URL, blank values count as absent
fn ad_code_from_uri(uri: &Uri, param: &str) -> Option<String> {
    let Query(mut params) = Query::<HashMap<String, String>>::try_from_uri(uri).ok()?;
    params
        .remove(param)
        .map(|code| code.trim().to_string())
        .filter(|code| !code.is_empty())
}
