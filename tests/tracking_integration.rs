//! Storefront tracking integration tests
//!
//! These tests drive the storefront router end to end: static pages served
//! behind the tracking middleware, visitor cookies, visit deduplication,
//! exclusion and the attribution of a completed order.

use adtrack::api;
use adtrack::config::MatchMode;
use adtrack::models::{
    AccessEvent, Ad, AdSummary, ConversionEvent, Media, MediaSummary, NewAccess, ReportPeriod,
};
use adtrack::storage::{SqliteStorage, Storage, StorageResult};
use adtrack::tracking::{
    AccessRecorder, ConversionOutcome, ConversionRecorder, ExclusionPolicy, SummaryAggregator,
    TrackingSettings,
};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{
        header::{COOKIE, SET_COOKIE, USER_AGENT},
        Request, StatusCode,
    },
    response::Response,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::{Layer, ServiceExt};

const COOKIE_NAME: &str = "adtrack_vid";

/// Helper to create test storage with one media and one ad
async fn create_test_storage() -> Arc<dyn Storage> {
    let storage = SqliteStorage::new("sqlite::memory:", 5).await.unwrap();
    storage.init().await.unwrap();
    let media = storage.create_media("Search").await.unwrap();
    storage
        .create_ad(media.media_id, "Spring sale", "SPRING10")
        .await
        .unwrap();
    Arc::new(storage)
}

/// Helper to create a static storefront directory
fn create_storefront_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "<h1>Shop</h1>").unwrap();
    std::fs::write(dir.path().join("landing.html"), "<h1>Spring sale</h1>").unwrap();
    dir
}

/// Helper layer to inject ConnectInfo for tests
#[derive(Clone)]
struct TestConnectInfoLayer(SocketAddr);

impl<S> Layer<S> for TestConnectInfoLayer {
    type Service = TestConnectInfoMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TestConnectInfoMiddleware {
            inner,
            addr: self.0,
        }
    }
}

#[derive(Clone)]
struct TestConnectInfoMiddleware<S> {
    inner: S,
    addr: SocketAddr,
}

impl<S, B> tower::Service<Request<B>> for TestConnectInfoMiddleware<S>
where
    S: tower::Service<Request<B>> + Clone,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        req.extensions_mut()
            .insert(axum::extract::connect_info::ConnectInfo(self.addr));
        self.inner.call(req)
    }
}

/// Storage that stalls and then fails on every call
struct UnavailableStorage {
    delay: Duration,
}

impl UnavailableStorage {
    async fn outage<T>(&self) -> anyhow::Result<T> {
        tokio::time::sleep(self.delay).await;
        Err(anyhow::anyhow!("database unavailable"))
    }
}

#[async_trait]
impl Storage for UnavailableStorage {
    async fn init(&self) -> anyhow::Result<()> {
        self.outage().await
    }
    async fn create_media(&self, _name: &str) -> anyhow::Result<Media> {
        self.outage().await
    }
    async fn create_ad(&self, _media_id: i64, _name: &str, _code: &str) -> StorageResult<Ad> {
        Ok(self.outage().await?)
    }
    async fn deactivate_media(&self, _media_id: i64) -> anyhow::Result<bool> {
        self.outage().await
    }
    async fn deactivate_ad(&self, _ad_id: i64) -> anyhow::Result<bool> {
        self.outage().await
    }
    async fn list_media(&self) -> anyhow::Result<Vec<Media>> {
        self.outage().await
    }
    async fn list_ads(&self) -> anyhow::Result<Vec<Ad>> {
        self.outage().await
    }
    async fn get_active_ad_by_code(&self, _code: &str) -> anyhow::Result<Option<Ad>> {
        self.outage().await
    }
    async fn find_open_access(
        &self,
        _unique_id: &str,
        _active_after: i64,
    ) -> anyhow::Result<Option<AccessEvent>> {
        self.outage().await
    }
    async fn insert_access(&self, _access: &NewAccess) -> anyhow::Result<AccessEvent> {
        self.outage().await
    }
    async fn increment_access_history(&self, _access_id: i64, _now: i64) -> anyhow::Result<bool> {
        self.outage().await
    }
    async fn list_accesses_by_visitor(&self, _unique_id: &str) -> anyhow::Result<Vec<AccessEvent>> {
        self.outage().await
    }
    async fn has_access(&self, _unique_id: &str) -> anyhow::Result<bool> {
        self.outage().await
    }
    async fn get_conversion_by_order(
        &self,
        _order_id: i64,
    ) -> anyhow::Result<Option<ConversionEvent>> {
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
    async fn media_summary(&self, _period: &ReportPeriod) -> anyhow::Result<Vec<MediaSummary>> {
        self.outage().await
    }
    async fn ad_summary(&self, _period: &ReportPeriod) -> anyhow::Result<Vec<AdSummary>> {
        self.outage().await
    }
}

struct Storefront {
    app: Router,
    storage: Arc<dyn Storage>,
    _dir: TempDir,
}

async fn create_storefront(settings: TrackingSettings) -> Storefront {
    create_storefront_from(SocketAddr::from(([198, 51, 100, 7], 40000)), settings).await
}

async fn create_storefront_from(peer: SocketAddr, settings: TrackingSettings) -> Storefront {
    create_storefront_with(create_test_storage().await, peer, settings)
}

fn create_storefront_with(
    storage: Arc<dyn Storage>,
    peer: SocketAddr,
    settings: TrackingSettings,
) -> Storefront {
    let dir = create_storefront_dir();
    let recorder = Arc::new(AccessRecorder::new(
        Arc::clone(&storage),
        settings,
        Duration::from_secs(60),
    ));
    let app = api::create_storefront_router(recorder, dir.path().to_str().unwrap())
        .layer(TestConnectInfoLayer(peer));

    Storefront {
        app,
        storage,
        _dir: dir,
    }
}

fn get(uri: &str, visitor: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("GET")
        .uri(uri)
        .header(USER_AGENT, "Mozilla/5.0 (X11; Linux x86_64)");
    if let Some(visitor) = visitor {
        builder = builder.header(COOKIE, format!("theme=dark; {}={}", COOKIE_NAME, visitor));
    }
    builder.body(Body::empty()).unwrap()
}

/// Value of the visitor cookie set by the response, if any
fn issued_visitor(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|v| v.strip_prefix(&format!("{}=", COOKIE_NAME)).map(str::to_string))
        .map(|rest| rest.split(';').next().unwrap_or_default().to_string())
}

async fn total_ad_accesses(storage: &Arc<dyn Storage>) -> i64 {
    storage
        .ad_summary(&ReportPeriod::all())
        .await
        .unwrap()
        .iter()
        .map(|row| row.total_accesses)
        .sum()
}

#[tokio::test]
async fn test_spring10_visit_and_order_are_attributed() {
    let storefront = create_storefront(TrackingSettings::default()).await;

    // First landing: new visitor, cookie issued, one access row
    let response = storefront
        .app
        .clone()
        .oneshot(get("/landing.html?ad=SPRING10", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let visitor = issued_visitor(&response).expect("visitor cookie should be set");

    let rows = storefront
        .storage
        .list_accesses_by_visitor(&visitor)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].ad_code.as_deref(), Some("SPRING10"));
    assert_eq!(rows[0].history, 0);
    assert_eq!(rows[0].ip_address.as_deref(), Some("198.51.100.7"));
    assert_eq!(rows[0].page.as_deref(), Some("/landing.html?ad=SPRING10"));

    // Same visitor reloads the landing page within the visit
    let response = storefront
        .app
        .clone()
        .oneshot(get("/landing.html?ad=SPRING10", Some(&visitor)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(issued_visitor(&response).is_none(), "known visitor gets no new cookie");

    let rows = storefront
        .storage
        .list_accesses_by_visitor(&visitor)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].history, 1);

    // Checkout completes order 123
    let conversions =
        ConversionRecorder::new(Arc::clone(&storefront.storage), Duration::from_secs(5));
    let outcome = conversions.on_order_completed(123, Some(&visitor)).await;
    assert!(matches!(outcome, ConversionOutcome::Recorded { .. }));
    assert_eq!(
        conversions.on_order_completed(123, Some(&visitor)).await,
        ConversionOutcome::AlreadyRecorded
    );

    let aggregator =
        SummaryAggregator::new(Arc::clone(&storefront.storage), Duration::from_secs(5));
    let ads = aggregator.ad_summary(ReportPeriod::all()).await.unwrap();
    assert_eq!(ads.len(), 1);
    assert_eq!(ads[0].ad_code, "SPRING10");
    assert_eq!(ads[0].total_accesses, 1);
    assert_eq!(ads[0].unique_visitors, 1);
    assert_eq!(ads[0].conversions, 1);
    assert!((ads[0].conversion_rate - 1.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_excluded_ip_is_not_recorded() {
    let settings = TrackingSettings {
        exclusion: ExclusionPolicy::new(
            vec!["127.0.0.0/8".to_string()],
            MatchMode::Exact,
            Vec::new(),
            MatchMode::Exact,
        ),
        ..TrackingSettings::default()
    };
    let storefront =
        create_storefront_from(SocketAddr::from(([127, 0, 0, 1], 12345)), settings).await;

    let response = storefront
        .app
        .clone()
        .oneshot(get("/landing.html?ad=SPRING10", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    if let Some(visitor) = issued_visitor(&response) {
        assert!(!storefront.storage.has_access(&visitor).await.unwrap());
    }
    assert_eq!(total_ad_accesses(&storefront.storage).await, 0);
}

#[tokio::test]
async fn test_excluded_user_agent_is_not_recorded() {
    let settings = TrackingSettings {
        exclusion: ExclusionPolicy::new(
            Vec::new(),
            MatchMode::Exact,
            vec!["X11; Linux".to_string()],
            MatchMode::Substring,
        ),
        ..TrackingSettings::default()
    };
    let storefront = create_storefront(settings).await;

    let response = storefront
        .app
        .clone()
        .oneshot(get("/landing.html?ad=SPRING10", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(total_ad_accesses(&storefront.storage).await, 0);
}

#[tokio::test]
async fn test_disabled_tracking_sets_no_cookie() {
    let settings = TrackingSettings {
        enabled: false,
        ..TrackingSettings::default()
    };
    let storefront = create_storefront(settings).await;

    let response = storefront
        .app
        .clone()
        .oneshot(get("/landing.html?ad=SPRING10", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(issued_visitor(&response).is_none());
    assert_eq!(total_ad_accesses(&storefront.storage).await, 0);
}

#[tokio::test]
async fn test_error_responses_are_not_tracked() {
    let storefront = create_storefront(TrackingSettings::default()).await;

    let response = storefront
        .app
        .clone()
        .oneshot(get("/missing.html?ad=SPRING10", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(issued_visitor(&response).is_none());
    assert_eq!(total_ad_accesses(&storefront.storage).await, 0);
}

#[tokio::test]
async fn test_non_get_requests_are_not_tracked() {
    let storefront = create_storefront(TrackingSettings::default()).await;

    let request = Request::builder()
        .method("POST")
        .uri("/landing.html?ad=SPRING10")
        .body(Body::empty())
        .unwrap();
    let response = storefront.app.clone().oneshot(request).await.unwrap();

    assert!(issued_visitor(&response).is_none());
    assert_eq!(total_ad_accesses(&storefront.storage).await, 0);
}

#[tokio::test]
async fn test_health_check_bypasses_tracking() {
    let storefront = create_storefront(TrackingSettings::default()).await;

    let response = storefront
        .app
        .clone()
        .oneshot(get("/health", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(issued_visitor(&response).is_none());
}

#[tokio::test]
async fn test_unknown_ad_code_is_recorded_without_attribution() {
    let storefront = create_storefront(TrackingSettings::default()).await;

    let response = storefront
        .app
        .clone()
        .oneshot(get("/?ad=NOT_A_CAMPAIGN", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let visitor = issued_visitor(&response).unwrap();

    let rows = storefront
        .storage
        .list_accesses_by_visitor(&visitor)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].ad_code, None);
    assert_eq!(total_ad_accesses(&storefront.storage).await, 0);
}

#[tokio::test]
async fn test_new_ad_code_starts_new_visit() {
    let storefront = create_storefront(TrackingSettings::default()).await;
    let ads = storefront.storage.list_ads().await.unwrap();
    storefront
        .storage
        .create_ad(ads[0].media_id, "Summer sale", "SUMMER")
        .await
        .unwrap();

    let response = storefront
        .app
        .clone()
        .oneshot(get("/landing.html?ad=SPRING10", None))
        .await
        .unwrap();
    let visitor = issued_visitor(&response).unwrap();

    for uri in ["/index.html", "/landing.html?ad=SUMMER"] {
        let response = storefront
            .app
            .clone()
            .oneshot(get(uri, Some(&visitor)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let rows = storefront
        .storage
        .list_accesses_by_visitor(&visitor)
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].ad_code.as_deref(), Some("SPRING10"));
    assert_eq!(rows[0].history, 1);
    assert_eq!(rows[1].ad_code.as_deref(), Some("SUMMER"));
    assert_eq!(rows[1].history, 0);
}

#[tokio::test]
async fn test_storage_outage_leaves_response_untouched() {
    for delay in [Duration::ZERO, Duration::from_secs(30)] {
        let settings = TrackingSettings {
            write_timeout: Duration::from_millis(50),
            ..TrackingSettings::default()
        };
        let storefront = create_storefront_with(
            Arc::new(UnavailableStorage { delay }),
            SocketAddr::from(([198, 51, 100, 7], 40000)),
            settings,
        );

        let started = std::time::Instant::now();
        let response = storefront
            .app
            .clone()
            .oneshot(get("/landing.html?ad=SPRING10", None))
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));

        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            issued_visitor(&response).is_some(),
            "visitor cookie is issued even when the write is dropped"
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"<h1>Spring sale</h1>");

        let conversions =
            ConversionRecorder::new(Arc::clone(&storefront.storage), Duration::from_millis(50));
        let visitor = adtrack::tracking::VisitorId::generate();
        assert_eq!(
            conversions.on_order_completed(1, Some(visitor.as_str())).await,
            ConversionOutcome::Dropped
        );
    }
}
