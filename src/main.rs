use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use adtrack::api::{self, handlers::AppState};
use adtrack::auth::AuthService;
use adtrack::config::{Config, DatabaseBackend};
use adtrack::storage::{PostgresStorage, SqliteStorage, Storage};
use adtrack::tracking::{AccessRecorder, ConversionRecorder, SummaryAggregator, TrackingSettings};

const REPORT_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("adtrack=info")),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration");

    // Initialize storage
    let storage: Arc<dyn Storage> = match config.database.backend {
        DatabaseBackend::Sqlite => {
            info!("Using SQLite storage: {}", config.database.url);
            Arc::new(
                SqliteStorage::new(&config.database.url, config.database.max_connections).await?,
            )
        }
        DatabaseBackend::Postgres => {
            info!("Using PostgreSQL storage: {}", config.database.url);
            Arc::new(
                PostgresStorage::new(&config.database.url, config.database.max_connections)
                    .await?,
            )
        }
    };

    info!("Initializing database...");
    storage.init().await?;
    info!("Database initialized successfully");

    let settings = TrackingSettings::from_config(&config.tracking);
    let write_timeout = settings.write_timeout;
    if settings.enabled {
        info!(
            "📈 Tracking enabled (param '{}', visit window {}s)",
            settings.ad_param, settings.visit_timeout_secs
        );
        if !settings.exclusion.is_empty() {
            info!("🚫 Exclusion lists loaded, matching requests are not tracked");
        }
    } else {
        info!("📉 Tracking is disabled, storefront visits are not logged");
    }

    let recorder = Arc::new(AccessRecorder::new(
        Arc::clone(&storage),
        settings,
        Duration::from_secs(config.tracking.ad_cache_secs),
    ));
    let conversions = Arc::new(ConversionRecorder::new(Arc::clone(&storage), write_timeout));
    let summaries = Arc::new(SummaryAggregator::new(Arc::clone(&storage), REPORT_TIMEOUT));

    let auth_service = Arc::new(AuthService::new(&config.auth));
    if auth_service.is_enabled() {
        info!("🔐 API key authentication enabled");
    } else {
        info!("🔓 Authentication is disabled - all API requests are allowed");
    }

    #[cfg(unix)]
    spawn_reload_hook(Arc::clone(&recorder));

    // Create routers
    let state = Arc::new(AppState {
        storage: Arc::clone(&storage),
        conversions,
        summaries,
    });
    let api_router = api::create_api_router(state, auth_service);
    let storefront_router =
        api::create_storefront_router(Arc::clone(&recorder), &config.storefront.static_dir);
    info!("🛍  Serving storefront from directory: {}", config.storefront.static_dir);

    // Start API server
    let api_addr = format!("{}:{}", config.api_server.host, config.api_server.port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr).await?;
    info!("🚀 API server listening on http://{}", api_addr);

    // Start storefront server
    let storefront_addr = format!(
        "{}:{}",
        config.storefront_server.host, config.storefront_server.port
    );
    let storefront_listener = tokio::net::TcpListener::bind(&storefront_addr).await?;
    info!("🚀 Storefront server listening on http://{}", storefront_addr);

    // Run both servers concurrently
    tokio::try_join!(
        axum::serve(api_listener, api_router),
        axum::serve(
            storefront_listener,
            storefront_router.into_make_service_with_connect_info::<SocketAddr>(),
        ),
    )?;

    Ok(())
}

/// Re-read tracking configuration on SIGHUP
#[cfg(unix)]
fn spawn_reload_hook(recorder: Arc<AccessRecorder>) {
    use adtrack::config::TrackingConfig;
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!("Failed to install SIGHUP handler, reload disabled: {}", e);
            return;
        }
    };

    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            match TrackingConfig::reload_from_env(None) {
                Ok(tracking) => {
                    recorder.reload(TrackingSettings::from_config(&tracking));
                    info!("🔄 Tracking settings reloaded (enabled: {})", tracking.enabled);
                }
                Err(e) => {
                    tracing::warn!("Ignoring SIGHUP, tracking configuration is invalid: {:#}", e);
                }
            }
        }
    });
}
