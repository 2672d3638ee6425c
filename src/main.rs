//! PPE Monitor - Protective equipment compliance server
//!
//! Main entry point for the monitoring server.

use ppe_monitor::{
    alert_store::{AlertRepository, MemoryAlertRepository, MySqlAlertRepository},
    detector::{DetectionModel, HttpDetectionModel},
    image_store::{FsImageStore, ImageStore},
    session_manager::SessionManager,
    state::{AppConfig, AppState},
    web_api,
};
use sqlx::mysql::MySqlPoolOptions;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Alert repository for the configured backend
async fn connect_alert_store(config: &AppConfig) -> anyhow::Result<(Arc<dyn AlertRepository>, bool)> {
    let Some(database_url) = &config.database_url else {
        tracing::warn!("DATABASE_URL not set, alerts are kept in memory only");
        return Ok((Arc::new(MemoryAlertRepository::default()), false));
    };

    let pool = MySqlPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await?;
    tracing::info!("Database connected");

    let repository = MySqlAlertRepository::new(pool);
    repository.ensure_schema().await?;
    tracing::info!("Alert schema ready");

    Ok((Arc::new(repository), true))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ppe_monitor=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting PPE Monitor v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    tracing::info!(
        detector_url = %config.detector_url,
        model = %config.model_name,
        media_dir = %config.media_dir.display(),
        db_backed = config.database_url.is_some(),
        "Configuration loaded"
    );

    // Configuration faults are fatal here
    let defaults = config.default_session();
    defaults.validate()?;
    let detector = Arc::new(HttpDetectionModel::new(
        &config.detector_url,
        &config.model_name,
        config.model_path.as_deref(),
        defaults.inference_timeout(),
    )?);

    let (alerts, db_backed) = connect_alert_store(&config).await?;

    tokio::fs::create_dir_all(&config.media_dir).await?;
    let images: Arc<dyn ImageStore> = Arc::new(FsImageStore::new(config.media_dir.clone()));

    let model: Arc<dyn DetectionModel> = detector.clone();
    let sessions = Arc::new(SessionManager::new(model, alerts.clone(), images));
    tracing::info!("SessionManager initialized");

    let state = AppState {
        config: config.clone(),
        sessions: sessions.clone(),
        alerts,
        detector,
        db_backed,
        started_at: Instant::now(),
    };

    if config.autostart_camera {
        match sessions.start(defaults).await {
            Ok(status) => tracing::info!(url = %status.stream_url, "Default camera started"),
            Err(e) => tracing::warn!(error = %e, "Default camera autostart failed"),
        }
    }

    // Alert captures are served from the media directory
    let app = web_api::create_router(state.clone())
        .nest_service("/media", ServeDir::new(&config.media_dir))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sessions.stop_all().await;
    tracing::info!("PPE Monitor stopped");

    Ok(())
}
