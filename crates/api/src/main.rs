use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vigil_api::config::ServerConfig;
use vigil_api::{engine, router, state, ws};
use vigil_pipeline::{BatchRunner, PgPersistence};
use vigil_scanner::{EngineConfig, EngineExecutor, ScanEngineManager};

use state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vigil_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = vigil_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    vigil_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    vigil_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Observer feed manager + heartbeat ---
    let ws_manager = Arc::new(ws::WsManager::new());
    let heartbeat_handle =
        ws::start_heartbeat(Arc::clone(&ws_manager), config.feed_heartbeat_secs);

    // --- Scan engine bridge ---
    let engine_manager = ScanEngineManager::start(EngineConfig {
        ws_url: config.engine_ws_url.clone(),
        api_url: config.engine_api_url.clone(),
    });
    tracing::info!("Scan engine manager started");

    // --- Progress pump (engine events -> job rows + observer feeds) ---
    let pump_cancel = CancellationToken::new();
    let pump_handle = tokio::spawn(engine::progress::run_progress_pump(
        pool.clone(),
        Arc::clone(&ws_manager),
        engine_manager.subscribe(),
        pump_cancel.clone(),
    ));

    // --- Batch pipeline ---
    let batch_feed: Arc<dyn vigil_pipeline::ProgressFeed> = ws_manager.clone();
    let batch_runner = BatchRunner::new(
        Arc::new(PgPersistence::new(pool.clone())),
        Arc::new(EngineExecutor::new(Arc::clone(&engine_manager))),
        batch_feed,
    );
    tracing::info!("Batch runner created");

    // --- App state + router ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        ws_manager: Arc::clone(&ws_manager),
        engine: Arc::clone(&engine_manager),
        batch_runner: Arc::clone(&batch_runner),
    };
    let app = router::build_app_router(state, &config);

    // --- Serve ---
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Invalid bind address");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    tracing::info!(%addr, "vigil API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Drain background services ---
    tracing::info!("Shutting down background services");
    pump_cancel.cancel();
    let _ = pump_handle.await;
    batch_runner.shutdown().await;
    engine_manager.shutdown().await;
    ws_manager.shutdown_all().await;
    heartbeat_handle.abort();
    tracing::info!("Shutdown complete");
}

/// Resolve when the process receives SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
