use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use battery_usage_api::{
    app::{create_app, AppState},
    config::Config,
    jobs::{JobScheduler, RefreshUsageJob},
    middleware,
    services::JsonFileHistorySource,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::load()?;

    middleware::logging::init_logging(&config.logging);
    middleware::init_metrics()?;

    info!("Starting Battery Usage API v{}", env!("CARGO_PKG_VERSION"));

    let addr = config.socket_addr()?;
    let state = AppState::new(config);

    let mut scheduler = JobScheduler::new();
    let history = &state.config.history;
    if history.snapshot_path.is_empty() {
        warn!("history.snapshot_path not set, periodic refresh disabled");
    } else {
        info!(path = %history.snapshot_path, "Refreshing usage from history snapshot");
        scheduler.register(RefreshUsageJob::new(
            Arc::new(JsonFileHistorySource::new(&history.snapshot_path)),
            Arc::clone(&state.engine),
            state.latest.clone(),
            state.config.history_window_millis(),
            history.refresh_interval_minutes,
            scheduler.shutdown_token(),
        ));
    }
    scheduler.start();

    let app = create_app(state);

    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown();
    scheduler.wait_for_shutdown(Duration::from_secs(10)).await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
