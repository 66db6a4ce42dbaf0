//! Pharma Insights Backend
//!
//! HTTP server for the pharma research orchestrator: routes a question to
//! research capabilities, synthesizes their findings and optionally renders
//! a report.

use pharma_insights_backend::api;
use pharma_insights_backend::config::Config;
use pharma_insights_backend::state::AppState;
use std::net::SocketAddr;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load configuration
    let config = Config::from_env();
    info!(
        addr = %config.server_addr(),
        reports_dir = %config.reports_dir,
        api_key_set = config.api_key.is_some(),
        orchestrator = ?config.orchestrator,
        "Configuration loaded"
    );

    // Initialize application state
    let app_state = AppState::from_config(&config).await?;
    let reports_dir = app_state.reports_dir().to_path_buf();
    info!(
        capabilities = app_state.pipeline().registry().len(),
        reports_dir = %reports_dir.display(),
        "Pipeline ready"
    );

    let app = api::router(app_state.shared(), &reports_dir);

    // Bind to address from config
    let addr: SocketAddr = config
        .server_addr()
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid server address: {}", e))?;

    info!("🚀 Server running on http://{}", addr);
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    // Setup graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Handle graceful shutdown signals (Ctrl+C, SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}
