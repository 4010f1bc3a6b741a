use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use rusage_accounting::{config::Config, server, AppState};

#[tokio::main]
async fn main() {
    let config = Config::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(config).await {
        tracing::error!("fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> std::io::Result<()> {
    let addr = config.listen;
    let state = Arc::new(AppState::new(config));
    let app = server::create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("listening on http://{addr}");
    tracing::info!("metrics JSON → http://{addr}/api/metrics");
    tracing::info!("metrics SSE  → http://{addr}/api/metrics/stream");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

/// Waits for Ctrl-C, used for graceful shutdown.
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
