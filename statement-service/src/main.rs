use std::net::SocketAddr;

use anyhow::Result;
use statement_service::{
    config::AppConfig,
    metrics_server,
    observability,
    sources::http_upload::{self, AppState},
};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    // Load configuration
    let cfg = AppConfig::load()?;

    // Start metrics server if configured
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let addr: SocketAddr = cfg
        .server
        .http_bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid server.http_bind_addr: {e}"))?;

    tokio::fs::create_dir_all(&cfg.statements.staging_root).await?;

    let app = http_upload::router(AppState::new(cfg.statements.clone()), cfg.server.max_body_bytes);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, staging_root = %cfg.statements.staging_root.display(), "statement service listening");

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
