use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use prism_server::bootstrap::bootstrap;
use prism_server::config::Args;
use prism_server::routes::create_router;
use prism_server::state::AppState;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

#[tokio::main]
async fn main() -> Result<()> {
    // `.env` must be loaded before clap reads the environment.
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("prism_server=info,prism_core=info,tower_http=info")),
        )
        .init();

    let args = Args::parse();
    let state: AppState = Arc::new(bootstrap(&args).await?);
    let app = create_router(Arc::clone(&state), &args.cors());

    // --- Start the server ---
    let bind_address = args.bind_address();
    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("binding {bind_address}"))?;
    info!(address = %listener.local_addr()?, device = %state.device(), "prism server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let released = state.registry.release_all().await;
    info!(count = released.len(), "released loaded pipelines");
    Ok(())
}
