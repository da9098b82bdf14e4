use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use studyhall_backend::config::AppPaths;
use studyhall_backend::logging;
use studyhall_backend::server;
use studyhall_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logging first so degraded-startup warnings from state wiring are
    // not dropped.
    let paths = Arc::new(AppPaths::new());
    logging::init(&paths);

    let state = AppState::initialize(paths)
        .await
        .map_err(|err| anyhow::anyhow!("Failed to initialize application state: {}", err))?;

    let bind_addr = format!("127.0.0.1:{}", state.settings.server.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;

    println!("STUDYHALL_PORT={}", addr.port());
    tracing::info!("Listening on {}", addr);

    let app: Router = server::router(state.clone());
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
