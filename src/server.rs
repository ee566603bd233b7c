//! Router assembly and server startup.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use tower_http::cors::CorsLayer;

use crate::api::{self, AppState, SharedState};
use crate::config::ServerConfig;
use crate::orchestrator::Orchestrator;
use crate::ws;

/// Build the full application router: REST API plus per-project WebSocket.
pub fn build_router(state: SharedState) -> Router {
    api::api_router()
        .route("/ws/{name}", get(ws::ws_handler))
        .with_state(state)
}

/// Start the slipway server and block until shutdown.
pub async fn start_server(config: ServerConfig, open_browser: bool) -> Result<()> {
    std::fs::create_dir_all(&config.deployments_dir).with_context(|| {
        format!(
            "Failed to create deployments directory {}",
            config.deployments_dir.display()
        )
    })?;

    let port = config.port;
    let dev_mode = config.dev_mode;
    let state = Arc::new(AppState {
        orchestrator: Arc::new(Orchestrator::new(config)),
    });

    let mut app = build_router(state);
    if dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let host = if dev_mode { "0.0.0.0" } else { "127.0.0.1" };
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    println!("Slipway running at http://{}", local_addr);

    if open_browser {
        let _ = open::that(format!("http://{}", local_addr));
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    println!("Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    println!("\nShutting down...");
}
