//! drona-api: HTTP server for the chat pipeline
//!
//! Serves `POST /chat`, `GET /trending` and the static client.
//! Run with: GEMINI_API_KEY=... cargo run --bin drona-api

use std::sync::Arc;

use anyhow::Context;
use drona::{
    config::{self, Config},
    logging,
    pipeline::ChatService,
    server::{self, AppState},
    trending::TrendingService,
};

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    dotenv::dotenv().ok();
    logging::init_tracing(logging::SERVER_FILTER);

    let cfg = Config::load_with_env()?;
    let port = config::server_port();

    let chat = ChatService::from_config(&cfg);
    let store = chat.cache().map(|c| c.store().clone());
    let trending = TrendingService::from_config(&cfg, store);
    let state = Arc::new(AppState { chat, trending });

    let static_dir = cfg.static_dir.as_deref();
    match static_dir {
        Some(dir) => tracing::info!(dir = %dir.display(), "serving static assets"),
        None => tracing::info!("DRONA_STATIC_DIR not set; API only"),
    }
    let app = server::router(state, static_dir);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    tracing::info!(port, model = cfg.model(), "drona-api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
