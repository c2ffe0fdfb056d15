//! HTTP surface of the pipeline
//!
//! `POST /chat` and `GET /trending` (each also under `/api`), static assets
//! with `index.html` as the catch-all document, permissive CORS.

use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::{header, Method, StatusCode},
    routing::{get, post},
    Json, Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

use crate::error::ChatError;
use crate::pipeline::{ChatReply, ChatRequest, ChatService};
use crate::trending::{TopicsReply, TrendingService};

/// Request body limit; image uploads arrive base64-encoded inline
pub const BODY_LIMIT_BYTES: usize = 10 * 1024 * 1024;

pub struct AppState {
    pub chat: ChatService,
    pub trending: TrendingService,
}

async fn health() -> &'static str {
    "ok"
}

async fn chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatReply>, ChatError> {
    let Json(request) = payload.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ChatError::PayloadTooLarge
        } else {
            ChatError::Validation(rejection.body_text())
        }
    })?;
    state.chat.respond(&request).await.map(Json)
}

async fn trending(State(state): State<Arc<AppState>>) -> Json<TopicsReply> {
    Json(state.trending.topics().await)
}

pub fn router(state: Arc<AppState>, static_dir: Option<&Path>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat))
        .route("/api/chat", post(chat))
        .route("/trending", get(trending))
        .route("/api/trending", get(trending));

    if let Some(dir) = static_dir {
        let assets = ServeDir::new(dir).fallback(ServeFile::new(dir.join("index.html")));
        app = app.fallback_service(assets);
    }

    app.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES)),
    )
    .with_state(state)
}
