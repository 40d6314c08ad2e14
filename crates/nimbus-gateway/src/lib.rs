//! REST + WebSocket gateway for the nimbus assistant.
//!
//! Exposes chat, media generation, conversation management, memory, and
//! configuration endpoints under `/api`, plus a streaming chat WebSocket
//! at `/ws/chat/{conversation_id}`.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod ws;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use nimbus_engine::Engine;
use nimbus_types::config::ServerConfig;

/// Shared state accessible by all API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<Engine>,
    pub auth: Arc<auth::TokenStore>,
    /// Server settings captured at startup.
    pub server: ServerConfig,
}

impl ApiState {
    pub fn new(engine: Arc<Engine>) -> Self {
        let server = engine.config().server.clone();
        Self {
            engine,
            auth: Arc::new(auth::TokenStore::new()),
            server,
        }
    }
}

/// Build the API router with all routes.
pub fn build_router(state: ApiState, cors_origins: &[String]) -> Router {
    let cors = if cors_origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<_> = cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        .nest("/api", handlers::api_routes())
        .route(
            "/ws/chat/{conversation_id}",
            axum::routing::get(ws::ws_chat_handler),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve the API until the process is stopped.
pub async fn serve(engine: Arc<Engine>, host: &str, port: u16) -> std::io::Result<()> {
    let state = ApiState::new(engine);
    let cors_origins = state.server.cors_origins.clone();
    let router = build_router(state, &cors_origins);

    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    tracing::info!(host, port, "gateway listening");
    axum::serve(listener, router).await
}
