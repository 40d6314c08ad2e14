//! HTTP request handlers for the REST API.

use axum::extract::{Path, Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use nimbus_types::memory::MemoryKind;

use crate::auth::{TokenCheck, ALL_SCOPES, DEFAULT_TTL_SECS};
use crate::error::ApiError;
use crate::ApiState;

/// Build all API routes.
pub fn api_routes() -> Router<ApiState> {
    Router::new()
        // Chat + generation
        .route("/chat", post(chat))
        .route("/generate/image", post(generate_image))
        .route("/generate/video", post(generate_video))
        .route("/models", get(list_models))
        .route("/plugins", get(list_plugins))
        // Conversations
        .route("/conversations", post(create_conversation))
        .route("/conversations", get(list_conversations))
        .route("/conversations/{id}", get(get_conversation))
        .route("/conversations/{id}", delete(delete_conversation))
        .route("/conversations/{id}/messages", post(post_message))
        // Memory
        .route("/memory/knowledge", post(add_knowledge))
        .route("/memory/knowledge/search", post(search_knowledge))
        .route("/memory/episodic", post(add_episodic))
        .route("/memory/episodic/search", post(search_episodic))
        // Config
        .route("/config/models", get(get_model_config))
        .route("/config/models", put(update_model_config))
        .route("/config/system", get(system_info))
        // Auth
        .route("/auth/token", post(create_token))
        // Health check
        .route("/health", get(health_check))
}

/// Check the bearer token for `scope`. A deployment without an auth secret
/// runs open, matching a localhost setup.
fn authorize(state: &ApiState, headers: &HeaderMap, scope: &str) -> Result<(), ApiError> {
    if state.server.auth_secret.is_none() {
        return Ok(());
    }

    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthorized("missing bearer token".into()))?;

    match state.auth.check(token, scope) {
        TokenCheck::Ok => Ok(()),
        TokenCheck::Invalid => Err(ApiError::Unauthorized("invalid or expired token".into())),
        TokenCheck::Forbidden => Err(ApiError::Forbidden(format!("scope {scope} required"))),
    }
}

fn require_text(value: Option<String>, field: &str) -> Result<String, ApiError> {
    match value {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(ApiError::BadRequest(format!("{field} is required"))),
    }
}

#[derive(Deserialize)]
struct ChatBody {
    message: Option<String>,
    session_id: Option<String>,
    user_id: Option<String>,
}

async fn chat(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<ChatBody>,
) -> Result<Json<Value>, ApiError> {
    authorize(&state, &headers, "conversation:write")?;
    let message = require_text(body.message, "message")?;

    let outcome = state
        .engine
        .chat(body.session_id.as_deref(), body.user_id.as_deref(), &message)
        .await?;

    Ok(Json(json!({
        "response": outcome.message.content,
        "session_id": outcome.conversation_id,
        "status": "success",
    })))
}

#[derive(Deserialize)]
struct GenerateBody {
    prompt: Option<String>,
    model: Option<String>,
}

async fn generate_image(
    State(state): State<ApiState>,
    Json(body): Json<GenerateBody>,
) -> Result<Json<Value>, ApiError> {
    let prompt = require_text(body.prompt, "prompt")?;
    let image = state
        .engine
        .generate_image(&prompt, body.model.as_deref())
        .await?;
    Ok(Json(json!({ "image": image, "status": "success" })))
}

async fn generate_video(
    State(state): State<ApiState>,
    Json(body): Json<GenerateBody>,
) -> Result<Json<Value>, ApiError> {
    let prompt = require_text(body.prompt, "prompt")?;
    let video = state
        .engine
        .generate_video(&prompt, body.model.as_deref())
        .await?;
    Ok(Json(json!({ "video": video, "status": "success" })))
}

async fn list_models(State(state): State<ApiState>) -> Json<Value> {
    Json(json!({
        "models": state.engine.available_models(),
        "status": "success",
    }))
}

async fn list_plugins() -> Json<Value> {
    Json(json!({
        "plugins": [
            { "name": "text_generation", "enabled": true },
            { "name": "image_generation", "enabled": true },
            { "name": "video_generation", "enabled": true },
        ],
        "status": "success",
    }))
}

#[derive(Deserialize)]
struct CreateConversationBody {
    title: Option<String>,
}

async fn create_conversation(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<CreateConversationBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    authorize(&state, &headers, "conversation:write")?;
    let conv = state.engine.create_conversation(body.title)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "conversation": conv, "status": "success" })),
    ))
}

#[derive(Deserialize)]
struct PageQuery {
    page: Option<usize>,
    page_size: Option<usize>,
}

async fn list_conversations(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, ApiError> {
    authorize(&state, &headers, "conversation:read")?;
    let page = query.page.unwrap_or(1);
    let page_size = query.page_size.unwrap_or(20).clamp(1, 100);
    let conversations = state.engine.list_conversations(page, page_size)?;
    Ok(Json(json!({
        "conversations": conversations,
        "page": page,
        "page_size": page_size,
        "status": "success",
    })))
}

async fn get_conversation(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    authorize(&state, &headers, "conversation:read")?;
    let conv = state.engine.get_conversation(&id)?;
    Ok(Json(json!({ "conversation": conv, "status": "success" })))
}

async fn delete_conversation(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    authorize(&state, &headers, "conversation:write")?;
    if state.engine.delete_conversation(&id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("conversation {id} not found")))
    }
}

#[derive(Deserialize)]
struct PostMessageBody {
    message: Option<String>,
    user_id: Option<String>,
}

async fn post_message(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<PostMessageBody>,
) -> Result<Json<Value>, ApiError> {
    authorize(&state, &headers, "conversation:write")?;
    let message = require_text(body.message, "message")?;
    let outcome = state
        .engine
        .chat(Some(&id), body.user_id.as_deref(), &message)
        .await?;
    Ok(Json(json!({
        "message": outcome.message,
        "model": outcome.model,
        "status": "success",
    })))
}

#[derive(Deserialize)]
struct AddKnowledgeBody {
    text: Option<String>,
    metadata: Option<Value>,
    id: Option<String>,
}

async fn add_knowledge(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<AddKnowledgeBody>,
) -> Result<Json<Value>, ApiError> {
    authorize(&state, &headers, "memory:write")?;
    let text = require_text(body.text, "text")?;
    let metadata = body.metadata.unwrap_or_else(|| json!({}));
    let id = state.engine.add_knowledge(&text, metadata, body.id).await?;
    Ok(Json(json!({ "id": id, "status": "success" })))
}

#[derive(Deserialize)]
struct SearchKnowledgeBody {
    query: Option<String>,
    limit: Option<usize>,
}

fn hits_to_json(hits: Vec<nimbus_engine::SearchHit>) -> Vec<Value> {
    hits.into_iter()
        .map(|h| {
            json!({
                "id": h.id,
                "text": h.text,
                "metadata": h.metadata,
                "score": h.score,
            })
        })
        .collect()
}

async fn search_knowledge(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<SearchKnowledgeBody>,
) -> Result<Json<Value>, ApiError> {
    authorize(&state, &headers, "memory:read")?;
    let query = require_text(body.query, "query")?;
    let limit = body.limit.unwrap_or(5).clamp(1, 50);
    let hits = state.engine.search_knowledge(&query, limit).await?;
    Ok(Json(json!({ "results": hits_to_json(hits), "status": "success" })))
}

#[derive(Deserialize)]
struct AddEpisodicBody {
    user_id: Option<String>,
    kind: Option<String>,
    content: Option<String>,
}

async fn add_episodic(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<AddEpisodicBody>,
) -> Result<Json<Value>, ApiError> {
    authorize(&state, &headers, "memory:write")?;
    let user_id = require_text(body.user_id, "user_id")?;
    let content = require_text(body.content, "content")?;
    let kind = body
        .kind
        .as_deref()
        .unwrap_or("interaction")
        .parse::<MemoryKind>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let record = state.engine.add_episodic(&user_id, kind, &content).await?;
    Ok(Json(json!({ "memory": record, "status": "success" })))
}

#[derive(Deserialize)]
struct SearchEpisodicBody {
    user_id: Option<String>,
    query: Option<String>,
    limit: Option<usize>,
}

async fn search_episodic(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<SearchEpisodicBody>,
) -> Result<Json<Value>, ApiError> {
    authorize(&state, &headers, "memory:read")?;
    let user_id = require_text(body.user_id, "user_id")?;
    let query = require_text(body.query, "query")?;
    let limit = body.limit.unwrap_or(5).clamp(1, 50);
    let hits = state.engine.search_episodic(&user_id, &query, limit).await;
    Ok(Json(json!({ "results": hits_to_json(hits), "status": "success" })))
}

async fn get_model_config(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    authorize(&state, &headers, "config:read")?;
    let config = state.engine.routing_config().await;
    Ok(Json(json!({ "config": config, "status": "success" })))
}

#[derive(Deserialize)]
struct RoutingUpdateBody {
    primary_model: Option<String>,
    fallback_models: Option<Vec<String>>,
    complexity_threshold: Option<u8>,
    token_threshold: Option<usize>,
}

async fn update_model_config(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<RoutingUpdateBody>,
) -> Result<Json<Value>, ApiError> {
    authorize(&state, &headers, "config:write")?;

    let mut config = state.engine.routing_config().await;
    if let Some(primary) = body.primary_model {
        config.primary_model = primary;
    }
    if let Some(fallbacks) = body.fallback_models {
        config.fallback_models = fallbacks;
    }
    if let Some(threshold) = body.complexity_threshold {
        if !(1..=10).contains(&threshold) {
            return Err(ApiError::BadRequest(
                "complexity_threshold must be between 1 and 10".into(),
            ));
        }
        config.complexity_threshold = threshold;
    }
    if let Some(threshold) = body.token_threshold {
        config.token_threshold = threshold;
    }

    state.engine.update_routing(config.clone()).await;
    Ok(Json(json!({ "config": config, "status": "success" })))
}

async fn system_info(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    authorize(&state, &headers, "config:read")?;
    Ok(Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "environment": if cfg!(debug_assertions) { "development" } else { "production" },
        "models_available": state.engine.available_models(),
        "memory_enabled": state.engine.config().memory.enabled,
        "status": "success",
    })))
}

#[derive(Deserialize)]
struct TokenBody {
    secret: Option<String>,
    scopes: Option<Vec<String>>,
}

async fn create_token(
    State(state): State<ApiState>,
    Json(body): Json<TokenBody>,
) -> Result<Json<Value>, ApiError> {
    let Some(expected) = state.server.auth_secret.as_deref() else {
        return Err(ApiError::BadRequest(
            "authentication is disabled on this server".into(),
        ));
    };
    if body.secret.as_deref() != Some(expected) {
        return Err(ApiError::Unauthorized("invalid secret".into()));
    }

    let scopes = match body.scopes {
        Some(requested) => {
            for scope in &requested {
                if !ALL_SCOPES.contains(&scope.as_str()) {
                    return Err(ApiError::BadRequest(format!("unknown scope: {scope}")));
                }
            }
            requested
        }
        None => ALL_SCOPES.iter().map(|s| s.to_string()).collect(),
    };

    let token = state.auth.generate_token(scopes.clone(), DEFAULT_TTL_SECS);
    Ok(Json(json!({
        "token": token,
        "expires_in": DEFAULT_TTL_SECS,
        "scopes": scopes,
        "status": "success",
    })))
}

/// Server start time, set once at process start.
static START_TIME: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();

/// Returns basic health status, version, and uptime.
async fn health_check() -> Json<Value> {
    let start = START_TIME.get_or_init(std::time::Instant::now);
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": start.elapsed().as_secs(),
    }))
}
