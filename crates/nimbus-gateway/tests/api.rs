//! End-to-end tests for the REST API, driven through `tower::oneshot`
//! against a mock Ollama daemon.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use nimbus_engine::Engine;
use nimbus_gateway::{build_router, ApiState};
use nimbus_types::config::NimbusConfig;

struct TestApi {
    router: Router,
    _dir: tempfile::TempDir,
    _server: MockServer,
}

async fn mock_ollama() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{"name": "mistral:7b-instruct-v0.3"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "mistral:7b-instruct-v0.3",
            "message": {"role": "assistant", "content": "Hi from nimbus"},
            "done": true
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embedding": [0.4, 0.5, 0.6]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "aGVsbG8="
        })))
        .mount(&server)
        .await;
    server
}

async fn test_api(auth_secret: Option<&str>) -> TestApi {
    let server = mock_ollama().await;
    let dir = tempfile::tempdir().unwrap();

    let mut config = NimbusConfig::default();
    config.providers.ollama.base_url = server.uri();
    config.memory.db_path = Some(dir.path().join("nimbus.db"));
    config.tracking.metrics_path = Some(dir.path().join("metrics.json"));
    config.routing.primary_model = "mistral:7b-instruct-v0.3".into();
    config.routing.fallback_models = vec![];
    config.server.auth_secret = auth_secret.map(str::to_string);

    let engine = Arc::new(Engine::new(config).unwrap());
    let state = ApiState::new(engine);
    let router = build_router(state, &[]);
    TestApi {
        router,
        _dir: dir,
        _server: server,
    }
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_open_and_healthy() {
    let api = test_api(None).await;
    let response = api
        .router
        .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn chat_returns_reply_and_session() {
    let api = test_api(None).await;
    let response = api
        .router
        .oneshot(post_json("/api/chat", json!({"message": "Hello"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["response"], "Hi from nimbus");
    assert_eq!(body["status"], "success");
    assert!(body["session_id"].is_string());
}

#[tokio::test]
async fn chat_without_message_is_bad_request() {
    let api = test_api(None).await;
    let response = api
        .router
        .clone()
        .oneshot(post_json("/api/chat", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = api
        .router
        .oneshot(post_json("/api/chat", json!({"message": "   "})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn models_lists_catalog_families() {
    let api = test_api(None).await;
    let response = api
        .router
        .oneshot(Request::get("/api/models").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = body_json(response).await;
    assert!(body["models"]["text"]
        .as_array()
        .unwrap()
        .iter()
        .any(|m| m == "mistral:7b-instruct-v0.3"));
    assert!(!body["models"]["image"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn plugins_are_static_and_enabled() {
    let api = test_api(None).await;
    let response = api
        .router
        .oneshot(Request::get("/api/plugins").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = body_json(response).await;
    let plugins = body["plugins"].as_array().unwrap();
    assert_eq!(plugins.len(), 3);
    assert!(plugins.iter().all(|p| p["enabled"] == true));
}

#[tokio::test]
async fn conversation_crud_over_rest() {
    let api = test_api(None).await;

    let response = api
        .router
        .clone()
        .oneshot(post_json("/api/conversations", json!({"title": "Notes"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    let id = created["conversation"]["conversation_id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = api
        .router
        .clone()
        .oneshot(
            Request::get("/api/conversations?page=1&page_size=10")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let listed = body_json(response).await;
    assert_eq!(listed["conversations"].as_array().unwrap().len(), 1);

    let response = api
        .router
        .clone()
        .oneshot(
            Request::get(format!("/api/conversations/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = api
        .router
        .clone()
        .oneshot(
            Request::delete(format!("/api/conversations/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = api
        .router
        .oneshot(
            Request::get(format!("/api/conversations/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn post_message_runs_full_chat_flow() {
    let api = test_api(None).await;
    let response = api
        .router
        .oneshot(post_json(
            "/api/conversations/session-9/messages",
            json!({"message": "Hello there"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["message"]["content"], "Hi from nimbus");
    assert_eq!(body["model"], "mistral:7b-instruct-v0.3");
}

#[tokio::test]
async fn knowledge_roundtrip() {
    let api = test_api(None).await;
    let response = api
        .router
        .clone()
        .oneshot(post_json(
            "/api/memory/knowledge",
            json!({"text": "Lisbon is the capital of Portugal"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let added = body_json(response).await;
    let id = added["id"].as_str().unwrap();

    let response = api
        .router
        .oneshot(post_json(
            "/api/memory/knowledge/search",
            json!({"query": "capital of Portugal"}),
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["id"], id);
}

#[tokio::test]
async fn episodic_add_and_search() {
    let api = test_api(None).await;
    let response = api
        .router
        .clone()
        .oneshot(post_json(
            "/api/memory/episodic",
            json!({"user_id": "u1", "kind": "preference", "content": "I prefer tea"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = api
        .router
        .oneshot(post_json(
            "/api/memory/episodic/search",
            json!({"user_id": "u1", "query": "tea"}),
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["results"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn episodic_rejects_unknown_kind() {
    let api = test_api(None).await;
    let response = api
        .router
        .oneshot(post_json(
            "/api/memory/episodic",
            json!({"user_id": "u1", "kind": "dream", "content": "flying"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn model_config_partial_update() {
    let api = test_api(None).await;
    let response = api
        .router
        .clone()
        .oneshot(
            Request::put("/api/config/models")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({"complexity_threshold": 9}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["config"]["complexity_threshold"], 9);
    // Untouched fields keep their values.
    assert_eq!(body["config"]["primary_model"], "mistral:7b-instruct-v0.3");

    let response = api
        .router
        .oneshot(
            Request::put("/api/config/models")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({"complexity_threshold": 42}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn system_info_reports_memory_flag() {
    let api = test_api(None).await;
    let response = api
        .router
        .oneshot(
            Request::get("/api/config/system")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["memory_enabled"], true);
    assert!(body["models_available"]["text"].is_array());
}

#[tokio::test]
async fn protected_routes_require_token_when_secret_set() {
    let api = test_api(Some("s3cret")).await;

    let response = api
        .router
        .clone()
        .oneshot(
            Request::get("/api/conversations")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Wrong secret cannot mint a token.
    let response = api
        .router
        .clone()
        .oneshot(post_json("/api/auth/token", json!({"secret": "wrong"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Mint a read-only conversation token.
    let response = api
        .router
        .clone()
        .oneshot(post_json(
            "/api/auth/token",
            json!({"secret": "s3cret", "scopes": ["conversation:read"]}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let token = body["token"].as_str().unwrap().to_string();

    // The scope it has works.
    let response = api
        .router
        .clone()
        .oneshot(
            Request::get("/api/conversations")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // A scope it lacks is forbidden.
    let response = api
        .router
        .clone()
        .oneshot(
            Request::put("/api/config/models")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({"token_threshold": 1000}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Garbage tokens are unauthorized.
    let response = api
        .router
        .oneshot(
            Request::get("/api/conversations")
                .header(header::AUTHORIZATION, "Bearer not-a-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn auth_token_endpoint_disabled_without_secret() {
    let api = test_api(None).await;
    let response = api
        .router
        .oneshot(post_json("/api/auth/token", json!({"secret": "anything"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn generate_image_returns_base64() {
    let api = test_api(None).await;
    let response = api
        .router
        .oneshot(post_json(
            "/api/generate/image",
            json!({"prompt": "a lighthouse at dusk"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["image"], "aGVsbG8=");
    assert_eq!(body["status"], "success");
}
