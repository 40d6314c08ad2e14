//! WebSocket handler for streaming chat.
//!
//! Protocol: the client sends `{"message": "...", "user_id"?: "..."}` and
//! receives `{"type": "start", "message_id"}`, a run of `{"type": "chunk",
//! "content"}` frames, then `{"type": "end", "message_id"}`. A `{"ping":
//! true}` frame answers `{"type": "pong"}`; anything else gets
//! `{"type": "error", "error"}`.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use nimbus_llm::types::StreamChunk;

use crate::ApiState;

/// WebSocket upgrade handler for `/ws/chat/{conversation_id}`.
pub async fn ws_chat_handler(
    ws: WebSocketUpgrade,
    State(state): State<ApiState>,
    Path(conversation_id): Path<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, conversation_id))
}

async fn send_json(socket: &mut WebSocket, frame: serde_json::Value) -> bool {
    socket
        .send(Message::Text(frame.to_string().into()))
        .await
        .is_ok()
}

async fn handle_socket(mut socket: WebSocket, state: ApiState, conversation_id: String) {
    debug!(conversation_id, "websocket chat connected");

    while let Some(Ok(msg)) = socket.recv().await {
        match msg {
            Message::Text(text) => {
                let Ok(frame) = serde_json::from_str::<serde_json::Value>(&text) else {
                    let err = serde_json::json!({
                        "type": "error",
                        "error": "invalid JSON frame",
                    });
                    if !send_json(&mut socket, err).await {
                        return;
                    }
                    continue;
                };

                if frame.get("ping").is_some() {
                    if !send_json(&mut socket, serde_json::json!({"type": "pong"})).await {
                        return;
                    }
                    continue;
                }

                let Some(message) = frame
                    .get("message")
                    .and_then(|v| v.as_str())
                    .filter(|m| !m.trim().is_empty())
                else {
                    let err = serde_json::json!({
                        "type": "error",
                        "error": "message field is required",
                    });
                    if !send_json(&mut socket, err).await {
                        return;
                    }
                    continue;
                };
                let user_id = frame
                    .get("user_id")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);

                if !stream_turn(&mut socket, &state, &conversation_id, message, user_id).await {
                    return;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    debug!(conversation_id, "websocket chat closed");
}

/// Run one streamed chat turn over the socket. Returns false when the
/// socket has gone away.
async fn stream_turn(
    socket: &mut WebSocket,
    state: &ApiState,
    conversation_id: &str,
    message: &str,
    user_id: Option<String>,
) -> bool {
    let message_id = uuid::Uuid::new_v4().to_string();
    let start = serde_json::json!({
        "type": "start",
        "message_id": message_id,
    });
    if !send_json(socket, start).await {
        return false;
    }

    let (tx, mut rx) = mpsc::channel::<StreamChunk>(32);
    let engine = state.engine.clone();
    let conv_id = conversation_id.to_string();
    let msg = message.to_string();
    let msg_id = message_id.clone();
    let turn = tokio::spawn(async move {
        engine
            .chat_stream(Some(&conv_id), user_id.as_deref(), &msg, Some(msg_id), tx)
            .await
    });

    while let Some(chunk) = rx.recv().await {
        if let StreamChunk::TextDelta(content) = chunk {
            let frame = serde_json::json!({ "type": "chunk", "content": content });
            if !send_json(socket, frame).await {
                // Let the turn finish so the reply is still persisted.
                let _ = turn.await;
                return false;
            }
        }
    }

    match turn.await {
        Ok(Ok(_)) => {
            let end = serde_json::json!({ "type": "end", "message_id": message_id });
            send_json(socket, end).await
        }
        Ok(Err(e)) => {
            warn!(error = %e, "streamed chat turn failed");
            let err = serde_json::json!({ "type": "error", "error": e.to_string() });
            send_json(socket, err).await
        }
        Err(e) => {
            warn!(error = %e, "streamed chat task panicked");
            let err = serde_json::json!({ "type": "error", "error": "internal error" });
            send_json(socket, err).await
        }
    }
}
