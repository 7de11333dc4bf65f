//! HTTP API handler

use crate::aggregator::FlushOutcome;
use crate::channels::AdapterStatus;
use crate::conversation::{ConversationId, MessageId};
use crate::gateway::Gateway;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// API handler for HTTP endpoints
pub struct ApiHandler;

impl ApiHandler {
    /// Create the router
    pub fn router(gateway: Arc<Gateway>) -> Router {
        Router::new()
            .route("/", get(root))
            .route("/health", get(health_check))
            .route("/healthz", get(health_check))
            .route("/status", get(get_status))
            .route(
                "/api/v1/conversations/:id",
                get(get_conversation).delete(reset_conversation),
            )
            .route("/api/v1/conversations/:id/flush", post(flush_conversation))
            .route("/api/v1/conversations/:id/remove-last", post(remove_last))
            .route("/api/v1/conversations/:id/unpinned", post(summary_unpinned))
            .layer(TraceLayer::new_for_http())
            .with_state(gateway)
    }
}

async fn root() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Health check response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    bot_status: AdapterStatus,
    bot_running: bool,
}

/// Health check endpoint
async fn health_check(State(gateway): State<Arc<Gateway>>) -> impl IntoResponse {
    let bot_status = gateway.bot_status().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        bot_status,
        bot_running: bot_status == AdapterStatus::Running,
    })
}

/// Get gateway status
async fn get_status(State(gateway): State<Arc<Gateway>>) -> impl IntoResponse {
    Json(gateway.status().await)
}

fn not_found(id: ConversationId) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": format!("Conversation {} not found", id) })),
    )
}

/// Get a conversation snapshot
async fn get_conversation(
    State(gateway): State<Arc<Gateway>>,
    Path(id): Path<ConversationId>,
) -> Response {
    match gateway.store().snapshot(id).await {
        Some(snapshot) => Json(snapshot).into_response(),
        None => not_found(id).into_response(),
    }
}

/// Flush response
#[derive(Debug, Serialize)]
struct FlushResponse {
    flushed: bool,
    merged: usize,
    lines: usize,
}

/// Flush pending entries now
async fn flush_conversation(
    State(gateway): State<Arc<Gateway>>,
    Path(id): Path<ConversationId>,
) -> impl IntoResponse {
    let response = match gateway.engine().on_manual_flush(id).await {
        FlushOutcome::NothingPending => FlushResponse {
            flushed: false,
            merged: 0,
            lines: 0,
        },
        FlushOutcome::Flushed { merged, lines } => FlushResponse {
            flushed: true,
            merged,
            lines,
        },
    };
    Json(response)
}

/// Drop the last summary line
async fn remove_last(
    State(gateway): State<Arc<Gateway>>,
    Path(id): Path<ConversationId>,
) -> impl IntoResponse {
    let removed = gateway.engine().on_remove_last(id).await;
    Json(serde_json::json!({ "removed": removed }))
}

/// Reset a conversation
async fn reset_conversation(
    State(gateway): State<Arc<Gateway>>,
    Path(id): Path<ConversationId>,
) -> impl IntoResponse {
    let cleared = gateway.engine().on_reset(id).await;
    Json(serde_json::json!({ "cleared": cleared }))
}

/// Unpin notification request
#[derive(Debug, Deserialize)]
struct UnpinnedRequest {
    message_id: MessageId,
}

/// Report that a message was unpinned outside the bot
async fn summary_unpinned(
    State(gateway): State<Arc<Gateway>>,
    Path(id): Path<ConversationId>,
    Json(request): Json<UnpinnedRequest>,
) -> impl IntoResponse {
    let cleared = gateway
        .engine()
        .on_external_unpin(id, request.message_id)
        .await;
    Json(serde_json::json!({ "cleared": cleared }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::MemoryTransport;
    use crate::gateway::GatewayBuilder;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn gateway() -> (Arc<Gateway>, Arc<MemoryTransport>) {
        let transport = Arc::new(MemoryTransport::new());
        let gateway = GatewayBuilder::new()
            .transport(transport.clone())
            .build()
            .unwrap();
        (Arc::new(gateway), transport)
    }

    async fn send(
        gateway: &Arc<Gateway>,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = ApiHandler::router(gateway.clone())
            .oneshot(request)
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn add_entry(gateway: &Gateway, transport: &MemoryTransport, chat_id: i64, text: &str) {
        let message_id = transport.post_user_message(chat_id, text);
        gateway
            .dispatch(crate::channels::ChannelEvent::Message(
                crate::channels::InboundMessage::new(chat_id, message_id, text),
            ))
            .await;
    }

    #[tokio::test]
    async fn test_root_and_health() {
        let (gateway, _) = gateway();

        let (status, json) = send(&gateway, "GET", "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");

        for uri in ["/health", "/healthz"] {
            let (status, json) = send(&gateway, "GET", uri, None).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(json["status"], "ok");
            assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
            assert_eq!(json["bot_status"], "stopped");
            assert_eq!(json["bot_running"], false);
        }
    }

    #[tokio::test]
    async fn test_status() {
        let (gateway, _) = gateway();
        gateway.start().await.unwrap();

        let (status, json) = send(&gateway, "GET", "/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["state"], "Running");
        assert_eq!(json["bot_running"], true);
        assert_eq!(json["transport"], "memory");
        assert_eq!(json["conversation_count"], 0);
    }

    #[tokio::test]
    async fn test_unknown_conversation_is_404() {
        let (gateway, _) = gateway();
        let (status, json) = send(&gateway, "GET", "/api/v1/conversations/5", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json["error"].as_str().unwrap().contains('5'));
    }

    #[tokio::test]
    async fn test_flush_and_snapshot() {
        let (gateway, transport) = gateway();
        add_entry(&gateway, &transport, -100, ".08.15 пианино гаммы").await;

        let (_, json) = send(&gateway, "GET", "/api/v1/conversations/-100", None).await;
        assert_eq!(json["phase"], "collecting");
        assert_eq!(json["pending"][0]["timestamp"], "08.15");

        let (status, json) =
            send(&gateway, "POST", "/api/v1/conversations/-100/flush", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["flushed"], true);
        assert_eq!(json["merged"], 1);
        assert_eq!(json["lines"], 1);

        let (_, json) = send(&gateway, "GET", "/api/v1/conversations/-100", None).await;
        assert_eq!(json["phase"], "idle");
        assert_eq!(json["summary"], "08.15 =пианино= (гаммы)");

        let (_, json) = send(&gateway, "POST", "/api/v1/conversations/-100/flush", None).await;
        assert_eq!(json["flushed"], false);
    }

    #[tokio::test]
    async fn test_remove_last_and_reset() {
        let (gateway, transport) = gateway();
        add_entry(&gateway, &transport, 3, ".бег").await;
        send(&gateway, "POST", "/api/v1/conversations/3/flush", None).await;

        let (_, json) = send(&gateway, "POST", "/api/v1/conversations/3/remove-last", None).await;
        assert_eq!(json["removed"], true);
        let (_, json) = send(&gateway, "POST", "/api/v1/conversations/3/remove-last", None).await;
        assert_eq!(json["removed"], false);

        add_entry(&gateway, &transport, 3, ".гитара").await;
        let (_, json) = send(&gateway, "DELETE", "/api/v1/conversations/3", None).await;
        assert_eq!(json["cleared"], true);
        let (_, json) = send(&gateway, "DELETE", "/api/v1/conversations/3", None).await;
        assert_eq!(json["cleared"], false);
    }

    #[tokio::test]
    async fn test_unpinned_notification() {
        let (gateway, transport) = gateway();
        add_entry(&gateway, &transport, 4, ".бег").await;
        send(&gateway, "POST", "/api/v1/conversations/4/flush", None).await;
        let summary_id = transport.pinned(4).unwrap();

        let (_, json) = send(
            &gateway,
            "POST",
            "/api/v1/conversations/4/unpinned",
            Some(serde_json::json!({ "message_id": summary_id + 1 })),
        )
        .await;
        assert_eq!(json["cleared"], false);

        let (_, json) = send(
            &gateway,
            "POST",
            "/api/v1/conversations/4/unpinned",
            Some(serde_json::json!({ "message_id": summary_id })),
        )
        .await;
        assert_eq!(json["cleared"], true);

        let (_, json) = send(&gateway, "GET", "/api/v1/conversations/4", None).await;
        assert_eq!(json["committed"], serde_json::json!([]));
    }
}
