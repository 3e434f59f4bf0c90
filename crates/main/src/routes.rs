use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use domain::{ChatEnvelope, DomainEvent, MessageId, UserId};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::{
    auth::{AuthenticatedUser, InternalService},
    error::ApiError,
    state::AppState,
    ws,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::websocket_upgrade))
        .route("/messages", post(send_message))
        .route("/events", post(publish_event))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    online_users: usize,
    chats: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        online_users: state.hub.presence().online_count(),
        chats: state.hub.membership().chat_count(),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RouteResponse {
    message_id: MessageId,
    live_recipients: Vec<UserId>,
    offline_recipients: Vec<UserId>,
}

/// 与 WebSocket 入站消息同一路径，发送者以认证身份为准
async fn send_message(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(mut envelope): Json<ChatEnvelope>,
) -> Result<(StatusCode, Json<RouteResponse>), ApiError> {
    envelope.sender_id = user_id.to_string();
    let receipt = state.hub.handle_message(envelope).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(RouteResponse {
            message_id: receipt.message.id,
            live_recipients: receipt.live_recipients,
            offline_recipients: receipt.offline_recipients,
        }),
    ))
}

/// 写侧服务在成员关系持久化后调用，需要内部凭据
async fn publish_event(
    State(state): State<AppState>,
    _service: InternalService,
    Json(event): Json<DomainEvent>,
) -> Result<StatusCode, ApiError> {
    if event.chat_id().is_blank() {
        return Err(ApiError::bad_request("chatId must not be blank"));
    }
    tracing::debug!(kind = event.kind(), chat_id = %event.chat_id(), "publishing membership event");
    state.hub.publish(event).await?;
    Ok(StatusCode::ACCEPTED)
}
