//! WebSocket 绑定
//!
//! 每个连接对应一个 `ChannelSession`：写任务把出站帧写入套接字，
//! 读循环把文本帧解析为 `ChatEnvelope` 交给路由。

use std::sync::Arc;

use application::{RealtimeHub, TransportSession};
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use domain::{ChatEnvelope, UserId};
use futures_util::{SinkExt, StreamExt};
use infrastructure::{ChannelSession, OutboundFrame};

use crate::{auth::AuthenticatedUser, state::AppState};

pub(crate) async fn websocket_upgrade(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| websocket_handler(socket, state.hub, user_id))
}

async fn websocket_handler(socket: WebSocket, hub: Arc<RealtimeHub>, user_id: UserId) {
    let (session, mut outbound) = ChannelSession::new();
    let session_id = session.id();
    let (mut sender, mut incoming) = socket.split();

    if hub.connect(&user_id, session.clone()).await.is_none() {
        tracing::warn!(user_id = %user_id, "websocket session rejected");
        let _ = sender.send(WsMessage::Close(None)).await;
        return;
    }
    tracing::info!(user_id = %user_id, session_id = %session_id, "websocket connected");

    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            match frame.to_text() {
                Some(text) => {
                    if sender.send(WsMessage::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                None if frame == OutboundFrame::Close => {
                    let _ = sender.send(WsMessage::Close(None)).await;
                    break;
                }
                None => tracing::warn!("dropping unencodable outbound frame"),
            }
        }
    });

    loop {
        tokio::select! {
            _ = &mut send_task => break,
            message = incoming.next() => match message {
                Some(Ok(WsMessage::Text(text))) => handle_inbound(&hub, &user_id, text.as_str()).await,
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Err(err)) => {
                    tracing::debug!(user_id = %user_id, error = %err, "websocket read failed");
                    break;
                }
                Some(Ok(_)) => {}
            }
        }
    }

    session.mark_closed();
    send_task.abort();
    hub.disconnect(&user_id, session_id).await;
    tracing::info!(user_id = %user_id, session_id = %session_id, "websocket disconnected");
}

async fn handle_inbound(hub: &RealtimeHub, user_id: &UserId, text: &str) {
    let mut envelope: ChatEnvelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(err) => {
            tracing::warn!(user_id = %user_id, error = %err, "ignoring malformed inbound frame");
            return;
        }
    };
    envelope.sender_id = user_id.to_string();

    match hub.handle_message(envelope).await {
        Ok(receipt) => tracing::debug!(
            user_id = %user_id,
            message_id = %receipt.message.id,
            live = receipt.live_recipients.len(),
            offline = receipt.offline_recipients.len(),
            "message routed"
        ),
        Err(err) => tracing::warn!(user_id = %user_id, error = %err, "message rejected"),
    }
}
