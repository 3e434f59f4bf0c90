//! 传输层抽象
//!
//! 核心只关心会话是否存活、能否发送和关闭；WebSocket 等具体绑定位于外层。

use async_trait::async_trait;
use domain::{Destination, SessionId, UserId};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("session closed: {0}")]
    Closed(String),
    #[error("send failed: {0}")]
    SendFailed(String),
    #[error("user {0} has no live session")]
    NotConnected(UserId),
}

/// 单个已认证用户的传输会话
#[async_trait]
pub trait TransportSession: Send + Sync {
    fn id(&self) -> SessionId;

    fn is_open(&self) -> bool;

    async fn send(&self, destination: Destination, payload: String) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;
}

/// "发送给用户" 原语，由连接注册表实现
#[async_trait]
pub trait UserTransport: Send + Sync {
    async fn send_to_user(
        &self,
        user_id: &UserId,
        destination: Destination,
        payload: String,
    ) -> Result<(), TransportError>;
}
