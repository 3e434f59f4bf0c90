use domain::{ChatId, DomainError, RepositoryError, UserId};
use thiserror::Error;

use crate::event_bus::EventBusError;

/// 应用层错误类型
///
/// 只有同步入口（消息路由、启动加载、事件发布）会返回该错误；
/// 异步事件处理与状态通知只记录日志。
#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("chat not found: {0}")]
    ChatNotFound(ChatId),
    #[error("user {user_id} is not a participant of chat {chat_id}")]
    NotParticipant { chat_id: ChatId, user_id: UserId },
    #[error("persistence failed: {0}")]
    Persistence(RepositoryError),
    #[error("event bus error: {0}")]
    EventBus(#[from] EventBusError),
}

impl ApplicationError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApplicationError::Validation(message.into())
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        ApplicationError::Persistence(value)
    }
}

/// 应用层结果类型
pub type ApplicationResult<T> = Result<T, ApplicationError>;
