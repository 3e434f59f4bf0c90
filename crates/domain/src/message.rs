//! 消息与线路信封
//!
//! 入站信封来自客户端，`recipientId` 仅供参考，实际扇出对象由服务端根据成员关系计算。
//! 出站信封（直接推送与离线缓冲共用）总是携带确定的接收者。

use serde::{Deserialize, Serialize};

use crate::value_objects::{ChatId, MessageId, Timestamp, UserId};

/// 客户端发送的消息信封
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEnvelope {
    pub sender_id: String,
    pub chat_id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<String>,
}

/// 消息存储返回的已持久化消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: MessageId,
    pub sender_id: UserId,
    pub chat_id: ChatId,
    pub content: String,
    pub sent_at: Timestamp,
}

/// 发往单个接收者的消息信封，直接推送和离线队列使用同一格式
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedMessage {
    pub message_id: MessageId,
    pub sender_id: UserId,
    pub chat_id: ChatId,
    pub recipient_id: UserId,
    pub content: String,
    pub sent_at: Timestamp,
}

impl QueuedMessage {
    pub fn for_recipient(message: &StoredMessage, recipient_id: UserId) -> Self {
        Self {
            message_id: message.id,
            sender_id: message.sender_id.clone(),
            chat_id: message.chat_id.clone(),
            recipient_id,
            content: message.content.clone(),
            sent_at: message.sent_at,
        }
    }
}

/// 在线状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PresenceStatus {
    Online,
    Offline,
}

/// 在线状态变更通知
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEnvelope {
    pub status: PresenceStatus,
    pub sender_id: UserId,
}

/// 用户私有队列（逻辑目的地）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    Messages,
    Presence,
}

impl Destination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Destination::Messages => "/queue/messages",
            Destination::Presence => "/queue/presence",
        }
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
