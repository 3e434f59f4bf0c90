//! 聊天成员关系事件
//!
//! 事件一经创建即不可变。写侧在持久化成功后发布，
//! 内存成员注册表据此与持久化的成员关系保持最终一致。

use serde::{Deserialize, Serialize};

use crate::value_objects::{ChatId, UserId};

/// 成员关系领域事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum DomainEvent {
    /// 聊天创建事件
    ChatCreated {
        chat_id: ChatId,
        member_ids: Vec<UserId>,
    },

    /// 聊天删除事件
    ChatDeleted { chat_id: ChatId },

    /// 成员加入事件
    MemberAdded { chat_id: ChatId, user_id: UserId },

    /// 成员移除事件
    MemberRemoved { chat_id: ChatId, user_id: UserId },
}

impl DomainEvent {
    /// 事件所属的聊天
    pub fn chat_id(&self) -> &ChatId {
        match self {
            DomainEvent::ChatCreated { chat_id, .. } => chat_id,
            DomainEvent::ChatDeleted { chat_id } => chat_id,
            DomainEvent::MemberAdded { chat_id, .. } => chat_id,
            DomainEvent::MemberRemoved { chat_id, .. } => chat_id,
        }
    }

    /// 事件类型名称（用于日志）
    pub fn kind(&self) -> &'static str {
        match self {
            DomainEvent::ChatCreated { .. } => "chat_created",
            DomainEvent::ChatDeleted { .. } => "chat_deleted",
            DomainEvent::MemberAdded { .. } => "member_added",
            DomainEvent::MemberRemoved { .. } => "member_removed",
        }
    }
}
