//! 聊天成员注册表
//!
//! 权威的内存 chat -> participants 索引：
//! - 启动时从持久化存储批量加载
//! - 之后只通过成员关系领域事件变更，路由器只读
//! - 所有变更操作对非法输入只记录警告，不返回错误（运行在异步事件路径上）

use std::collections::HashSet;

use async_trait::async_trait;
use dashmap::DashMap;
use domain::{ChatId, DomainEvent, UserId};

use crate::event_bus::DomainEventHandler;

#[derive(Debug, Default)]
pub struct MembershipRegistry {
    chats: DashMap<ChatId, HashSet<UserId>>,
}

impl MembershipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 用批量映射行重建注册表，返回加载的聊天数量
    pub fn initialize(&self, mappings: Vec<(ChatId, UserId)>) -> usize {
        self.chats.clear();

        let rows = mappings.len();
        let mut skipped = 0usize;
        for (chat_id, user_id) in mappings {
            if chat_id.is_blank() || user_id.is_blank() {
                skipped += 1;
                continue;
            }
            self.chats.entry(chat_id).or_default().insert(user_id);
        }

        if skipped > 0 {
            tracing::warn!(skipped, "skipped malformed membership rows during bulk load");
        }

        let chats = self.chats.len();
        tracing::info!(rows, chats, "membership registry initialized");
        chats
    }

    /// 创建聊天；已存在时合并成员而不是覆盖
    pub fn on_chat_created(&self, chat_id: &ChatId, member_ids: &[UserId]) {
        if chat_id.is_blank() {
            tracing::warn!("ignoring chat_created with blank chat id");
            return;
        }

        let mut members = self.chats.entry(chat_id.clone()).or_default();
        let before = members.len();
        for member_id in member_ids {
            if member_id.is_blank() {
                tracing::warn!(chat_id = %chat_id, "ignoring blank member id in chat_created");
                continue;
            }
            members.insert(member_id.clone());
        }
        tracing::debug!(
            chat_id = %chat_id,
            added = members.len() - before,
            total = members.len(),
            "chat created"
        );
    }

    pub fn on_chat_deleted(&self, chat_id: &ChatId) {
        if chat_id.is_blank() {
            tracing::warn!("ignoring chat_deleted with blank chat id");
            return;
        }

        if self.chats.remove(chat_id).is_none() {
            tracing::info!(chat_id = %chat_id, "chat_deleted for unknown chat");
        } else {
            tracing::debug!(chat_id = %chat_id, "chat deleted");
        }
    }

    /// 聊天未知时直接创建，覆盖事件乱序到达的情况
    pub fn on_member_added(&self, chat_id: &ChatId, user_id: &UserId) {
        if chat_id.is_blank() || user_id.is_blank() {
            tracing::warn!(chat_id = %chat_id, user_id = %user_id, "ignoring malformed member_added");
            return;
        }

        let mut members = self.chats.entry(chat_id.clone()).or_default();
        if members.insert(user_id.clone()) {
            tracing::debug!(chat_id = %chat_id, user_id = %user_id, "member added");
        }
    }

    pub fn on_member_removed(&self, chat_id: &ChatId, user_id: &UserId) {
        if chat_id.is_blank() || user_id.is_blank() {
            tracing::warn!(chat_id = %chat_id, user_id = %user_id, "ignoring malformed member_removed");
            return;
        }

        match self.chats.get_mut(chat_id) {
            Some(mut members) => {
                if members.remove(user_id) {
                    tracing::debug!(chat_id = %chat_id, user_id = %user_id, "member removed");
                }
            }
            None => {
                tracing::debug!(chat_id = %chat_id, user_id = %user_id, "member_removed for unknown chat");
            }
        }
    }

    /// 成员快照，调用方拿到的是副本
    pub fn participants(&self, chat_id: &ChatId) -> HashSet<UserId> {
        self.chats
            .get(chat_id)
            .map(|members| members.clone())
            .unwrap_or_default()
    }

    pub fn exists(&self, chat_id: &ChatId) -> bool {
        self.chats.contains_key(chat_id)
    }

    pub fn is_participant(&self, chat_id: &ChatId, user_id: &UserId) -> bool {
        self.chats
            .get(chat_id)
            .map(|members| members.contains(user_id))
            .unwrap_or(false)
    }

    pub fn chat_count(&self) -> usize {
        self.chats.len()
    }

    /// 应用单个领域事件
    pub fn apply(&self, event: &DomainEvent) {
        match event {
            DomainEvent::ChatCreated {
                chat_id,
                member_ids,
            } => self.on_chat_created(chat_id, member_ids),
            DomainEvent::ChatDeleted { chat_id } => self.on_chat_deleted(chat_id),
            DomainEvent::MemberAdded { chat_id, user_id } => self.on_member_added(chat_id, user_id),
            DomainEvent::MemberRemoved { chat_id, user_id } => {
                self.on_member_removed(chat_id, user_id)
            }
        }
    }
}

#[async_trait]
impl DomainEventHandler for MembershipRegistry {
    fn name(&self) -> &'static str {
        "membership_registry"
    }

    async fn handle(&self, event: DomainEvent) {
        self.apply(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users(ids: &[&str]) -> Vec<UserId> {
        ids.iter().map(|id| UserId::from(*id)).collect()
    }

    fn set(ids: &[&str]) -> HashSet<UserId> {
        users(ids).into_iter().collect()
    }

    #[test]
    fn initialize_groups_rows_by_chat() {
        let registry = MembershipRegistry::new();
        let loaded = registry.initialize(vec![
            (ChatId::from("c1"), UserId::from("a")),
            (ChatId::from("c1"), UserId::from("b")),
            (ChatId::from("c2"), UserId::from("a")),
            (ChatId::from(" "), UserId::from("x")),
        ]);

        assert_eq!(loaded, 2);
        assert_eq!(registry.participants(&ChatId::from("c1")), set(&["a", "b"]));
        assert_eq!(registry.participants(&ChatId::from("c2")), set(&["a"]));
    }

    #[test]
    fn empty_bulk_load_is_valid() {
        let registry = MembershipRegistry::new();
        assert_eq!(registry.initialize(Vec::new()), 0);
        assert!(!registry.exists(&ChatId::from("c1")));
    }

    #[test]
    fn chat_created_on_empty_registry_matches_members() {
        let registry = MembershipRegistry::new();
        let chat = ChatId::from("c1");
        registry.on_chat_created(&chat, &users(&["a", "b", "c"]));
        assert_eq!(registry.participants(&chat), set(&["a", "b", "c"]));
    }

    #[test]
    fn repeated_chat_created_merges_instead_of_overwriting() {
        let registry = MembershipRegistry::new();
        let chat = ChatId::from("c1");
        registry.on_chat_created(&chat, &users(&["a", "b"]));
        registry.on_chat_created(&chat, &users(&["a", "b"]));
        assert_eq!(registry.chat_count(), 1);
        assert_eq!(registry.participants(&chat), set(&["a", "b"]));

        registry.on_chat_created(&chat, &users(&["c"]));
        assert_eq!(registry.participants(&chat), set(&["a", "b", "c"]));
        assert_eq!(registry.chat_count(), 1);
    }

    #[test]
    fn member_added_creates_unknown_chat() {
        let registry = MembershipRegistry::new();
        let chat = ChatId::from("late");
        registry.on_member_added(&chat, &UserId::from("a"));
        registry.on_member_added(&chat, &UserId::from("a"));
        assert!(registry.exists(&chat));
        assert_eq!(registry.participants(&chat), set(&["a"]));
    }

    #[test]
    fn member_removed_on_unknown_chat_is_noop() {
        let registry = MembershipRegistry::new();
        registry.on_member_removed(&ChatId::from("ghost"), &UserId::from("a"));
        assert!(!registry.exists(&ChatId::from("ghost")));
    }

    #[test]
    fn member_removed_keeps_chat_entry() {
        let registry = MembershipRegistry::new();
        let chat = ChatId::from("c1");
        registry.on_chat_created(&chat, &users(&["a", "b"]));
        registry.on_member_removed(&chat, &UserId::from("a"));
        assert!(!registry.is_participant(&chat, &UserId::from("a")));
        assert!(registry.is_participant(&chat, &UserId::from("b")));
    }

    #[test]
    fn deleting_unknown_chat_is_not_an_error() {
        let registry = MembershipRegistry::new();
        registry.on_chat_deleted(&ChatId::from("ghost"));
        registry.on_chat_created(&ChatId::from("c1"), &users(&["a"]));
        registry.on_chat_deleted(&ChatId::from("c1"));
        assert_eq!(registry.chat_count(), 0);
    }

    #[test]
    fn blank_ids_are_rejected_silently() {
        let registry = MembershipRegistry::new();
        registry.on_chat_created(&ChatId::from(""), &users(&["a"]));
        registry.on_member_added(&ChatId::from("c1"), &UserId::from("  "));
        registry.on_chat_created(&ChatId::from("c2"), &users(&["a", ""]));
        assert_eq!(registry.chat_count(), 1);
        assert_eq!(registry.participants(&ChatId::from("c2")), set(&["a"]));
    }

    #[test]
    fn participants_is_a_snapshot() {
        let registry = MembershipRegistry::new();
        let chat = ChatId::from("c1");
        registry.on_chat_created(&chat, &users(&["a"]));

        let mut snapshot = registry.participants(&chat);
        snapshot.insert(UserId::from("intruder"));
        assert_eq!(registry.participants(&chat), set(&["a"]));
    }

    #[test]
    fn apply_dispatches_every_event_kind() {
        let registry = MembershipRegistry::new();
        let chat = ChatId::from("c1");
        registry.apply(&DomainEvent::ChatCreated {
            chat_id: chat.clone(),
            member_ids: users(&["a"]),
        });
        registry.apply(&DomainEvent::MemberAdded {
            chat_id: chat.clone(),
            user_id: UserId::from("b"),
        });
        registry.apply(&DomainEvent::MemberRemoved {
            chat_id: chat.clone(),
            user_id: UserId::from("a"),
        });
        assert_eq!(registry.participants(&chat), set(&["b"]));

        registry.apply(&DomainEvent::ChatDeleted {
            chat_id: chat.clone(),
        });
        assert!(!registry.exists(&chat));
    }
}
