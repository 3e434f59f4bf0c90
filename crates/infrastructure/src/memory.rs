//! 进程内协作者实现
//!
//! 用于测试和 `memory:` 数据库地址下的本地运行，数据不落盘。

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use domain::{
    ChatId, ContactSource, MembershipSource, MessageId, MessageStore, RepositoryError,
    RepositoryResult, StoredMessage, UserId,
};
use tokio::sync::RwLock;
use uuid::Uuid;

/// 可变的成员关系表，模拟 `chat_participants`
#[derive(Default)]
pub struct InMemoryMembershipSource {
    rows: RwLock<BTreeSet<(ChatId, UserId)>>,
}

impl InMemoryMembershipSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (ChatId, UserId)>,
    {
        Self {
            rows: RwLock::new(rows.into_iter().collect()),
        }
    }

    pub async fn add(&self, chat_id: ChatId, user_id: UserId) -> bool {
        self.rows.write().await.insert((chat_id, user_id))
    }

    pub async fn remove_chat(&self, chat_id: &ChatId) -> usize {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|(chat, _)| chat != chat_id);
        before - rows.len()
    }
}

#[async_trait]
impl MembershipSource for InMemoryMembershipSource {
    async fn bulk_load_chat_participants(&self) -> RepositoryResult<Vec<(ChatId, UserId)>> {
        Ok(self.rows.read().await.iter().cloned().collect())
    }
}

/// 追加式消息存储
#[derive(Default)]
pub struct InMemoryMessageStore {
    messages: RwLock<Vec<StoredMessage>>,
    max_messages: Option<usize>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 超过上限时写入失败，用于模拟存储不可用
    pub fn with_limit(max_messages: usize) -> Self {
        Self {
            messages: RwLock::new(Vec::new()),
            max_messages: Some(max_messages),
        }
    }

    pub async fn messages(&self) -> Vec<StoredMessage> {
        self.messages.read().await.clone()
    }

    pub async fn messages_in(&self, chat_id: &ChatId) -> Vec<StoredMessage> {
        self.messages
            .read()
            .await
            .iter()
            .filter(|message| &message.chat_id == chat_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn persist(
        &self,
        sender_id: &UserId,
        chat_id: &ChatId,
        content: &str,
    ) -> RepositoryResult<StoredMessage> {
        let mut messages = self.messages.write().await;
        if let Some(limit) = self.max_messages {
            if messages.len() >= limit {
                return Err(RepositoryError::storage("message store is full"));
            }
        }

        let stored = StoredMessage {
            id: MessageId::from(Uuid::new_v4()),
            sender_id: sender_id.clone(),
            chat_id: chat_id.clone(),
            content: content.to_string(),
            sent_at: Utc::now(),
        };
        messages.push(stored.clone());
        Ok(stored)
    }
}

/// 双向联系人关系
#[derive(Default)]
pub struct InMemoryContactSource {
    contacts: RwLock<HashMap<UserId, BTreeSet<UserId>>>,
}

impl InMemoryContactSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// 互相添加为联系人
    pub async fn connect(&self, a: &UserId, b: &UserId) {
        if a == b {
            return;
        }
        let mut contacts = self.contacts.write().await;
        contacts.entry(a.clone()).or_default().insert(b.clone());
        contacts.entry(b.clone()).or_default().insert(a.clone());
    }
}

#[async_trait]
impl ContactSource for InMemoryContactSource {
    async fn get_contacts(&self, user_id: &UserId) -> RepositoryResult<Vec<UserId>> {
        Ok(self
            .contacts
            .read()
            .await
            .get(user_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> UserId {
        UserId::from(id)
    }

    fn chat(id: &str) -> ChatId {
        ChatId::from(id)
    }

    #[tokio::test]
    async fn membership_rows_are_deduplicated() {
        let source = InMemoryMembershipSource::with_rows(vec![
            (chat("c1"), user("alice")),
            (chat("c1"), user("alice")),
            (chat("c1"), user("bob")),
        ]);
        assert!(!source.add(chat("c1"), user("bob")).await);
        assert!(source.add(chat("c2"), user("carol")).await);

        let rows = source.bulk_load_chat_participants().await.unwrap();
        assert_eq!(rows.len(), 3);

        assert_eq!(source.remove_chat(&chat("c1")).await, 2);
        let rows = source.bulk_load_chat_participants().await.unwrap();
        assert_eq!(rows, vec![(chat("c2"), user("carol"))]);
    }

    #[tokio::test]
    async fn message_store_assigns_ids_and_keeps_order() {
        let store = InMemoryMessageStore::new();
        let first = store.persist(&user("alice"), &chat("c1"), "one").await.unwrap();
        let second = store.persist(&user("bob"), &chat("c1"), "two").await.unwrap();
        store.persist(&user("bob"), &chat("c2"), "other").await.unwrap();

        assert_ne!(first.id, second.id);
        let in_c1 = store.messages_in(&chat("c1")).await;
        assert_eq!(
            in_c1.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(),
            vec!["one", "two"]
        );
        assert_eq!(store.messages().await.len(), 3);
    }

    #[tokio::test]
    async fn message_store_limit_reports_storage_error() {
        let store = InMemoryMessageStore::with_limit(1);
        store.persist(&user("alice"), &chat("c1"), "one").await.unwrap();
        let err = store.persist(&user("alice"), &chat("c1"), "two").await.unwrap_err();
        assert!(matches!(err, RepositoryError::Storage { .. }));
    }

    #[tokio::test]
    async fn contacts_are_symmetric() {
        let contacts = InMemoryContactSource::new();
        contacts.connect(&user("alice"), &user("bob")).await;
        contacts.connect(&user("alice"), &user("carol")).await;
        contacts.connect(&user("alice"), &user("alice")).await;

        assert_eq!(
            contacts.get_contacts(&user("alice")).await.unwrap(),
            vec![user("bob"), user("carol")]
        );
        assert_eq!(contacts.get_contacts(&user("bob")).await.unwrap(), vec![user("alice")]);
        assert!(contacts.get_contacts(&user("dave")).await.unwrap().is_empty());
    }
}
