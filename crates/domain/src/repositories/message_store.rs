//! 消息存储（只追加）

use async_trait::async_trait;

use crate::message::StoredMessage;
use crate::repositories::RepositoryResult;
use crate::value_objects::{ChatId, UserId};

#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// 持久化一条消息并返回带有ID和时间戳的存储结果
    async fn persist(
        &self,
        sender_id: &UserId,
        chat_id: &ChatId,
        content: &str,
    ) -> RepositoryResult<StoredMessage>;
}
