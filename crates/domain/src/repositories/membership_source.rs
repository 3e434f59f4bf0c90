//! 持久化的成员关系来源

use async_trait::async_trait;

use crate::repositories::RepositoryResult;
use crate::value_objects::{ChatId, UserId};

/// 启动时批量加载 (chat, user) 映射行，仅调用一次
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait MembershipSource: Send + Sync {
    async fn bulk_load_chat_participants(&self) -> RepositoryResult<Vec<(ChatId, UserId)>>;
}
