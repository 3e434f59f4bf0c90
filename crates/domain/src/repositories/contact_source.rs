//! 联系人来源，用于在线状态通知的扇出

use async_trait::async_trait;

use crate::repositories::RepositoryResult;
use crate::value_objects::UserId;

#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait ContactSource: Send + Sync {
    async fn get_contacts(&self, user_id: &UserId) -> RepositoryResult<Vec<UserId>>;
}
