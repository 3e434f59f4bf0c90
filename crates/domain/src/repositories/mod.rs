//! 外部协作者接口定义
//!
//! 核心只依赖这些窄接口，具体实现（PostgreSQL、内存）位于基础设施层。

pub mod contact_source;
pub mod membership_source;
pub mod message_store;

pub use contact_source::ContactSource;
pub use membership_source::MembershipSource;
pub use message_store::MessageStore;

#[cfg(feature = "testing")]
pub use contact_source::MockContactSource;
#[cfg(feature = "testing")]
pub use membership_source::MockMembershipSource;
#[cfg(feature = "testing")]
pub use message_store::MockMessageStore;

use crate::errors::RepositoryError;

/// 仓储结果类型
pub type RepositoryResult<T> = Result<T, RepositoryError>;
