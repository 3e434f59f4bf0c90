//! 基础设施层实现。
//!
//! 提供 PostgreSQL/内存协作者、Redis 离线队列和基于通道的传输会话，
//! 实现应用/领域层定义的接口。

pub mod builder;
pub mod memory;
pub mod migrations;
pub mod offline_queue;
pub mod repository;
pub mod session;

pub use builder::{Infrastructure, InfrastructureError};
pub use memory::{InMemoryContactSource, InMemoryMembershipSource, InMemoryMessageStore};
pub use migrations::MIGRATOR;
pub use offline_queue::RedisOfflineQueue;
pub use repository::{create_pg_pool, PgContactSource, PgMembershipSource, PgMessageStore};
pub use session::{ChannelSession, OutboundFrame};
