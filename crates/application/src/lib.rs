//! 应用层实现。
//!
//! 实时消息分发与在线状态子系统：成员注册表、连接注册表、在线状态、
//! 消息路由、离线队列，以及把它们串起来的事件总线和生命周期管理。

pub mod clock;
pub mod connection;
pub mod error;
pub mod event_bus;
pub mod hub;
pub mod membership;
pub mod offline_queue;
pub mod presence;
pub mod router;
pub mod transport;

pub use clock::{Clock, SystemClock};
pub use connection::{Connection, ConnectionRegistry};
pub use error::{ApplicationError, ApplicationResult};
pub use event_bus::{DomainEventHandler, EventBus, EventBusError};
pub use hub::{RealtimeHub, RealtimeHubDependencies, SweepReport};
pub use membership::MembershipRegistry;
pub use offline_queue::{MemoryOfflineQueue, OfflineQueue, OfflineQueueSettings};
pub use presence::PresenceTracker;
pub use router::{DeliveryOutcome, MessageRouter, MessageRouterDependencies, RouteReceipt};
pub use transport::{TransportError, TransportSession, UserTransport};
