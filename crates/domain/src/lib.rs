//! 实时消息分发核心的领域模型
//!
//! 包含用户/会话/消息标识、线路信封、成员变更领域事件，
//! 以及核心所依赖的外部协作者接口（成员关系来源、消息存储、联系人来源）。

pub mod errors;
pub mod events;
pub mod message;
pub mod repositories;
pub mod value_objects;

// 重新导出常用类型
pub use errors::*;
pub use events::*;
pub use message::*;
pub use repositories::*;
pub use value_objects::*;
