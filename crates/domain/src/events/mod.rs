//! 领域事件定义
//!
//! 成员关系变更事件，由写侧的聊天服务发布，供内存成员注册表消费。

pub mod chat_event;

// 重新导出事件类型
pub use chat_event::*;
