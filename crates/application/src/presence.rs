use std::collections::HashSet;

use dashmap::DashSet;
use domain::UserId;

/// 在线状态跟踪器
///
/// 只记录 userId 是否在线，不持有会话句柄；
/// 与连接注册表在同一次连接/断开转换中一起更新。
#[derive(Debug, Default)]
pub struct PresenceTracker {
    online: DashSet<UserId>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 返回状态是否发生了变化
    pub fn set_online(&self, user_id: &UserId) -> bool {
        if user_id.is_blank() {
            tracing::warn!("ignoring set_online with blank user id");
            return false;
        }
        self.online.insert(user_id.clone())
    }

    /// 返回状态是否发生了变化
    pub fn set_offline(&self, user_id: &UserId) -> bool {
        self.online.remove(user_id).is_some()
    }

    pub fn is_online(&self, user_id: &UserId) -> bool {
        self.online.contains(user_id)
    }

    pub fn online_users(&self) -> HashSet<UserId> {
        self.online.iter().map(|user| user.key().clone()).collect()
    }

    pub fn online_count(&self) -> usize {
        self.online.len()
    }

    pub fn clear(&self) {
        self.online.clear();
    }
}
