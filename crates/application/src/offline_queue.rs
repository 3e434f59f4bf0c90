//! 离线消息队列
//!
//! 每个接收者一个有界 FIFO 队列：
//! - 达到容量上限时拒绝入队（消息对该接收者丢失，记录警告）
//! - 每次入队刷新保留期，过期与是否被读取无关
//! - 分批取出，单条解码失败会被跳过（同样被移除），不会中断整个取出过程

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use domain::{QueuedMessage, Timestamp, UserId};

use crate::clock::Clock;

#[async_trait]
pub trait OfflineQueue: Send + Sync {
    /// 追加到队尾；队列已满或序列化失败时返回 false
    async fn enqueue(&self, user_id: &UserId, message: &QueuedMessage) -> bool;

    /// 按 FIFO 顺序取出并移除该用户的全部消息
    async fn drain(&self, user_id: &UserId) -> Vec<QueuedMessage>;

    async fn has_pending(&self, user_id: &UserId) -> bool;

    /// 把取出后未能送达的消息按原顺序放回队首，返回放回的条数
    ///
    /// 这些消息此前已被接受，放回时不受容量限制，也不会排到期间新入队的消息之后
    async fn requeue_front(&self, user_id: &UserId, messages: &[QueuedMessage]) -> usize;

    /// 回收已过期的队列，返回回收数量；由存储自身负责过期的实现无需处理
    fn purge_expired(&self) -> usize {
        0
    }
}

/// 离线队列参数
#[derive(Debug, Clone, PartialEq)]
pub struct OfflineQueueSettings {
    pub capacity: usize,
    pub ttl: Duration,
    pub drain_batch_size: usize,
}

impl Default for OfflineQueueSettings {
    fn default() -> Self {
        Self::from(&config::RealtimeConfig::default())
    }
}

impl From<&config::RealtimeConfig> for OfflineQueueSettings {
    fn from(value: &config::RealtimeConfig) -> Self {
        Self {
            capacity: value.offline_queue_capacity,
            ttl: value.offline_queue_ttl(),
            drain_batch_size: value.drain_batch_size.max(1),
        }
    }
}

/// 序列化为队列条目；失败时记录警告并返回 None
pub fn encode(message: &QueuedMessage) -> Option<String> {
    match serde_json::to_string(message) {
        Ok(encoded) => Some(encoded),
        Err(err) => {
            tracing::warn!(
                recipient_id = %message.recipient_id,
                message_id = %message.message_id,
                error = %err,
                "failed to serialize offline message"
            );
            None
        }
    }
}

/// 解析队列条目；失败时记录警告并返回 None，调用方跳过该条目
pub fn decode(user_id: &UserId, raw: &str) -> Option<QueuedMessage> {
    match serde_json::from_str(raw) {
        Ok(message) => Some(message),
        Err(err) => {
            tracing::warn!(user_id = %user_id, error = %err, "skipping undecodable offline message");
            None
        }
    }
}

struct UserQueue {
    entries: VecDeque<String>,
    expires_at: Timestamp,
}

impl UserQueue {
    fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at <= now
    }
}

/// 进程内实现，条目以序列化后的形式保存
pub struct MemoryOfflineQueue {
    queues: DashMap<UserId, UserQueue>,
    settings: OfflineQueueSettings,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl MemoryOfflineQueue {
    pub fn new(settings: OfflineQueueSettings, clock: Arc<dyn Clock>) -> Self {
        let ttl = chrono::Duration::from_std(settings.ttl)
            .unwrap_or_else(|_| chrono::Duration::days(365));
        Self {
            queues: DashMap::new(),
            settings,
            ttl,
            clock,
        }
    }

    /// 当前保存的条目数（过期但尚未回收的也计入）
    pub fn len(&self, user_id: &UserId) -> usize {
        self.queues
            .get(user_id)
            .map(|queue| queue.entries.len())
            .unwrap_or(0)
    }

    #[cfg(test)]
    fn push_raw(&self, user_id: &UserId, raw: &str) {
        let expires_at = self.clock.now() + self.ttl;
        let mut queue = self.queues.entry(user_id.clone()).or_insert_with(|| UserQueue {
            entries: VecDeque::new(),
            expires_at,
        });
        queue.entries.push_back(raw.to_string());
        queue.expires_at = expires_at;
    }
}

#[async_trait]
impl OfflineQueue for MemoryOfflineQueue {
    async fn enqueue(&self, user_id: &UserId, message: &QueuedMessage) -> bool {
        if user_id.is_blank() {
            tracing::warn!("rejecting offline message for blank user id");
            return false;
        }
        let Some(encoded) = encode(message) else {
            return false;
        };

        let now = self.clock.now();
        let mut queue = self.queues.entry(user_id.clone()).or_insert_with(|| UserQueue {
            entries: VecDeque::new(),
            expires_at: now + self.ttl,
        });

        if queue.is_expired(now) {
            queue.entries.clear();
        }

        if queue.entries.len() >= self.settings.capacity {
            tracing::warn!(
                user_id = %user_id,
                message_id = %message.message_id,
                capacity = self.settings.capacity,
                "offline queue full, dropping message"
            );
            return false;
        }

        queue.entries.push_back(encoded);
        queue.expires_at = now + self.ttl;
        tracing::debug!(user_id = %user_id, pending = queue.entries.len(), "offline message queued");
        true
    }

    async fn drain(&self, user_id: &UserId) -> Vec<QueuedMessage> {
        let mut drained = Vec::new();

        loop {
            let batch: Vec<String> = {
                let Some(mut queue) = self.queues.get_mut(user_id) else {
                    break;
                };
                if queue.is_expired(self.clock.now()) {
                    queue.entries.clear();
                }
                let take = queue.entries.len().min(self.settings.drain_batch_size);
                queue.entries.drain(..take).collect()
            };

            if batch.is_empty() {
                break;
            }
            drained.extend(batch.iter().filter_map(|raw| decode(user_id, raw)));
        }

        self.queues
            .remove_if(user_id, |_, queue| queue.entries.is_empty());

        if !drained.is_empty() {
            tracing::debug!(user_id = %user_id, count = drained.len(), "offline queue drained");
        }
        drained
    }

    async fn has_pending(&self, user_id: &UserId) -> bool {
        let now = self.clock.now();
        self.queues
            .get(user_id)
            .map(|queue| !queue.entries.is_empty() && !queue.is_expired(now))
            .unwrap_or(false)
    }

    async fn requeue_front(&self, user_id: &UserId, messages: &[QueuedMessage]) -> usize {
        let encoded: Vec<String> = messages.iter().filter_map(encode).collect();
        if encoded.is_empty() {
            return 0;
        }

        let now = self.clock.now();
        let mut queue = self.queues.entry(user_id.clone()).or_insert_with(|| UserQueue {
            entries: VecDeque::new(),
            expires_at: now + self.ttl,
        });
        if queue.is_expired(now) {
            queue.entries.clear();
        }

        for raw in encoded.iter().rev() {
            queue.entries.push_front(raw.clone());
        }
        queue.expires_at = now + self.ttl;
        tracing::debug!(user_id = %user_id, requeued = encoded.len(), "offline messages requeued");
        encoded.len()
    }

    fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.queues.len();
        self.queues.retain(|_, queue| !queue.is_expired(now));
        let purged = before.saturating_sub(self.queues.len());
        if purged > 0 {
            tracing::debug!(purged, "purged expired offline queues");
        }
        purged
    }
}
