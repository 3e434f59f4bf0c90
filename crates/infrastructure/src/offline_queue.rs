//! Redis 离线队列
//!
//! 每个接收者一个 list，键为 `{prefix}{user_id}`：
//! - 入队用 Lua 脚本原子完成容量检查、`RPUSH` 和 `EXPIRE`
//! - 取出用 `LPOP key count` 分批进行，直到列表为空（Redis 在列表清空时自动删除键）
//! - 未送达的消息用 `LPUSH` 放回队首，与 `EXPIRE` 放在同一个事务里
//! - Redis 错误只记录日志，对调用方表现为入队失败或没有消息

use std::sync::Arc;

use application::offline_queue::{decode, encode};
use application::{OfflineQueue, OfflineQueueSettings};
use async_trait::async_trait;
use domain::{QueuedMessage, UserId};

const ENQUEUE_SCRIPT: &str = r#"
local key = KEYS[1]
local entry = ARGV[1]
local capacity = tonumber(ARGV[2])
local ttl = tonumber(ARGV[3])

if redis.call('LLEN', key) >= capacity then
    return 0
end

redis.call('RPUSH', key, entry)
redis.call('EXPIRE', key, ttl)
return 1
"#;

pub struct RedisOfflineQueue {
    redis_client: Arc<redis::Client>,
    settings: OfflineQueueSettings,
    key_prefix: String,
    enqueue_script: redis::Script,
}

impl RedisOfflineQueue {
    pub fn new(redis_client: Arc<redis::Client>, settings: OfflineQueueSettings) -> Self {
        Self {
            redis_client,
            settings,
            key_prefix: "offline:".to_string(),
            enqueue_script: redis::Script::new(ENQUEUE_SCRIPT),
        }
    }

    pub fn open(redis_url: &str, settings: OfflineQueueSettings) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self::new(Arc::new(client), settings))
    }

    /// 测试之间隔离用
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    fn queue_key(&self, user_id: &UserId) -> String {
        format!("{}{}", self.key_prefix, user_id)
    }

    async fn get_connection(&self) -> redis::RedisResult<redis::aio::MultiplexedConnection> {
        self.redis_client.get_multiplexed_async_connection().await
    }

    fn ttl_secs(&self) -> u64 {
        self.settings.ttl.as_secs().max(1)
    }

    async fn pop_batch(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        key: &str,
    ) -> redis::RedisResult<Vec<String>> {
        let batch: Option<Vec<String>> = redis::cmd("LPOP")
            .arg(key)
            .arg(self.settings.drain_batch_size.max(1))
            .query_async(conn)
            .await?;
        Ok(batch.unwrap_or_default())
    }
}

#[async_trait]
impl OfflineQueue for RedisOfflineQueue {
    async fn enqueue(&self, user_id: &UserId, message: &QueuedMessage) -> bool {
        if user_id.is_blank() {
            tracing::warn!("rejecting offline message for blank recipient");
            return false;
        }
        let Some(entry) = encode(message) else {
            return false;
        };

        let mut conn = match self.get_connection().await {
            Ok(conn) => conn,
            Err(err) => {
                tracing::error!(user_id = %user_id, error = %err, "redis connection failed");
                return false;
            }
        };

        let accepted: redis::RedisResult<i64> = self
            .enqueue_script
            .key(self.queue_key(user_id))
            .arg(entry)
            .arg(self.settings.capacity)
            .arg(self.ttl_secs())
            .invoke_async(&mut conn)
            .await;

        match accepted {
            Ok(1) => {
                tracing::debug!(user_id = %user_id, message_id = %message.message_id, "queued offline message");
                true
            }
            Ok(_) => {
                tracing::warn!(
                    user_id = %user_id,
                    capacity = self.settings.capacity,
                    "offline queue full, message dropped"
                );
                false
            }
            Err(err) => {
                tracing::error!(user_id = %user_id, error = %err, "failed to enqueue offline message");
                false
            }
        }
    }

    async fn drain(&self, user_id: &UserId) -> Vec<QueuedMessage> {
        let mut conn = match self.get_connection().await {
            Ok(conn) => conn,
            Err(err) => {
                tracing::error!(user_id = %user_id, error = %err, "redis connection failed");
                return Vec::new();
            }
        };

        let key = self.queue_key(user_id);
        let mut drained = Vec::new();
        loop {
            let batch = match self.pop_batch(&mut conn, &key).await {
                Ok(batch) => batch,
                Err(err) => {
                    tracing::error!(user_id = %user_id, error = %err, "failed to drain offline queue");
                    break;
                }
            };
            if batch.is_empty() {
                break;
            }
            drained.extend(batch.iter().filter_map(|raw| decode(user_id, raw)));
        }

        if !drained.is_empty() {
            tracing::debug!(user_id = %user_id, count = drained.len(), "drained offline queue");
        }
        drained
    }

    async fn has_pending(&self, user_id: &UserId) -> bool {
        let mut conn = match self.get_connection().await {
            Ok(conn) => conn,
            Err(err) => {
                tracing::error!(user_id = %user_id, error = %err, "redis connection failed");
                return false;
            }
        };

        let exists: redis::RedisResult<bool> = redis::cmd("EXISTS")
            .arg(self.queue_key(user_id))
            .query_async(&mut conn)
            .await;
        exists.unwrap_or_else(|err| {
            tracing::error!(user_id = %user_id, error = %err, "failed to check offline queue");
            false
        })
    }

    async fn requeue_front(&self, user_id: &UserId, messages: &[QueuedMessage]) -> usize {
        // LPUSH 逐个压到队首，倒序传入后队首顺序与原顺序一致
        let entries: Vec<String> = messages.iter().rev().filter_map(encode).collect();
        if entries.is_empty() {
            return 0;
        }

        let mut conn = match self.get_connection().await {
            Ok(conn) => conn,
            Err(err) => {
                tracing::error!(user_id = %user_id, error = %err, "redis connection failed");
                return 0;
            }
        };

        let key = self.queue_key(user_id);
        let result: redis::RedisResult<()> = redis::pipe()
            .atomic()
            .cmd("LPUSH")
            .arg(&key)
            .arg(&entries)
            .ignore()
            .cmd("EXPIRE")
            .arg(&key)
            .arg(self.ttl_secs())
            .ignore()
            .query_async(&mut conn)
            .await;

        match result {
            Ok(()) => {
                tracing::debug!(user_id = %user_id, requeued = entries.len(), "requeued offline messages");
                entries.len()
            }
            Err(err) => {
                tracing::error!(user_id = %user_id, error = %err, "failed to requeue offline messages");
                0
            }
        }
    }
}
