use std::sync::Arc;

use application::{
    Clock, MemoryOfflineQueue, OfflineQueue, OfflineQueueSettings, RealtimeHubDependencies,
    SystemClock,
};
use config::{AppConfig, OfflineBackend};
use domain::{ContactSource, MembershipSource, MessageStore};
use thiserror::Error;

use crate::{
    memory::{InMemoryContactSource, InMemoryMembershipSource, InMemoryMessageStore},
    migrations::MIGRATOR,
    offline_queue::RedisOfflineQueue,
    repository::{create_pg_pool, PgContactSource, PgMembershipSource, PgMessageStore},
};

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// 按配置装配好的外部协作者
#[derive(Clone)]
pub struct Infrastructure {
    pub membership_source: Arc<dyn MembershipSource>,
    pub message_store: Arc<dyn MessageStore>,
    pub contacts: Arc<dyn ContactSource>,
    pub offline_queue: Arc<dyn OfflineQueue>,
}

impl Infrastructure {
    pub async fn connect(config: &AppConfig) -> Result<Self, InfrastructureError> {
        let (membership_source, message_store, contacts) = if config.database.is_in_memory() {
            tracing::warn!("using in-memory stores, nothing will be persisted");
            (
                Arc::new(InMemoryMembershipSource::new()) as Arc<dyn MembershipSource>,
                Arc::new(InMemoryMessageStore::new()) as Arc<dyn MessageStore>,
                Arc::new(InMemoryContactSource::new()) as Arc<dyn ContactSource>,
            )
        } else {
            let pool =
                create_pg_pool(&config.database.url, config.database.max_connections).await?;
            MIGRATOR.run(&pool).await?;
            tracing::info!(database = %config.sanitized_database_url(), "database ready");
            (
                Arc::new(PgMembershipSource::new(pool.clone())) as Arc<dyn MembershipSource>,
                Arc::new(PgMessageStore::new(pool.clone())) as Arc<dyn MessageStore>,
                Arc::new(PgContactSource::new(pool)) as Arc<dyn ContactSource>,
            )
        };

        let offline_queue = Self::offline_queue(config)?;

        Ok(Self {
            membership_source,
            message_store,
            contacts,
            offline_queue,
        })
    }

    fn offline_queue(config: &AppConfig) -> Result<Arc<dyn OfflineQueue>, InfrastructureError> {
        let settings = OfflineQueueSettings::from(&config.realtime);
        let queue: Arc<dyn OfflineQueue> = match config.realtime.offline_backend {
            OfflineBackend::Memory => {
                let clock: Arc<dyn Clock> = Arc::new(SystemClock);
                Arc::new(MemoryOfflineQueue::new(settings, clock))
            }
            OfflineBackend::Redis => {
                Arc::new(RedisOfflineQueue::open(&config.redis.url, settings)?)
            }
        };
        tracing::info!(backend = ?config.realtime.offline_backend, "offline queue ready");
        Ok(queue)
    }

    pub fn hub_dependencies(&self) -> RealtimeHubDependencies {
        RealtimeHubDependencies {
            message_store: self.message_store.clone(),
            contacts: self.contacts.clone(),
            offline_queue: self.offline_queue.clone(),
        }
    }
}
