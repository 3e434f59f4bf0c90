//! 连接注册表
//!
//! 每个用户至多一个活跃会话：
//! - 重复注册时先关闭旧会话再替换
//! - 读取时惰性清理已关闭的会话
//! - 关闭会话的错误只记录日志，不影响注册表操作

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use domain::{Destination, SessionId, UserId};

use crate::transport::{TransportError, TransportSession, UserTransport};

/// 已注册的连接
#[derive(Clone)]
pub struct Connection {
    pub user_id: UserId,
    pub session: Arc<dyn TransportSession>,
    pub connected_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<UserId, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册会话，替换并关闭同一用户的旧会话
    pub async fn register(&self, user_id: &UserId, session: Arc<dyn TransportSession>) -> bool {
        if user_id.is_blank() {
            tracing::warn!("rejecting connection with blank user id");
            return false;
        }
        if !session.is_open() {
            tracing::warn!(user_id = %user_id, session_id = %session.id(), "rejecting closed session");
            return false;
        }

        let session_id = session.id();
        let connection = Connection {
            user_id: user_id.clone(),
            session,
            connected_at: Utc::now(),
        };

        let previous = self.connections.insert(user_id.clone(), connection);
        if let Some(previous) = previous {
            if previous.session.id() != session_id {
                tracing::info!(
                    user_id = %user_id,
                    old_session = %previous.session.id(),
                    new_session = %session_id,
                    "replacing existing session"
                );
                close_quietly(&previous).await;
            }
        }

        tracing::info!(user_id = %user_id, session_id = %session_id, "connection registered");
        true
    }

    /// 移除用户的连接，返回之前是否存在
    pub fn unregister(&self, user_id: &UserId) -> bool {
        let removed = self.connections.remove(user_id).is_some();
        if removed {
            tracing::info!(user_id = %user_id, "connection unregistered");
        }
        removed
    }

    /// 仅当当前登记的正是该会话时才移除，
    /// 避免被替换掉的旧会话在断开时把新会话一起移除
    pub fn unregister_session(&self, user_id: &UserId, session_id: SessionId) -> bool {
        let removed = self
            .connections
            .remove_if(user_id, |_, connection| connection.session.id() == session_id)
            .is_some();
        if removed {
            tracing::info!(user_id = %user_id, session_id = %session_id, "connection unregistered");
        } else {
            tracing::debug!(
                user_id = %user_id,
                session_id = %session_id,
                "session already replaced or removed"
            );
        }
        removed
    }

    /// 获取存活的会话；已关闭的会话会被顺带清理
    pub fn get(&self, user_id: &UserId) -> Option<Arc<dyn TransportSession>> {
        let session = self
            .connections
            .get(user_id)
            .map(|connection| connection.session.clone())?;

        if session.is_open() {
            return Some(session);
        }

        let session_id = session.id();
        if self
            .connections
            .remove_if(user_id, |_, connection| connection.session.id() == session_id)
            .is_some()
        {
            tracing::debug!(user_id = %user_id, session_id = %session_id, "evicted stale session");
        }
        None
    }

    pub fn is_online(&self, user_id: &UserId) -> bool {
        self.get(user_id).is_some()
    }

    /// 清理全部失效会话后返回在线用户快照
    pub fn all_online_users(&self) -> HashSet<UserId> {
        self.evict_closed();
        self.connections
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// 主动清理已关闭的会话，返回被清理的用户
    pub fn evict_closed(&self) -> Vec<UserId> {
        let mut evicted = Vec::new();
        self.connections.retain(|user_id, connection| {
            let open = connection.session.is_open();
            if !open {
                evicted.push(user_id.clone());
            }
            open
        });

        if !evicted.is_empty() {
            tracing::debug!(count = evicted.len(), "evicted stale sessions");
        }
        evicted
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// 逐个移除并关闭会话（停机时调用）
    ///
    /// 只移除快照中的会话；期间新注册的会话保留在表中，不会被丢弃而不关闭
    pub async fn close_all(&self) {
        let snapshot: Vec<(UserId, SessionId)> = self
            .connections
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().session.id()))
            .collect();

        let mut closed = 0usize;
        for (user_id, session_id) in snapshot {
            let removed = self
                .connections
                .remove_if(&user_id, |_, connection| connection.session.id() == session_id);
            if let Some((_, connection)) = removed {
                close_quietly(&connection).await;
                closed += 1;
            }
        }

        tracing::info!(count = closed, "all connections closed");
    }
}

async fn close_quietly(connection: &Connection) {
    if let Err(err) = connection.session.close().await {
        tracing::warn!(
            user_id = %connection.user_id,
            session_id = %connection.session.id(),
            error = %err,
            "failed to close session"
        );
    }
}

#[async_trait]
impl UserTransport for ConnectionRegistry {
    async fn send_to_user(
        &self,
        user_id: &UserId,
        destination: Destination,
        payload: String,
    ) -> Result<(), TransportError> {
        let session = self
            .get(user_id)
            .ok_or_else(|| TransportError::NotConnected(user_id.clone()))?;
        session.send(destination, payload).await
    }
}
