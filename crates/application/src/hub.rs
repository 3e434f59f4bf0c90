//! 实时分发核心的生命周期
//!
//! 显式构造、显式启动、显式停机，取代进程级的全局静态状态：
//! - `start`：批量加载成员关系，并把成员注册表订阅到事件总线
//! - `connect` / `disconnect`：连接注册表与在线状态在同一转换中更新
//! - `shutdown`：关闭所有会话、清空在线状态、停止事件总线

use std::sync::Arc;
use std::time::Duration;

use domain::{
    ChatEnvelope, ContactSource, DomainEvent, MembershipSource, MessageStore, PresenceStatus,
    SessionId, UserId,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::connection::ConnectionRegistry;
use crate::error::ApplicationResult;
use crate::event_bus::EventBus;
use crate::membership::MembershipRegistry;
use crate::offline_queue::OfflineQueue;
use crate::presence::PresenceTracker;
use crate::router::{MessageRouter, MessageRouterDependencies, RouteReceipt};
use crate::transport::TransportSession;

pub struct RealtimeHubDependencies {
    pub message_store: Arc<dyn MessageStore>,
    pub contacts: Arc<dyn ContactSource>,
    pub offline_queue: Arc<dyn OfflineQueue>,
}

/// 一次存活巡检的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// 已没有连接、被标记离线的用户
    pub went_offline: Vec<UserId>,
    /// 有连接但在线状态缺失、被恢复为在线的用户
    pub restored: Vec<UserId>,
    /// 回收的过期离线队列数
    pub purged_queues: usize,
}

pub struct RealtimeHub {
    event_bus: Arc<EventBus>,
    membership: Arc<MembershipRegistry>,
    connections: Arc<ConnectionRegistry>,
    presence: Arc<PresenceTracker>,
    offline_queue: Arc<dyn OfflineQueue>,
    router: Arc<MessageRouter>,
}

impl RealtimeHub {
    pub fn new(deps: RealtimeHubDependencies, settings: &config::RealtimeConfig) -> Self {
        let event_bus = Arc::new(EventBus::new());
        let membership = Arc::new(MembershipRegistry::new());
        let connections = Arc::new(ConnectionRegistry::new());
        let presence = Arc::new(PresenceTracker::new());

        let router = Arc::new(MessageRouter::new(
            MessageRouterDependencies {
                membership: membership.clone(),
                presence: presence.clone(),
                transport: connections.clone(),
                offline_queue: deps.offline_queue.clone(),
                message_store: deps.message_store,
                contacts: deps.contacts,
            },
            settings.max_content_length,
        ));

        Self {
            event_bus,
            membership,
            connections,
            presence,
            offline_queue: deps.offline_queue,
            router,
        }
    }

    /// 启动：重建成员注册表并订阅成员关系事件，返回加载的聊天数量
    pub async fn start(&self, source: &dyn MembershipSource) -> ApplicationResult<usize> {
        let mappings = source.bulk_load_chat_participants().await?;
        let chats = self.membership.initialize(mappings);
        self.event_bus.subscribe(self.membership.clone()).await?;
        tracing::info!(chats, "realtime hub started");
        Ok(chats)
    }

    /// 用户连接：注册会话、标记在线、通知联系人，并在后台推送积压的离线消息
    ///
    /// 会话被拒绝时返回 `None`；否则返回离线消息推送任务的句柄。
    pub async fn connect(
        &self,
        user_id: &UserId,
        session: Arc<dyn TransportSession>,
    ) -> Option<JoinHandle<usize>> {
        if !self.connections.register(user_id, session).await {
            return None;
        }
        if self.presence.set_online(user_id) {
            self.router.notify_presence(user_id, PresenceStatus::Online);
        }

        let router = self.router.clone();
        let user_id = user_id.clone();
        Some(tokio::spawn(async move {
            router.deliver_pending(&user_id).await
        }))
    }

    /// 用户断开：只有当前登记的正是该会话时才会标记离线
    ///
    /// 新会话可能在移除旧会话之后随时注册，所以标记离线前后都要确认用户确实没有连接。
    pub async fn disconnect(&self, user_id: &UserId, session_id: SessionId) -> bool {
        if !self.connections.unregister_session(user_id, session_id) {
            return false;
        }
        if self.connections.is_online(user_id) {
            tracing::debug!(user_id = %user_id, "successor session already registered");
            return true;
        }
        if !self.presence.set_offline(user_id) {
            return true;
        }
        if self.connections.is_online(user_id) {
            self.presence.set_online(user_id);
            tracing::debug!(user_id = %user_id, "successor registered during disconnect, presence restored");
            return true;
        }
        self.router.notify_presence(user_id, PresenceStatus::Offline);
        true
    }

    pub async fn handle_message(&self, envelope: ChatEnvelope) -> ApplicationResult<RouteReceipt> {
        self.router.handle_message(envelope).await
    }

    /// 写侧发布成员关系事件
    pub async fn publish(&self, event: DomainEvent) -> ApplicationResult<()> {
        self.event_bus.publish(event).await?;
        Ok(())
    }

    /// 存活巡检，让在线状态与连接注册表重新一致，并回收过期的离线队列
    ///
    /// - 有在线状态但没有连接：标记离线并通知联系人
    /// - 有连接但没有在线状态：恢复在线、通知联系人并补推离线消息
    pub fn sweep(&self) -> SweepReport {
        let connected = self.connections.all_online_users();

        let mut report = SweepReport::default();
        for user_id in self.presence.online_users() {
            if connected.contains(&user_id) || self.connections.is_online(&user_id) {
                continue;
            }
            if self.presence.set_offline(&user_id) {
                self.router.notify_presence(&user_id, PresenceStatus::Offline);
                report.went_offline.push(user_id);
            }
        }

        for user_id in connected {
            if self.presence.is_online(&user_id) || !self.connections.is_online(&user_id) {
                continue;
            }
            if self.presence.set_online(&user_id) {
                self.router.notify_presence(&user_id, PresenceStatus::Online);
                let router = self.router.clone();
                let pending_for = user_id.clone();
                tokio::spawn(async move { router.deliver_pending(&pending_for).await });
                report.restored.push(user_id);
            }
        }
        report.went_offline.sort();
        report.restored.sort();

        report.purged_queues = self.offline_queue.purge_expired();

        if !report.went_offline.is_empty() || !report.restored.is_empty() {
            tracing::info!(
                offline = report.went_offline.len(),
                restored = report.restored.len(),
                "liveness sweep reconciled presence"
            );
        }
        if report.purged_queues > 0 {
            tracing::info!(purged = report.purged_queues, "liveness sweep purged expired offline queues");
        }
        report
    }

    /// 周期性存活巡检，直到 `shutdown` 被取消
    pub fn spawn_liveness_sweep(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let hub = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        hub.sweep();
                    }
                }
            }
            tracing::debug!("liveness sweep stopped");
        })
    }

    pub async fn shutdown(&self) {
        self.connections.close_all().await;
        self.presence.clear();
        self.event_bus.shutdown().await;
        tracing::info!("realtime hub stopped");
    }

    pub fn membership(&self) -> &Arc<MembershipRegistry> {
        &self.membership
    }

    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.connections
    }

    pub fn presence(&self) -> &Arc<PresenceTracker> {
        &self.presence
    }

    pub fn router(&self) -> &Arc<MessageRouter> {
        &self.router
    }
}
