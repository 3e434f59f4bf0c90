//! 消息路由器
//!
//! 入站消息的处理流程：
//! 1. 校验标识与内容，发送者必须是聊天的当前成员
//! 2. 通过消息存储持久化，失败时直接返回错误，不做任何投递
//! 3. 接收者 = 成员快照 - 发送者
//! 4. 在线接收者直接推送，离线接收者进入离线队列；每个接收者在独立任务中处理，互不影响
//!
//! 投递策略：只缓冲，不向离线用户推送。在线推送失败时回退到离线队列，
//! 只有离线队列已满时消息才会对该接收者丢失。
//!
//! 入队成功后若接收者已经上线，会立即补推一次，避免消息滞留到下次重连。
//! 同一用户同一时刻只有一个补推循环，保证推送顺序与队列顺序一致。

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use domain::{
    ChatEnvelope, ChatId, ContactSource, Destination, MessageStore, PresenceEnvelope,
    PresenceStatus, QueuedMessage, StoredMessage, UserId,
};
use futures::future::join_all;
use tokio::task::JoinHandle;

use crate::error::{ApplicationError, ApplicationResult};
use crate::membership::MembershipRegistry;
use crate::offline_queue::OfflineQueue;
use crate::presence::PresenceTracker;
use crate::transport::UserTransport;

pub struct MessageRouterDependencies {
    pub membership: Arc<MembershipRegistry>,
    pub presence: Arc<PresenceTracker>,
    pub transport: Arc<dyn UserTransport>,
    pub offline_queue: Arc<dyn OfflineQueue>,
    pub message_store: Arc<dyn MessageStore>,
    pub contacts: Arc<dyn ContactSource>,
}

/// 单个接收者的投递结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// 已直接推送
    Delivered(UserId),
    /// 已进入离线队列
    Queued(UserId),
    /// 离线队列拒绝，消息对该接收者丢失
    Dropped(UserId),
}

impl DeliveryOutcome {
    pub fn recipient(&self) -> &UserId {
        match self {
            DeliveryOutcome::Delivered(user_id)
            | DeliveryOutcome::Queued(user_id)
            | DeliveryOutcome::Dropped(user_id) => user_id,
        }
    }
}

/// 路由回执
///
/// 消息已持久化，各接收者的投递在后台进行；
/// 调用方可以直接丢弃回执，也可以等待所有投递结束。
#[derive(Debug)]
pub struct RouteReceipt {
    pub message: StoredMessage,
    pub live_recipients: Vec<UserId>,
    pub offline_recipients: Vec<UserId>,
    deliveries: Vec<JoinHandle<DeliveryOutcome>>,
}

impl RouteReceipt {
    pub async fn wait(self) -> Vec<DeliveryOutcome> {
        join_all(self.deliveries)
            .await
            .into_iter()
            .filter_map(|result| match result {
                Ok(outcome) => Some(outcome),
                Err(err) => {
                    tracing::error!(error = %err, "delivery task failed");
                    None
                }
            })
            .collect()
    }
}

pub struct MessageRouter {
    deps: MessageRouterDependencies,
    dispatcher: Dispatcher,
    max_content_length: usize,
}

impl MessageRouter {
    pub fn new(deps: MessageRouterDependencies, max_content_length: usize) -> Self {
        let dispatcher = Dispatcher {
            presence: deps.presence.clone(),
            transport: deps.transport.clone(),
            queue: deps.offline_queue.clone(),
            draining: Arc::new(DashMap::new()),
        };
        Self {
            deps,
            dispatcher,
            max_content_length,
        }
    }

    /// 处理一条入站消息
    ///
    /// 只有持久化会阻塞调用方，投递与离线入队都在后台任务中完成。
    pub async fn handle_message(&self, envelope: ChatEnvelope) -> ApplicationResult<RouteReceipt> {
        let sender_id = UserId::parse(envelope.sender_id)?;
        let chat_id = ChatId::parse(envelope.chat_id)?;
        self.validate_content(&envelope.content)?;

        if !self.deps.membership.exists(&chat_id) {
            tracing::warn!(chat_id = %chat_id, sender_id = %sender_id, "message for unknown chat");
            return Err(ApplicationError::ChatNotFound(chat_id));
        }
        if !self.deps.membership.is_participant(&chat_id, &sender_id) {
            tracing::warn!(chat_id = %chat_id, sender_id = %sender_id, "sender is not a participant");
            return Err(ApplicationError::NotParticipant {
                chat_id,
                user_id: sender_id,
            });
        }

        let stored = self
            .deps
            .message_store
            .persist(&sender_id, &chat_id, &envelope.content)
            .await
            .map_err(|err| {
                tracing::error!(
                    chat_id = %chat_id,
                    sender_id = %sender_id,
                    error = %err,
                    "failed to persist message, aborting fan-out"
                );
                ApplicationError::Persistence(err)
            })?;

        let mut recipients: Vec<UserId> = self
            .deps
            .membership
            .participants(&chat_id)
            .into_iter()
            .filter(|user_id| user_id != &sender_id)
            .collect();
        recipients.sort();

        let mut live_recipients = Vec::new();
        let mut offline_recipients = Vec::new();
        let mut deliveries = Vec::with_capacity(recipients.len());

        for recipient in recipients {
            let queued = QueuedMessage::for_recipient(&stored, recipient.clone());
            let dispatcher = self.dispatcher.clone();

            if self.deps.presence.is_online(&recipient) {
                live_recipients.push(recipient);
                deliveries.push(tokio::spawn(async move { dispatcher.deliver_live(queued).await }));
            } else {
                offline_recipients.push(recipient);
                deliveries.push(tokio::spawn(async move { dispatcher.enqueue_offline(queued).await }));
            }
        }

        tracing::debug!(
            message_id = %stored.id,
            chat_id = %chat_id,
            live = live_recipients.len(),
            offline = offline_recipients.len(),
            "message routed"
        );

        Ok(RouteReceipt {
            message: stored,
            live_recipients,
            offline_recipients,
            deliveries,
        })
    }

    fn validate_content(&self, content: &str) -> ApplicationResult<()> {
        if content.trim().is_empty() {
            return Err(ApplicationError::validation("message content cannot be empty"));
        }
        let length = content.chars().count();
        if length > self.max_content_length {
            return Err(ApplicationError::validation(format!(
                "message content too long: {length} > {}",
                self.max_content_length
            )));
        }
        Ok(())
    }

    /// 向在线联系人广播某用户的在线状态变更，返回成功通知的联系人数
    pub fn notify_presence(&self, user_id: &UserId, status: PresenceStatus) -> JoinHandle<usize> {
        let user_id = user_id.clone();
        let contacts = self.deps.contacts.clone();
        let presence = self.deps.presence.clone();
        let transport = self.deps.transport.clone();

        tokio::spawn(async move {
            let contact_ids = match contacts.get_contacts(&user_id).await {
                Ok(contact_ids) => contact_ids,
                Err(err) => {
                    tracing::warn!(user_id = %user_id, error = %err, "failed to load contacts");
                    return 0;
                }
            };

            let envelope = PresenceEnvelope {
                status,
                sender_id: user_id.clone(),
            };
            let payload = match serde_json::to_string(&envelope) {
                Ok(payload) => payload,
                Err(err) => {
                    tracing::warn!(user_id = %user_id, error = %err, "failed to encode presence");
                    return 0;
                }
            };

            let mut notified = 0;
            for contact_id in contact_ids {
                if contact_id == user_id || !presence.is_online(&contact_id) {
                    continue;
                }
                match transport
                    .send_to_user(&contact_id, Destination::Presence, payload.clone())
                    .await
                {
                    Ok(()) => notified += 1,
                    Err(err) => tracing::warn!(
                        user_id = %user_id,
                        contact_id = %contact_id,
                        error = %err,
                        "failed to notify contact"
                    ),
                }
            }

            tracing::debug!(user_id = %user_id, ?status, notified, "presence change broadcast");
            notified
        })
    }

    /// 把用户离线期间积压的消息推送出去，返回成功推送的条数
    ///
    /// 推送中途失败时，未送达的消息按原顺序放回队首。
    pub async fn deliver_pending(&self, user_id: &UserId) -> usize {
        self.dispatcher.deliver_pending(user_id).await
    }
}

/// 单个接收者的投递执行者，可在后台任务间克隆
#[derive(Clone)]
struct Dispatcher {
    presence: Arc<PresenceTracker>,
    transport: Arc<dyn UserTransport>,
    queue: Arc<dyn OfflineQueue>,
    /// 正在补推离线消息的用户；值表示补推期间是否有人请求再来一轮
    draining: Arc<DashMap<UserId, bool>>,
}

impl Dispatcher {
    async fn deliver_live(&self, message: QueuedMessage) -> DeliveryOutcome {
        let recipient = message.recipient_id.clone();
        match serde_json::to_string(&message) {
            Ok(payload) => match self
                .transport
                .send_to_user(&recipient, Destination::Messages, payload)
                .await
            {
                Ok(()) => return DeliveryOutcome::Delivered(recipient),
                Err(err) => tracing::warn!(
                    recipient_id = %recipient,
                    message_id = %message.message_id,
                    error = %err,
                    "live delivery failed, falling back to offline queue"
                ),
            },
            Err(err) => tracing::warn!(
                recipient_id = %recipient,
                error = %err,
                "failed to encode message for live delivery"
            ),
        }
        self.enqueue_offline(message).await
    }

    async fn enqueue_offline(&self, message: QueuedMessage) -> DeliveryOutcome {
        let recipient = message.recipient_id.clone();
        if !self.queue.enqueue(&recipient, &message).await {
            return DeliveryOutcome::Dropped(recipient);
        }

        // 接收者可能在判定离线之后、入队之前完成了连接
        if self.presence.is_online(&recipient) {
            tracing::debug!(recipient_id = %recipient, "recipient came online while queueing, flushing");
            self.deliver_pending(&recipient).await;
        }
        DeliveryOutcome::Queued(recipient)
    }

    async fn deliver_pending(&self, user_id: &UserId) -> usize {
        let mut delivered = 0;
        loop {
            match self.draining.entry(user_id.clone()) {
                Entry::Occupied(mut running) => {
                    // 交给正在运行的补推循环再跑一轮
                    *running.get_mut() = true;
                    return delivered;
                }
                Entry::Vacant(slot) => {
                    slot.insert(false);
                }
            }

            let (sent, interrupted) = self.drain_once(user_id).await;
            let rerun = self
                .draining
                .remove(user_id)
                .map(|(_, rerun)| rerun)
                .unwrap_or(false);
            delivered += sent;

            if rerun {
                continue;
            }
            if interrupted
                || !self.presence.is_online(user_id)
                || !self.queue.has_pending(user_id).await
            {
                return delivered;
            }
        }
    }

    /// 取出一次并逐条推送，返回成功条数以及是否因推送失败而中断
    async fn drain_once(&self, user_id: &UserId) -> (usize, bool) {
        let pending = self.queue.drain(user_id).await;
        if pending.is_empty() {
            return (0, false);
        }

        let total = pending.len();
        let mut delivered = 0;
        for (index, message) in pending.iter().enumerate() {
            let payload = match serde_json::to_string(message) {
                Ok(payload) => payload,
                Err(err) => {
                    tracing::warn!(user_id = %user_id, error = %err, "skipping unencodable message");
                    continue;
                }
            };

            if let Err(err) = self
                .transport
                .send_to_user(user_id, Destination::Messages, payload)
                .await
            {
                tracing::warn!(
                    user_id = %user_id,
                    error = %err,
                    "offline delivery interrupted, re-queueing remainder"
                );
                let remainder = &pending[index..];
                let requeued = self.queue.requeue_front(user_id, remainder).await;
                if requeued < remainder.len() {
                    tracing::warn!(
                        user_id = %user_id,
                        lost = remainder.len() - requeued,
                        "failed to re-queue offline messages"
                    );
                }
                tracing::info!(user_id = %user_id, delivered, total, "offline messages delivered");
                return (delivered, true);
            }
            delivered += 1;
        }

        tracing::info!(user_id = %user_id, delivered, total, "offline messages delivered");
        (delivered, false)
    }
}
