//! 进程内领域事件总线
//!
//! 每个订阅者拥有独立的无界通道和工作任务：
//! - 发布方只负责入队，不等待订阅者处理完成
//! - 同一订阅者按发布顺序收到事件
//! - 不同订阅者之间互不阻塞

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use domain::DomainEvent;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

/// 领域事件处理器
///
/// 处理器运行在总线的工作任务上，没有调用方可以接收错误，
/// 因此处理失败只能在内部记录日志。
#[async_trait]
pub trait DomainEventHandler: Send + Sync {
    /// 订阅者名称（用于日志）
    fn name(&self) -> &'static str;

    async fn handle(&self, event: DomainEvent);
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventBusError {
    #[error("event bus is shut down")]
    Closed,
    #[error("subscriber {0} is no longer receiving events")]
    SubscriberGone(&'static str),
}

struct Subscriber {
    name: &'static str,
    sender: mpsc::UnboundedSender<DomainEvent>,
    worker: JoinHandle<()>,
}

#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<Vec<Subscriber>>,
    closed: AtomicBool,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册订阅者并启动它的工作任务
    pub async fn subscribe(
        &self,
        handler: Arc<dyn DomainEventHandler>,
    ) -> Result<(), EventBusError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(EventBusError::Closed);
        }

        let name = handler.name();
        let (sender, mut receiver) = mpsc::unbounded_channel::<DomainEvent>();
        let worker = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                tracing::debug!(
                    subscriber = name,
                    kind = event.kind(),
                    chat_id = %event.chat_id(),
                    "dispatching domain event"
                );
                handler.handle(event).await;
            }
            tracing::debug!(subscriber = name, "event subscriber stopped");
        });

        self.subscribers.write().await.push(Subscriber {
            name,
            sender,
            worker,
        });
        tracing::info!(subscriber = name, "event subscriber registered");
        Ok(())
    }

    /// 把事件投递给所有订阅者
    ///
    /// 任一订阅者的通道已关闭时返回错误，其余订阅者仍会收到事件。
    pub async fn publish(&self, event: DomainEvent) -> Result<(), EventBusError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(EventBusError::Closed);
        }

        let subscribers = self.subscribers.read().await;
        let mut failure = None;
        for subscriber in subscribers.iter() {
            if subscriber.sender.send(event.clone()).is_err() {
                tracing::error!(
                    subscriber = subscriber.name,
                    kind = event.kind(),
                    "failed to dispatch domain event"
                );
                failure.get_or_insert(EventBusError::SubscriberGone(subscriber.name));
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// 停止接收新事件，并等待各订阅者处理完已入队的事件
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        let subscribers: Vec<Subscriber> = self.subscribers.write().await.drain(..).collect();

        for Subscriber {
            name,
            sender,
            worker,
        } in subscribers
        {
            drop(sender);
            if let Err(err) = worker.await {
                tracing::warn!(subscriber = name, error = %err, "event subscriber ended abnormally");
            }
        }
        tracing::info!("event bus shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{ChatId, UserId};
    use std::sync::Mutex;
    use std::time::Duration;

    struct Recorder {
        seen: Mutex<Vec<DomainEvent>>,
    }

    #[async_trait]
    impl DomainEventHandler for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        async fn handle(&self, event: DomainEvent) {
            self.seen.lock().unwrap().push(event);
        }
    }

    struct Panicky;

    #[async_trait]
    impl DomainEventHandler for Panicky {
        fn name(&self) -> &'static str {
            "panicky"
        }

        async fn handle(&self, _event: DomainEvent) {
            panic!("handler failure");
        }
    }

    fn member_added(user: &str) -> DomainEvent {
        DomainEvent::MemberAdded {
            chat_id: ChatId::from("chat"),
            user_id: UserId::from(user),
        }
    }

    #[tokio::test]
    async fn delivers_in_publish_order() {
        let bus = EventBus::new();
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        bus.subscribe(recorder.clone()).await.unwrap();

        for user in ["a", "b", "c", "d"] {
            bus.publish(member_added(user)).await.unwrap();
        }
        bus.shutdown().await;

        let seen = recorder.seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                member_added("a"),
                member_added("b"),
                member_added("c"),
                member_added("d")
            ]
        );
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_ok() {
        let bus = EventBus::new();
        assert!(bus.publish(member_added("a")).await.is_ok());
    }

    #[tokio::test]
    async fn publish_after_shutdown_fails() {
        let bus = EventBus::new();
        bus.shutdown().await;
        assert_eq!(
            bus.publish(member_added("a")).await,
            Err(EventBusError::Closed)
        );
    }

    #[tokio::test]
    async fn dead_subscriber_is_reported() {
        let bus = EventBus::new();
        bus.subscribe(Arc::new(Panicky)).await.unwrap();

        bus.publish(member_added("a")).await.unwrap();
        // 等待工作任务因 panic 退出
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(
            bus.publish(member_added("b")).await,
            Err(EventBusError::SubscriberGone("panicky"))
        );
    }
}
