use std::time::Duration;

use application::{OfflineQueue, OfflineQueueSettings};
use chrono::Utc;
use domain::{ChatId, MessageId, QueuedMessage, UserId};
use infrastructure::RedisOfflineQueue;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::redis::{Redis, REDIS_PORT};
use uuid::Uuid;

fn queued(recipient: &str, content: &str) -> QueuedMessage {
    QueuedMessage {
        message_id: MessageId::from(Uuid::new_v4()),
        sender_id: UserId::from("alice"),
        chat_id: ChatId::from("c1"),
        recipient_id: UserId::from(recipient),
        content: content.to_string(),
        sent_at: Utc::now(),
    }
}

async fn start_redis() -> (ContainerAsync<Redis>, String) {
    let node = Redis::default().start().await.expect("start redis");
    let port = node.get_host_port_ipv4(REDIS_PORT).await.expect("port");
    (node, format!("redis://127.0.0.1:{port}"))
}

fn settings(capacity: usize, drain_batch_size: usize) -> OfflineQueueSettings {
    OfflineQueueSettings {
        capacity,
        ttl: Duration::from_secs(60),
        drain_batch_size,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ignore = "requires local docker daemon"]
async fn drains_in_fifo_order_across_batches() {
    let (_node, url) = start_redis().await;
    let queue = RedisOfflineQueue::open(&url, settings(100, 2)).expect("client");
    let bob = UserId::from("bob");

    assert!(!queue.has_pending(&bob).await);
    for content in ["m1", "m2", "m3", "m4", "m5"] {
        assert!(queue.enqueue(&bob, &queued("bob", content)).await);
    }
    assert!(queue.has_pending(&bob).await);

    let drained = queue.drain(&bob).await;
    assert_eq!(
        drained.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(),
        vec!["m1", "m2", "m3", "m4", "m5"]
    );
    assert!(!queue.has_pending(&bob).await);
    assert!(queue.drain(&bob).await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ignore = "requires local docker daemon"]
async fn rejects_beyond_capacity() {
    let (_node, url) = start_redis().await;
    let queue = RedisOfflineQueue::open(&url, settings(2, 10)).expect("client");
    let bob = UserId::from("bob");

    assert!(queue.enqueue(&bob, &queued("bob", "m1")).await);
    assert!(queue.enqueue(&bob, &queued("bob", "m2")).await);
    assert!(!queue.enqueue(&bob, &queued("bob", "m3")).await);

    let drained = queue.drain(&bob).await;
    assert_eq!(drained.len(), 2);
    assert_eq!(drained[1].content, "m2");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ignore = "requires local docker daemon"]
async fn skips_corrupt_entries_while_draining() {
    let (_node, url) = start_redis().await;
    let queue = RedisOfflineQueue::open(&url, settings(10, 10))
        .expect("client")
        .with_key_prefix("corrupt:");
    let bob = UserId::from("bob");

    assert!(queue.enqueue(&bob, &queued("bob", "m1")).await);
    let client = redis::Client::open(url.as_str()).expect("client");
    let mut conn = client
        .get_multiplexed_async_connection()
        .await
        .expect("connection");
    let _: i64 = redis::cmd("RPUSH")
        .arg("corrupt:bob")
        .arg("{not json")
        .query_async(&mut conn)
        .await
        .expect("rpush");
    assert!(queue.enqueue(&bob, &queued("bob", "m2")).await);

    let drained = queue.drain(&bob).await;
    assert_eq!(
        drained.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(),
        vec!["m1", "m2"]
    );
    assert!(!queue.has_pending(&bob).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ignore = "requires local docker daemon"]
async fn enqueue_sets_retention() {
    let (_node, url) = start_redis().await;
    let queue = RedisOfflineQueue::open(&url, settings(10, 10)).expect("client");
    let bob = UserId::from("bob");
    assert!(queue.enqueue(&bob, &queued("bob", "m1")).await);

    let client = redis::Client::open(url.as_str()).expect("client");
    let mut conn = client
        .get_multiplexed_async_connection()
        .await
        .expect("connection");
    let ttl: i64 = redis::cmd("TTL")
        .arg("offline:bob")
        .query_async(&mut conn)
        .await
        .expect("ttl");
    assert!(ttl > 0 && ttl <= 60);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ignore = "requires local docker daemon"]
async fn requeued_messages_stay_ahead_of_newer_ones() {
    let (_node, url) = start_redis().await;
    let queue = RedisOfflineQueue::open(&url, settings(1, 10)).expect("client");
    let bob = UserId::from("bob");

    assert!(queue.enqueue(&bob, &queued("bob", "m3")).await);
    let requeued = queue
        .requeue_front(&bob, &[queued("bob", "m1"), queued("bob", "m2")])
        .await;
    assert_eq!(requeued, 2);

    let drained = queue.drain(&bob).await;
    assert_eq!(
        drained.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(),
        vec!["m1", "m2", "m3"]
    );
}
