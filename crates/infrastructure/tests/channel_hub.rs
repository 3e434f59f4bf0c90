use std::sync::Arc;
use std::time::Duration;

use application::{
    DeliveryOutcome, MemoryOfflineQueue, OfflineQueueSettings, RealtimeHub,
    RealtimeHubDependencies, SystemClock, TransportSession,
};
use domain::{ChatEnvelope, ChatId, Destination, UserId};
use infrastructure::{
    ChannelSession, InMemoryContactSource, InMemoryMembershipSource, InMemoryMessageStore,
    OutboundFrame,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

async fn next_frame(rx: &mut UnboundedReceiver<OutboundFrame>) -> (Destination, serde_json::Value) {
    let frame = timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("frame in time")
        .expect("channel open");
    match frame {
        OutboundFrame::Deliver {
            destination,
            payload,
        } => (destination, serde_json::from_str(&payload).expect("json payload")),
        OutboundFrame::Close => panic!("unexpected close frame"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn offline_message_reaches_user_over_channel_after_reconnect() {
    let alice = UserId::from("alice");
    let bob = UserId::from("bob");

    let membership = InMemoryMembershipSource::with_rows(vec![
        (ChatId::from("c1"), alice.clone()),
        (ChatId::from("c1"), bob.clone()),
    ]);
    let store = Arc::new(InMemoryMessageStore::new());
    let contacts = Arc::new(InMemoryContactSource::new());
    contacts.connect(&alice, &bob).await;

    let hub = RealtimeHub::new(
        RealtimeHubDependencies {
            message_store: store.clone(),
            contacts,
            offline_queue: Arc::new(MemoryOfflineQueue::new(
                OfflineQueueSettings::default(),
                Arc::new(SystemClock),
            )),
        },
        &config::RealtimeConfig::default(),
    );
    assert_eq!(hub.start(&membership).await.expect("start"), 1);

    let (alice_session, mut alice_rx) = ChannelSession::new();
    let drained = hub
        .connect(&alice, alice_session.clone())
        .await
        .expect("alice accepted")
        .await
        .expect("drain task");
    assert_eq!(drained, 0);

    let receipt = hub
        .handle_message(ChatEnvelope {
            sender_id: "alice".to_string(),
            chat_id: "c1".to_string(),
            content: "see you".to_string(),
            recipient_id: None,
        })
        .await
        .expect("routed");
    assert_eq!(receipt.offline_recipients, vec![bob.clone()]);
    assert_eq!(receipt.wait().await, vec![DeliveryOutcome::Queued(bob.clone())]);

    let (bob_session, mut bob_rx) = ChannelSession::new();
    let drained = hub
        .connect(&bob, bob_session.clone())
        .await
        .expect("bob accepted")
        .await
        .expect("drain task");
    assert_eq!(drained, 1);

    let (destination, body) = next_frame(&mut bob_rx).await;
    assert_eq!(destination, Destination::Messages);
    assert_eq!(body["content"], "see you");
    assert_eq!(body["senderId"], "alice");
    assert_eq!(body["recipientId"], "bob");

    let (destination, body) = next_frame(&mut alice_rx).await;
    assert_eq!(destination, Destination::Presence);
    assert_eq!(body["status"], "ONLINE");
    assert_eq!(body["senderId"], "bob");

    assert!(hub.disconnect(&bob, bob_session.id()).await);
    let (_, body) = next_frame(&mut alice_rx).await;
    assert_eq!(body["status"], "OFFLINE");

    assert_eq!(store.messages().await.len(), 1);

    hub.shutdown().await;
    assert!(!alice_session.is_open());
}

#[tokio::test]
async fn dropped_writer_is_swept_and_marked_offline() {
    let alice = UserId::from("alice");
    let membership = InMemoryMembershipSource::new();
    let hub = RealtimeHub::new(
        RealtimeHubDependencies {
            message_store: Arc::new(InMemoryMessageStore::new()),
            contacts: Arc::new(InMemoryContactSource::new()),
            offline_queue: Arc::new(MemoryOfflineQueue::new(
                OfflineQueueSettings::default(),
                Arc::new(SystemClock),
            )),
        },
        &config::RealtimeConfig::default(),
    );
    hub.start(&membership).await.expect("start");

    let (session, rx) = ChannelSession::new();
    hub.connect(&alice, session).await.expect("accepted");
    assert!(hub.presence().is_online(&alice));

    drop(rx);
    assert_eq!(hub.sweep().went_offline, vec![alice.clone()]);
    assert!(!hub.presence().is_online(&alice));
}
