//! 基于通道的传输会话
//!
//! 路由侧只往无界通道里写出站帧，真正的套接字写入由绑定层的写任务完成，
//! 这样发送不会因为某个慢客户端阻塞。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use application::{TransportError, TransportSession};
use async_trait::async_trait;
use domain::{Destination, SessionId};
use serde::Serialize;
use tokio::sync::mpsc;

/// 写任务消费的出站帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Deliver {
        destination: Destination,
        payload: String,
    },
    Close,
}

/// 推送给客户端的文本帧：`{"destination": "...", "body": <payload>}`
#[derive(Debug, Serialize)]
struct WireFrame<'a> {
    destination: &'a str,
    body: serde_json::Value,
}

impl OutboundFrame {
    /// 编码为客户端文本帧；`Close` 没有文本表示
    pub fn to_text(&self) -> Option<String> {
        match self {
            OutboundFrame::Deliver {
                destination,
                payload,
            } => {
                let body = serde_json::from_str(payload)
                    .unwrap_or_else(|_| serde_json::Value::String(payload.clone()));
                let frame = WireFrame {
                    destination: destination.as_str(),
                    body,
                };
                serde_json::to_string(&frame).ok()
            }
            OutboundFrame::Close => None,
        }
    }
}

pub struct ChannelSession {
    id: SessionId,
    sender: mpsc::UnboundedSender<OutboundFrame>,
    open: AtomicBool,
}

impl ChannelSession {
    /// 创建会话，返回值中的接收端交给写任务
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<OutboundFrame>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let session = Arc::new(Self {
            id: SessionId::random(),
            sender,
            open: AtomicBool::new(true),
        });
        (session, receiver)
    }

    /// 读端结束时由绑定层调用，之后 `is_open` 返回 false
    pub fn mark_closed(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl TransportSession for ChannelSession {
    fn id(&self) -> SessionId {
        self.id
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.sender.is_closed()
    }

    async fn send(&self, destination: Destination, payload: String) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed(self.id.to_string()));
        }
        self.sender
            .send(OutboundFrame::Deliver {
                destination,
                payload,
            })
            .map_err(|_| {
                self.mark_closed();
                TransportError::SendFailed(format!("session {} writer is gone", self.id))
            })
    }

    async fn close(&self) -> Result<(), TransportError> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        // 写任务可能已经退出，此时无需再通知
        let _ = self.sender.send(OutboundFrame::Close);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_queues_frames_in_order() {
        let (session, mut rx) = ChannelSession::new();
        session.send(Destination::Messages, "1".to_string()).await.unwrap();
        session.send(Destination::Presence, "2".to_string()).await.unwrap();

        assert_eq!(
            rx.recv().await,
            Some(OutboundFrame::Deliver {
                destination: Destination::Messages,
                payload: "1".to_string()
            })
        );
        assert_eq!(
            rx.recv().await,
            Some(OutboundFrame::Deliver {
                destination: Destination::Presence,
                payload: "2".to_string()
            })
        );
    }

    #[tokio::test]
    async fn close_emits_close_frame_once() {
        let (session, mut rx) = ChannelSession::new();
        session.close().await.unwrap();
        session.close().await.unwrap();

        assert!(!session.is_open());
        assert_eq!(rx.recv().await, Some(OutboundFrame::Close));
        assert!(rx.try_recv().is_err());

        let err = session.send(Destination::Messages, "x".to_string()).await.unwrap_err();
        assert!(matches!(err, TransportError::Closed(_)));
    }

    #[tokio::test]
    async fn dropped_receiver_closes_session() {
        let (session, rx) = ChannelSession::new();
        drop(rx);

        assert!(!session.is_open());
        let err = session.send(Destination::Messages, "x".to_string()).await.unwrap_err();
        assert!(matches!(err, TransportError::Closed(_)));
    }

    #[test]
    fn json_payload_is_embedded_as_body() {
        let frame = OutboundFrame::Deliver {
            destination: Destination::Messages,
            payload: r#"{"content":"hi"}"#.to_string(),
        };
        let text = frame.to_text().unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["destination"], "/queue/messages");
        assert_eq!(value["body"]["content"], "hi");

        assert!(OutboundFrame::Close.to_text().is_none());
    }
}
