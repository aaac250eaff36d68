//! Outbound verdict delivery.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("message sink is closed")]
    Closed,
    #[error("no message sink attached")]
    NoSink,
}

/// Sending end of a peer's outbound message buffer.
///
/// `send` completes once the message has been accepted into the local
/// buffer, suspending while the buffer is full.
#[derive(Debug, Clone)]
pub struct MessageSink {
    tx: mpsc::Sender<String>,
}

impl MessageSink {
    /// Create a sink and the receiver the transport drains.
    pub fn channel(capacity: usize) -> (MessageSink, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (MessageSink { tx }, rx)
    }

    pub async fn send(&self, message: String) -> Result<(), SendError> {
        self.tx.send(message).await.map_err(|_| SendError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Swappable slot for the currently attached sink, shared with track tasks.
#[derive(Debug, Clone, Default)]
pub(crate) struct SinkSlot(Arc<Mutex<Option<MessageSink>>>);

impl SinkSlot {
    /// Attach `sink`, returning the one it replaced.
    pub async fn attach(&self, sink: MessageSink) -> Option<MessageSink> {
        self.0.lock().await.replace(sink)
    }

    pub async fn detach(&self) -> Option<MessageSink> {
        self.0.lock().await.take()
    }

    pub async fn current(&self) -> Option<MessageSink> {
        self.0.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_fails_once_receiver_is_gone() {
        let (sink, rx) = MessageSink::channel(1);
        drop(rx);
        assert!(sink.is_closed());
        assert_eq!(sink.send("x".into()).await, Err(SendError::Closed));
    }

    #[tokio::test]
    async fn test_slot_swaps_sinks() {
        let slot = SinkSlot::default();
        assert!(slot.current().await.is_none());

        let (first, mut first_rx) = MessageSink::channel(1);
        let (second, mut second_rx) = MessageSink::channel(1);
        assert!(slot.attach(first).await.is_none());
        assert!(slot.attach(second).await.is_some());

        slot.current().await.unwrap().send("hello".into()).await.unwrap();
        assert_eq!(second_rx.recv().await.as_deref(), Some("hello"));
        // the replaced sink was dropped by the slot
        assert!(first_rx.recv().await.is_none());

        assert!(slot.detach().await.is_some());
        assert!(slot.current().await.is_none());
    }
}
