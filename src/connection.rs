//! Connection handle
//!
//! The server-side reference to one live connection: its id and the bounded
//! outbound queue feeding that connection's write task. The transport itself
//! stays owned by the handler task; the actor only ever holds this handle.

use tokio::sync::mpsc;

use crate::error::SendError;
use crate::message::ServerMessage;
use crate::types::ConnectionId;

/// Reference to a live connection held by the `ChatServer` actor
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Unique identifier for this connection
    pub id: ConnectionId,
    /// Server → client outbound queue
    sender: mpsc::Sender<ServerMessage>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self { id, sender }
    }

    /// Queue a message for this connection without blocking.
    ///
    /// Fails fast when the peer is gone (queue closed) or stalled (queue
    /// full) so one bad recipient can never hold up a broadcast.
    pub fn send(&self, msg: ServerMessage) -> Result<(), SendError> {
        self.sender.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_queues_message() {
        let (tx, mut rx) = mpsc::channel(4);
        let handle = ConnectionHandle::new(ConnectionId::new(), tx);

        handle
            .send(ServerMessage::ErrorMessage {
                message: "test".to_string(),
            })
            .unwrap();

        match rx.recv().await.unwrap() {
            ServerMessage::ErrorMessage { message } => assert_eq!(message, "test"),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_fails_fast_when_closed() {
        let (tx, rx) = mpsc::channel(4);
        let handle = ConnectionHandle::new(ConnectionId::new(), tx);
        drop(rx);

        let err = handle
            .send(ServerMessage::ErrorMessage {
                message: "test".to_string(),
            })
            .unwrap_err();
        assert_eq!(err, SendError::ChannelClosed);
    }

    #[tokio::test]
    async fn test_send_fails_fast_when_full() {
        let (tx, _rx) = mpsc::channel(1);
        let handle = ConnectionHandle::new(ConnectionId::new(), tx);

        handle
            .send(ServerMessage::ErrorMessage {
                message: "first".to_string(),
            })
            .unwrap();
        let err = handle
            .send(ServerMessage::ErrorMessage {
                message: "second".to_string(),
            })
            .unwrap_err();
        assert_eq!(err, SendError::QueueFull);
    }
}
