//! Error types for the chat server
//!
//! Defines connection-handler fatal errors and message delivery errors.
//! Uses thiserror for ergonomic error definitions. Validation, decode and
//! store errors live next to the code that produces them
//! ([`crate::validate`], [`crate::message`], [`crate::store`]).

use thiserror::Error;

/// Fatal connection-handler errors
///
/// Any of these ends the connection; the handler's single cleanup path
/// runs afterwards.
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (transport failure)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The server actor's command channel is closed
    #[error("Server command channel closed")]
    ChannelSend,
}

/// Message delivery errors
///
/// Produced when queueing an outbound message for a connection fails.
/// Delivery never blocks: a full or closed queue fails immediately and the
/// connection is left for its own disconnect path to reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    /// The receiving end of the outbound queue has been closed
    #[error("Connection channel closed")]
    ChannelClosed,

    /// The outbound queue is full (slow or stalled peer)
    #[error("Connection queue full")]
    QueueFull,
}
