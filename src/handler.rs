//! Connection lifecycle controller
//!
//! Drives one connection through its states:
//! `Connecting → Handshaking → Active → Disconnecting → Closed`.
//! The handshake runs inline before any other frame is accepted; the active
//! phase splits into a read task (frames → server commands) and a write task
//! (server messages → frames). However the connection ends, exactly one
//! `Disconnect` command reaches the actor.

use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::message::{decode_client_message, ClientMessage, DecodeError, ServerMessage};
use crate::server::ServerCommand;
use crate::types::ConnectionId;

/// Per-connection outbound queue capacity
const OUTBOUND_QUEUE_SIZE: usize = 32;

/// Lifecycle states of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// TCP accepted, WebSocket handshake pending
    Connecting,
    /// Waiting for the auth request
    Handshaking,
    /// Authenticated, message loop running
    Active,
    /// Tearing down, cleanup in progress
    Disconnecting,
    /// Fully closed
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Handshaking => "handshaking",
            ConnectionState::Active => "active",
            ConnectionState::Disconnecting => "disconnecting",
            ConnectionState::Closed => "closed",
        };
        write!(f, "{name}")
    }
}

/// Handle a new TCP connection end to end.
///
/// Performs the WebSocket handshake, registers with the actor, runs the
/// auth handshake and then the message loop, and funnels every exit path
/// through one disconnect-cleanup point.
pub async fn handle_connection(
    stream: TcpStream,
    cmd_tx: mpsc::Sender<ServerCommand>,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    let mut state = ConnectionState::Connecting;
    debug!("New TCP connection from {} ({})", peer_addr, state);

    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let connection_id = ConnectionId::new();
    info!("Connection {} accepted from {}", connection_id, peer_addr);

    // Outbound queue: the actor and this handler push, the write task drains
    let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(OUTBOUND_QUEUE_SIZE);

    if cmd_tx
        .send(ServerCommand::Connect {
            connection_id,
            sender: msg_tx.clone(),
        })
        .await
        .is_err()
    {
        error!("Failed to register connection {} - server closed", connection_id);
        return Err(AppError::ChannelSend);
    }

    state = ConnectionState::Handshaking;
    debug!("Connection {} -> {}", connection_id, state);

    // Write task (ServerMessage -> WebSocket); drains remaining messages
    // before closing, so terminal frames still reach the peer.
    let write_task = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, ending write task");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                    // Continue - don't break on serialization errors
                }
            }
        }
        debug!("Write task ended for connection");

        let _ = ws_sender.close().await;
    });

    state = run_handshake(connection_id, &mut ws_receiver, &msg_tx, &cmd_tx).await;
    debug!("Connection {} -> {}", connection_id, state);

    if state != ConnectionState::Active {
        let _ = cmd_tx.send(ServerCommand::Disconnect { connection_id }).await;
        drop(msg_tx);
        let _ = write_task.await;

        state = ConnectionState::Closed;
        info!("Connection {} {}", connection_id, state);
        return Ok(());
    }

    // Read task (WebSocket -> ServerCommand); decode-level errors get an
    // error reply and the loop continues, transport errors end it.
    let cmd_tx_read = cmd_tx.clone();
    let msg_tx_read = msg_tx.clone();
    let read_task = tokio::spawn(async move {
        while let Some(msg_result) = ws_receiver.next().await {
            match msg_result {
                Ok(Message::Text(text)) => match decode_client_message(&text) {
                    Ok(ClientMessage::SendMessage { channel_id, text }) => {
                        let cmd = ServerCommand::SendChatMessage {
                            connection_id,
                            channel_id,
                            text,
                        };
                        if cmd_tx_read.send(cmd).await.is_err() {
                            debug!("Server closed, ending read task for {}", connection_id);
                            break;
                        }
                    }
                    Ok(ClientMessage::RequestHistory { channel_id }) => {
                        let cmd = ServerCommand::RequestHistory {
                            connection_id,
                            channel_id,
                        };
                        if cmd_tx_read.send(cmd).await.is_err() {
                            debug!("Server closed, ending read task for {}", connection_id);
                            break;
                        }
                    }
                    Ok(ClientMessage::AuthRequest { .. }) => {
                        // Already authenticated; treated like any type the
                        // active loop does not handle
                        let _ = msg_tx_read
                            .send(ServerMessage::ErrorMessage {
                                message: "Unknown message type: auth_request".to_string(),
                            })
                            .await;
                    }
                    Err(e) => {
                        warn!("Undecodable frame from {}: {}", connection_id, e);
                        let _ = msg_tx_read
                            .send(ServerMessage::ErrorMessage {
                                message: e.to_string(),
                            })
                            .await;
                    }
                },
                Ok(Message::Close(_)) => {
                    debug!("Connection {} sent close frame", connection_id);
                    break;
                }
                Ok(Message::Ping(_)) => {
                    // Pong is handled automatically by tungstenite
                    debug!("Ping from {}", connection_id);
                }
                Ok(Message::Pong(_)) => {}
                Ok(_) => {
                    // Binary or other frame kinds - ignore
                }
                Err(e) => {
                    error!("WebSocket error for {}: {}", connection_id, e);
                    break;
                }
            }
        }
        debug!("Read task ended for {}", connection_id);
    });

    // Wait for either side to finish
    tokio::select! {
        _ = read_task => {
            debug!("Read task completed for {}", connection_id);
        }
        _ = write_task => {
            debug!("Write task completed for {}", connection_id);
        }
    }

    state = ConnectionState::Disconnecting;
    debug!("Connection {} -> {}", connection_id, state);

    let _ = cmd_tx.send(ServerCommand::Disconnect { connection_id }).await;

    state = ConnectionState::Closed;
    info!("Connection {} {}", connection_id, state);

    Ok(())
}

/// Wait for the first text frame and run the auth handshake.
///
/// Returns the connection's next state: `Active` when the handshake
/// succeeded, `Disconnecting` otherwise. On any protocol violation a
/// terminal `auth_failure` is queued for the writer; the caller performs
/// the close.
async fn run_handshake(
    connection_id: ConnectionId,
    ws_receiver: &mut SplitStream<WebSocketStream<TcpStream>>,
    msg_tx: &mpsc::Sender<ServerMessage>,
    cmd_tx: &mpsc::Sender<ServerCommand>,
) -> ConnectionState {
    loop {
        let frame = match ws_receiver.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                debug!("Transport error during handshake for {}: {}", connection_id, e);
                return ConnectionState::Disconnecting;
            }
            None => {
                debug!("Connection {} closed during handshake", connection_id);
                return ConnectionState::Disconnecting;
            }
        };

        let text = match frame {
            Message::Text(text) => text,
            Message::Close(_) => {
                debug!("Connection {} closed during handshake", connection_id);
                return ConnectionState::Disconnecting;
            }
            // Control frames before the auth request are tolerated
            _ => continue,
        };

        return match decode_client_message(&text) {
            Ok(ClientMessage::AuthRequest { username, password }) => {
                let (tx, rx) = oneshot::channel();
                let cmd = ServerCommand::Authenticate {
                    connection_id,
                    username,
                    password,
                    respond_to: tx,
                };
                if cmd_tx.send(cmd).await.is_err() {
                    debug!("Server closed during handshake for {}", connection_id);
                    return ConnectionState::Disconnecting;
                }
                if rx.await.unwrap_or(false) {
                    ConnectionState::Active
                } else {
                    ConnectionState::Disconnecting
                }
            }
            Ok(_) | Err(DecodeError::UnknownType(_)) => {
                reject_handshake(msg_tx, "First message must be an auth request").await;
                ConnectionState::Disconnecting
            }
            // The frame was recognizable; its own error is the reason
            Err(e @ (DecodeError::InvalidJson(_) | DecodeError::InvalidPayload(_))) => {
                reject_handshake(msg_tx, &e.to_string()).await;
                ConnectionState::Disconnecting
            }
        };
    }
}

/// Queue a terminal `auth_failure` for a handshake-phase protocol violation
async fn reject_handshake(msg_tx: &mpsc::Sender<ServerMessage>, reason: &str) {
    let _ = msg_tx
        .send(ServerMessage::AuthFailure {
            reason: reason.to_string(),
        })
        .await;
}
