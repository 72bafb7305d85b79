//! ChatServer actor implementation
//!
//! The central actor owning all live-connection state: the connection map
//! and the session registry. Handlers communicate with it over an mpsc
//! command channel, so every command — in particular the handshake's
//! taken-check-plus-register and the disconnect's unregister — runs as one
//! critical section without locks.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::broadcast;
use crate::connection::ConnectionHandle;
use crate::message::{ChannelHistory, ServerMessage, UserRef};
use crate::registry::SessionRegistry;
use crate::store::ChatStore;
use crate::types::ConnectionId;
use crate::validate::{validate_message_text, validate_username};

/// Channel every session starts in
pub const DEFAULT_CHANNEL_ID: &str = "general";

/// Maximum number of messages returned per history request
pub const HISTORY_LIMIT: usize = 50;

/// Commands sent from connection handlers to the ChatServer actor
#[derive(Debug)]
pub enum ServerCommand {
    /// New transport-level connection accepted
    Connect {
        connection_id: ConnectionId,
        sender: mpsc::Sender<ServerMessage>,
    },
    /// Connection closed or errored; idempotent
    Disconnect { connection_id: ConnectionId },
    /// Run the authentication handshake for a connection.
    ///
    /// The reply tells the handler whether to enter the active loop.
    /// All frames (`auth_success`/`auth_failure` and the join broadcasts)
    /// are sent by the actor itself.
    Authenticate {
        connection_id: ConnectionId,
        username: String,
        password: String,
        respond_to: oneshot::Sender<bool>,
    },
    /// Append a chat message and broadcast it to its channel
    SendChatMessage {
        connection_id: ConnectionId,
        channel_id: String,
        text: String,
    },
    /// Reply with a channel's recent history to the requester only
    RequestHistory {
        connection_id: ConnectionId,
        channel_id: String,
    },
}

/// The main ChatServer actor
pub struct ChatServer {
    /// All live connections: ConnectionId -> handle
    connections: HashMap<ConnectionId, ConnectionHandle>,
    /// Sessions of authenticated connections
    registry: SessionRegistry,
    /// Durable store collaborator
    store: Arc<dyn ChatStore>,
    /// Command receiver channel
    receiver: mpsc::Receiver<ServerCommand>,
}

impl ChatServer {
    pub fn new(receiver: mpsc::Receiver<ServerCommand>, store: Arc<dyn ChatStore>) -> Self {
        Self {
            connections: HashMap::new(),
            registry: SessionRegistry::new(),
            store,
            receiver,
        }
    }

    /// Run the ChatServer event loop
    ///
    /// Continuously receives and processes commands until all senders are
    /// dropped. Commands are processed strictly one at a time.
    pub async fn run(mut self) {
        info!("ChatServer started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd).await;
        }

        info!("ChatServer shutting down");
    }

    async fn handle_command(&mut self, cmd: ServerCommand) {
        match cmd {
            ServerCommand::Connect {
                connection_id,
                sender,
            } => {
                self.handle_connect(connection_id, sender);
            }
            ServerCommand::Disconnect { connection_id } => {
                self.handle_disconnect(connection_id);
            }
            ServerCommand::Authenticate {
                connection_id,
                username,
                password,
                respond_to,
            } => {
                let authenticated = self.authenticate(connection_id, &username, &password).await;
                let _ = respond_to.send(authenticated);
            }
            ServerCommand::SendChatMessage {
                connection_id,
                channel_id,
                text,
            } => {
                self.handle_send_chat_message(connection_id, &channel_id, text)
                    .await;
            }
            ServerCommand::RequestHistory {
                connection_id,
                channel_id,
            } => {
                self.handle_request_history(connection_id, &channel_id).await;
            }
        }
    }

    fn handle_connect(&mut self, connection_id: ConnectionId, sender: mpsc::Sender<ServerMessage>) {
        debug!("Connection {} registered with server", connection_id);
        self.connections
            .insert(connection_id, ConnectionHandle::new(connection_id, sender));
    }

    /// Remove a connection and, if it had a session, notify everyone left.
    ///
    /// Safe to call repeatedly: the second call finds nothing to remove and
    /// broadcasts nothing.
    fn handle_disconnect(&mut self, connection_id: ConnectionId) {
        self.connections.remove(&connection_id);

        let Some(session) = self.registry.unregister(connection_id) else {
            debug!("Connection {} closed without a session", connection_id);
            return;
        };

        info!("User {} disconnected", session.username);

        let left = ServerMessage::UserLeft {
            user: session.user_ref(),
        };
        let failed = broadcast::broadcast_to_all(&self.connections, &self.registry, &left, None);
        self.log_failed_recipients("user_left", &failed);

        let update = ServerMessage::UserListUpdate {
            online_users: self.registry.online_users(),
        };
        let failed = broadcast::broadcast_to_all(&self.connections, &self.registry, &update, None);
        self.log_failed_recipients("user_list_update", &failed);
    }

    /// Run the handshake for one connection. Returns whether it succeeded.
    ///
    /// All store reads happen before registration, so no failure path can
    /// leave a partially visible session behind.
    async fn authenticate(
        &mut self,
        connection_id: ConnectionId,
        username: &str,
        password: &str,
    ) -> bool {
        if !self.connections.contains_key(&connection_id) {
            // Disconnected before the command was processed
            return false;
        }

        let username = username.trim();

        if let Err(e) = validate_username(username) {
            self.reject(connection_id, &e.to_string());
            return false;
        }

        if password.is_empty() {
            self.reject(connection_id, "Password is required");
            return false;
        }

        if self.registry.is_username_taken(username) {
            self.reject(connection_id, "Nickname already in use.");
            return false;
        }

        let user = match self.store.get_user_by_username(username).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                self.reject(connection_id, "User not found.");
                return false;
            }
            Err(e) => {
                warn!("Store error during authentication: {}", e);
                self.reject(connection_id, "Authentication error");
                return false;
            }
        };

        if user.password != password {
            self.reject(connection_id, "Invalid password.");
            return false;
        }

        let channels = match self.store.get_all_channels().await {
            Ok(channels) => channels,
            Err(e) => {
                warn!("Store error fetching channels: {}", e);
                self.reject(connection_id, "Authentication error");
                return false;
            }
        };

        let history = match self
            .store
            .get_messages_for_channel(DEFAULT_CHANNEL_ID, HISTORY_LIMIT)
            .await
        {
            Ok(history) => history,
            Err(e) => {
                warn!("Store error fetching initial history: {}", e);
                self.reject(connection_id, "Authentication error");
                return false;
            }
        };

        if self
            .registry
            .try_register(
                connection_id,
                user.id.clone(),
                user.username.clone(),
                DEFAULT_CHANNEL_ID.to_string(),
            )
            .is_err()
        {
            self.reject(connection_id, "Nickname already in use.");
            return false;
        }

        let user_ref = UserRef {
            id: user.id,
            name: user.username,
        };

        // Snapshot taken after registration: the joiner sees themselves,
        // and the same snapshot feeds the user_list_update below.
        let online_users = self.registry.online_users();

        let welcome = ServerMessage::AuthSuccess {
            user_info: user_ref.clone(),
            channels: channels.into_iter().map(Into::into).collect(),
            online_users: online_users.clone(),
            initial_channel_history: ChannelHistory {
                channel_id: DEFAULT_CHANNEL_ID.to_string(),
                messages: history.into_iter().map(Into::into).collect(),
            },
        };

        if let Err(e) = broadcast::send_to(&self.connections, welcome, connection_id) {
            // Welcome undeliverable: roll the registration back so the
            // session was never visible to anyone.
            warn!("Welcome payload delivery failed: {}", e);
            self.registry.unregister(connection_id);
            return false;
        }

        info!("User {} authenticated on {}", user_ref.name, connection_id);

        // Joined-notification to the others first, then the fresh snapshot
        // to everyone including the joiner.
        let joined = ServerMessage::UserJoined {
            user: user_ref.clone(),
        };
        let failed = broadcast::broadcast_to_all(
            &self.connections,
            &self.registry,
            &joined,
            Some(connection_id),
        );
        self.log_failed_recipients("user_joined", &failed);

        let update = ServerMessage::UserListUpdate { online_users };
        let failed = broadcast::broadcast_to_all(&self.connections, &self.registry, &update, None);
        self.log_failed_recipients("user_list_update", &failed);

        true
    }

    async fn handle_send_chat_message(
        &mut self,
        connection_id: ConnectionId,
        channel_id: &str,
        text: String,
    ) {
        // Defensive: the lifecycle controller only routes this after the
        // handshake, but a session is still required.
        let Some(session) = self.registry.lookup(connection_id) else {
            self.send_error(connection_id, "User not authenticated");
            return;
        };
        let sender = session.user_ref();

        let channel_id = channel_id.trim();
        if channel_id.is_empty() {
            self.send_error(connection_id, "Channel ID is required");
            return;
        }

        if let Err(e) = validate_message_text(&text) {
            self.send_error(connection_id, &e.to_string());
            return;
        }

        let (message_id, timestamp) =
            match self.store.add_message(channel_id, &sender.id, &text).await {
                Ok(assigned) => assigned,
                Err(e) => {
                    warn!("Store error appending message: {}", e);
                    self.send_error(connection_id, "Error sending message");
                    return;
                }
            };

        debug!(
            "Message {} from {} in channel {}",
            message_id, sender.name, channel_id
        );

        // The sender is not excluded: they receive their own message back
        // with the store-assigned id and timestamp.
        let new_message = ServerMessage::NewMessage {
            channel_id: channel_id.to_string(),
            message: crate::message::WireMessage {
                id: message_id,
                user: sender,
                text,
                timestamp,
                edited_at: None,
            },
        };
        let failed = broadcast::broadcast_to_channel(
            &self.connections,
            &self.registry,
            &new_message,
            channel_id,
            None,
        );
        self.log_failed_recipients("new_message", &failed);
    }

    async fn handle_request_history(&mut self, connection_id: ConnectionId, channel_id: &str) {
        let channel_id = channel_id.trim();
        if channel_id.is_empty() {
            self.send_error(connection_id, "Channel ID is required");
            return;
        }

        let messages = match self
            .store
            .get_messages_for_channel(channel_id, HISTORY_LIMIT)
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                warn!("Store error fetching history: {}", e);
                self.send_error(connection_id, "Error fetching history");
                return;
            }
        };

        debug!(
            "History for channel {} sent ({} messages)",
            channel_id,
            messages.len()
        );

        let reply = ServerMessage::ChatHistory {
            channel_id: channel_id.to_string(),
            messages: messages.into_iter().map(Into::into).collect(),
        };
        if let Err(e) = broadcast::send_to(&self.connections, reply, connection_id) {
            debug!("History reply to {} failed: {}", connection_id, e);
        }
    }

    /// Send an `auth_failure` frame; the handler closes the connection
    /// after the handshake reply.
    fn reject(&self, connection_id: ConnectionId, reason: &str) {
        debug!("Rejecting {}: {}", connection_id, reason);
        let frame = ServerMessage::AuthFailure {
            reason: reason.to_string(),
        };
        if let Err(e) = broadcast::send_to(&self.connections, frame, connection_id) {
            debug!("auth_failure delivery to {} failed: {}", connection_id, e);
        }
    }

    /// Send a non-fatal `error_message` reply to one connection
    fn send_error(&self, connection_id: ConnectionId, message: &str) {
        let frame = ServerMessage::ErrorMessage {
            message: message.to_string(),
        };
        if let Err(e) = broadcast::send_to(&self.connections, frame, connection_id) {
            debug!("error_message delivery to {} failed: {}", connection_id, e);
        }
    }

    fn log_failed_recipients(&self, what: &str, failed: &[ConnectionId]) {
        for connection_id in failed {
            warn!(
                "Delivery of {} to {} failed; its disconnect will reconcile",
                what, connection_id
            );
        }
    }
}
