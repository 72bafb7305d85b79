//! Broadcast engine
//!
//! Fan-out of one message to a computed set of registered connections,
//! either channel-scoped or server-wide. Each call works over a single
//! snapshot of the recipient set, so one broadcast is internally consistent.
//! Per-recipient failures are captured and returned; fan-out never aborts
//! early and never mutates the registry — reconciling a dead connection is
//! the lifecycle controller's job, which avoids double-cleanup races with a
//! concurrent disconnect.

use std::collections::HashMap;

use tracing::warn;

use crate::connection::ConnectionHandle;
use crate::error::SendError;
use crate::message::ServerMessage;
use crate::registry::SessionRegistry;
use crate::types::ConnectionId;

/// Deliver to every registered session currently in `channel_id`,
/// except `exclude` if given. Returns the connections that failed.
pub fn broadcast_to_channel(
    connections: &HashMap<ConnectionId, ConnectionHandle>,
    registry: &SessionRegistry,
    msg: &ServerMessage,
    channel_id: &str,
    exclude: Option<ConnectionId>,
) -> Vec<ConnectionId> {
    fan_out(
        connections,
        registry.connections_in_channel(channel_id),
        msg,
        exclude,
    )
}

/// Deliver to every registered session except `exclude` if given.
/// Returns the connections that failed.
pub fn broadcast_to_all(
    connections: &HashMap<ConnectionId, ConnectionHandle>,
    registry: &SessionRegistry,
    msg: &ServerMessage,
    exclude: Option<ConnectionId>,
) -> Vec<ConnectionId> {
    fan_out(connections, registry.connections(), msg, exclude)
}

/// Deliver to exactly one connection
pub fn send_to(
    connections: &HashMap<ConnectionId, ConnectionHandle>,
    msg: ServerMessage,
    connection_id: ConnectionId,
) -> Result<(), SendError> {
    let handle = connections
        .get(&connection_id)
        .ok_or(SendError::ChannelClosed)?;
    handle.send(msg)
}

fn fan_out(
    connections: &HashMap<ConnectionId, ConnectionHandle>,
    recipients: Vec<ConnectionId>,
    msg: &ServerMessage,
    exclude: Option<ConnectionId>,
) -> Vec<ConnectionId> {
    let mut failed = Vec::new();

    for connection_id in recipients {
        if Some(connection_id) == exclude {
            continue;
        }
        let Some(handle) = connections.get(&connection_id) else {
            // Registered session whose handle is already gone; its
            // disconnect command is in flight.
            failed.push(connection_id);
            continue;
        };
        if let Err(e) = handle.send(msg.clone()) {
            warn!("Broadcast delivery to {} failed: {}", connection_id, e);
            failed.push(connection_id);
        }
    }

    failed
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn fake_connection(
        connections: &mut HashMap<ConnectionId, ConnectionHandle>,
        registry: &mut SessionRegistry,
        name: &str,
        channel: &str,
    ) -> (ConnectionId, mpsc::Receiver<ServerMessage>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(8);
        connections.insert(id, ConnectionHandle::new(id, tx));
        registry
            .try_register(
                id,
                format!("user_{name}"),
                name.to_string(),
                channel.to_string(),
            )
            .unwrap();
        (id, rx)
    }

    fn test_message() -> ServerMessage {
        ServerMessage::ErrorMessage {
            message: "ping".to_string(),
        }
    }

    #[tokio::test]
    async fn test_channel_broadcast_scopes_and_excludes() {
        let mut connections = HashMap::new();
        let mut registry = SessionRegistry::new();

        let (a, mut rx_a) = fake_connection(&mut connections, &mut registry, "Jan", "general");
        let (_b, mut rx_b) = fake_connection(&mut connections, &mut registry, "Anna", "general");
        let (_c, mut rx_c) = fake_connection(&mut connections, &mut registry, "Piotr", "random");

        let failed =
            broadcast_to_channel(&connections, &registry, &test_message(), "general", Some(a));
        assert!(failed.is_empty());

        // Only the non-excluded general member got it
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
        assert!(rx_c.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_to_all_reaches_every_channel() {
        let mut connections = HashMap::new();
        let mut registry = SessionRegistry::new();

        let (_a, mut rx_a) = fake_connection(&mut connections, &mut registry, "Jan", "general");
        let (_b, mut rx_b) = fake_connection(&mut connections, &mut registry, "Anna", "random");

        let failed = broadcast_to_all(&connections, &registry, &test_message(), None);
        assert!(failed.is_empty());
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_one_dead_recipient_does_not_stop_fan_out() {
        let mut connections = HashMap::new();
        let mut registry = SessionRegistry::new();

        let (dead, rx_dead) = fake_connection(&mut connections, &mut registry, "Jan", "general");
        let (_live, mut rx_live) =
            fake_connection(&mut connections, &mut registry, "Anna", "general");
        drop(rx_dead);

        let failed = broadcast_to_channel(&connections, &registry, &test_message(), "general", None);

        // The dead connection is reported, the live one still delivered,
        // and the registry was left untouched.
        assert_eq!(failed, vec![dead]);
        assert!(rx_live.try_recv().is_ok());
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_send_to_single_connection() {
        let mut connections = HashMap::new();
        let mut registry = SessionRegistry::new();

        let (a, mut rx_a) = fake_connection(&mut connections, &mut registry, "Jan", "general");
        let (_b, mut rx_b) = fake_connection(&mut connections, &mut registry, "Anna", "general");

        send_to(&connections, test_message(), a).unwrap();
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());

        let unknown = ConnectionId::new();
        assert_eq!(
            send_to(&connections, test_message(), unknown),
            Err(SendError::ChannelClosed)
        );
    }
}
