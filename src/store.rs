//! Durable store collaborator
//!
//! The server talks to persistence through the narrow [`ChatStore`] contract:
//! user lookup, channel listing, recent-history reads and message appends.
//! [`MemoryStore`] is the in-process implementation, an append-only log per
//! channel behind one mutex so that id and timestamp assignment happen
//! atomically at write time.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Errors from the store collaborator
///
/// The active message loop reports these to the sender as a generic
/// `error_message` and keeps the connection open.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Channel visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Public,
    Private,
}

/// Durable user record
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    pub password: String,
    pub created_at: String,
}

/// Durable channel record
#[derive(Debug, Clone)]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub kind: ChannelKind,
    pub created_at: String,
}

/// A stored message joined with its author's username
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: String,
    pub channel_id: String,
    pub user_id: String,
    pub username: String,
    pub text: String,
    pub created_at: String,
    pub edited_at: Option<String>,
}

/// The persistence contract the server depends on
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    async fn get_all_channels(&self) -> Result<Vec<Channel>, StoreError>;

    /// The most recent `limit` messages of a channel, in chronological order
    async fn get_messages_for_channel(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, StoreError>;

    /// Append a message; id and timestamp are assigned here, at write time
    async fn add_message(
        &self,
        channel_id: &str,
        user_id: &str,
        text: &str,
    ) -> Result<(String, String), StoreError>;
}

/// Current time as ISO 8601 UTC with second precision and a literal `Z`
///
/// Format: `2025-09-28T10:05:00Z`. Clients compare these lexicographically,
/// so the exact shape is part of the wire contract.
pub fn now_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[derive(Debug, Default)]
struct StoreInner {
    users: Vec<User>,
    channels: Vec<Channel>,
    // Append order doubles as the tie-break for same-second timestamps
    messages: Vec<MessageRow>,
}

#[derive(Debug, Clone)]
struct MessageRow {
    id: String,
    channel_id: String,
    user_id: String,
    text: String,
    created_at: String,
    edited_at: Option<String>,
}

/// In-memory [`ChatStore`] implementation
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<StoreInner>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with the demo dataset: three users
    /// sharing one password, two public channels and a handful of messages
    /// in `general`.
    pub async fn seeded() -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.lock().await;

            for (id, username) in [("user_1", "Jan"), ("user_2", "Anna"), ("user_3", "Piotr")] {
                inner.users.push(User {
                    id: id.to_string(),
                    username: username.to_string(),
                    password: "ircAMP2024!".to_string(),
                    created_at: now_timestamp(),
                });
            }

            for (id, name) in [("general", "Ogólny"), ("random", "Ciekawostki")] {
                inner.channels.push(Channel {
                    id: id.to_string(),
                    name: name.to_string(),
                    kind: ChannelKind::Public,
                    created_at: now_timestamp(),
                });
            }

            let seed_messages = [
                ("user_2", "Cześć wszystkim!"),
                ("user_1", "Hej! Jak leci?"),
                ("user_3", "Witam! Super że tu jesteśmy"),
                ("user_2", "Ktoś już testował nowy projekt?"),
                ("user_1", "Ja zaczynam właśnie!"),
                ("user_3", "Trzymajcie się! Do roboty! 💪"),
                ("user_2", "Powodzenia wszystkim!"),
            ];
            for (user_id, text) in seed_messages {
                let id = new_message_id();
                inner.messages.push(MessageRow {
                    id,
                    channel_id: "general".to_string(),
                    user_id: user_id.to_string(),
                    text: text.to_string(),
                    created_at: now_timestamp(),
                    edited_at: None,
                });
            }
        }
        store
    }

    /// Insert a user directly (test setup)
    pub async fn insert_user(&self, id: &str, username: &str, password: &str) {
        let mut inner = self.inner.lock().await;
        inner.users.push(User {
            id: id.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            created_at: now_timestamp(),
        });
    }

}

fn new_message_id() -> String {
    format!("msg_{}", &Uuid::new_v4().simple().to_string()[..8])
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.users.iter().find(|u| u.username == username).cloned())
    }

    async fn get_all_channels(&self) -> Result<Vec<Channel>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.channels.clone())
    }

    async fn get_messages_for_channel(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let inner = self.inner.lock().await;

        let rows: Vec<&MessageRow> = inner
            .messages
            .iter()
            .filter(|m| m.channel_id == channel_id)
            .collect();

        // Append order is chronological; take the tail for the most
        // recent `limit` entries.
        let start = rows.len().saturating_sub(limit);
        let messages = rows[start..]
            .iter()
            .map(|row| {
                let username = inner
                    .users
                    .iter()
                    .find(|u| u.id == row.user_id)
                    .map(|u| u.username.clone())
                    .unwrap_or_default();
                StoredMessage {
                    id: row.id.clone(),
                    channel_id: row.channel_id.clone(),
                    user_id: row.user_id.clone(),
                    username,
                    text: row.text.clone(),
                    created_at: row.created_at.clone(),
                    edited_at: row.edited_at.clone(),
                }
            })
            .collect();

        Ok(messages)
    }

    async fn add_message(
        &self,
        channel_id: &str,
        user_id: &str,
        text: &str,
    ) -> Result<(String, String), StoreError> {
        let mut inner = self.inner.lock().await;

        let id = new_message_id();
        let timestamp = now_timestamp();
        inner.messages.push(MessageRow {
            id: id.clone(),
            channel_id: channel_id.to_string(),
            user_id: user_id.to_string(),
            text: text.to_string(),
            created_at: timestamp.clone(),
            edited_at: None,
        });

        Ok((id, timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_format() {
        let ts = now_timestamp();
        // 2025-09-28T10:05:00Z
        assert_eq!(ts.len(), 20);
        assert_eq!(&ts[4..5], "-");
        assert_eq!(&ts[10..11], "T");
        assert!(ts.ends_with('Z'));
    }

    #[tokio::test]
    async fn test_seeded_store_contents() {
        let store = MemoryStore::seeded().await;

        let user = store.get_user_by_username("Jan").await.unwrap().unwrap();
        assert_eq!(user.id, "user_1");
        assert_eq!(user.password, "ircAMP2024!");

        assert!(store
            .get_user_by_username("nobody")
            .await
            .unwrap()
            .is_none());

        let channels = store.get_all_channels().await.unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].id, "general");
        assert_eq!(channels[0].kind, ChannelKind::Public);

        let history = store.get_messages_for_channel("general", 50).await.unwrap();
        assert_eq!(history.len(), 7);
        assert_eq!(history[0].username, "Anna");
    }

    #[tokio::test]
    async fn test_add_message_round_trip_preserves_unicode() {
        let store = MemoryStore::new();
        store.insert_user("user_1", "Jan", "pw").await;

        let text = "Zażółć gęślą jaźń 🎉💪";
        let (id, timestamp) = store.add_message("general", "user_1", text).await.unwrap();
        assert!(id.starts_with("msg_"));
        assert!(timestamp.ends_with('Z'));

        let history = store.get_messages_for_channel("general", 50).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].text, text);
        assert_eq!(history[0].id, id);
        assert_eq!(history[0].created_at, timestamp);
        assert_eq!(history[0].username, "Jan");
    }

    #[tokio::test]
    async fn test_history_returns_most_recent_in_order() {
        let store = MemoryStore::new();
        store.insert_user("user_1", "Jan", "pw").await;

        for i in 0..10 {
            store
                .add_message("general", "user_1", &format!("message {i}"))
                .await
                .unwrap();
        }

        // Tail of the log, still in chronological order
        let history = store.get_messages_for_channel("general", 4).await.unwrap();
        assert_eq!(history.len(), 4);
        let texts: Vec<&str> = history.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["message 6", "message 7", "message 8", "message 9"]);
    }

    #[tokio::test]
    async fn test_history_filters_by_channel() {
        let store = MemoryStore::new();
        store.insert_user("user_1", "Jan", "pw").await;

        store.add_message("general", "user_1", "in general").await.unwrap();
        store.add_message("random", "user_1", "in random").await.unwrap();

        let history = store.get_messages_for_channel("random", 50).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].text, "in random");

        let empty = store.get_messages_for_channel("missing", 50).await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_message_ids_unique() {
        let store = MemoryStore::new();
        store.insert_user("user_1", "Jan", "pw").await;

        let (id_a, _) = store.add_message("general", "user_1", "a").await.unwrap();
        let (id_b, _) = store.add_message("general", "user_1", "b").await.unwrap();
        assert_ne!(id_a, id_b);
    }
}
