//! Message protocol definitions
//!
//! Every frame in both directions is a JSON envelope `{"type": ..., "payload": ...}`.
//! Server-to-client messages use Serde's adjacently tagged enum, which produces
//! exactly that shape. Client-to-server frames are decoded in two stages
//! (envelope first, then the typed payload) so that an unrecognized `type`
//! can be reported back verbatim instead of as a generic parse error.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::{Channel, ChannelKind, StoredMessage};

/// A user reference as it appears on the wire: `{id, name}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRef {
    pub id: String,
    pub name: String,
}

/// A channel as it appears on the wire: `{id, name, type}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelInfo {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ChannelKind,
}

/// A chat message as it appears on the wire
///
/// `edited_at` is reserved and omitted from the JSON unless set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WireMessage {
    pub id: String,
    pub user: UserRef,
    pub text: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<String>,
}

impl From<Channel> for ChannelInfo {
    fn from(c: Channel) -> Self {
        Self {
            id: c.id,
            name: c.name,
            kind: c.kind,
        }
    }
}

impl From<StoredMessage> for WireMessage {
    fn from(m: StoredMessage) -> Self {
        Self {
            id: m.id,
            user: UserRef {
                id: m.user_id,
                name: m.username,
            },
            text: m.text,
            timestamp: m.created_at,
            edited_at: m.edited_at,
        }
    }
}

/// The history block inside `auth_success`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelHistory {
    pub channel_id: String,
    pub messages: Vec<WireMessage>,
}

/// Server → Client message
///
/// Serializes to the `{"type": ..., "payload": {...}}` envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Handshake succeeded: identity, channel list, online snapshot and
    /// the default channel's recent history, as one payload
    AuthSuccess {
        user_info: UserRef,
        channels: Vec<ChannelInfo>,
        online_users: Vec<UserRef>,
        initial_channel_history: ChannelHistory,
    },
    /// Handshake rejected; the connection is closed after this frame
    AuthFailure { reason: String },
    /// A new chat message, broadcast to the channel including the sender
    NewMessage {
        channel_id: String,
        message: WireMessage,
    },
    /// Reply to `request_history`, sent to the requester only
    ChatHistory {
        channel_id: String,
        messages: Vec<WireMessage>,
    },
    /// Another user completed the handshake
    UserJoined { user: UserRef },
    /// Another user disconnected
    UserLeft { user: UserRef },
    /// Fresh online-user snapshot
    UserListUpdate { online_users: Vec<UserRef> },
    /// Non-fatal error reply to the sender only
    ErrorMessage { message: String },
}

/// Client → Server message, after envelope decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    AuthRequest { username: String, password: String },
    SendMessage { channel_id: String, text: String },
    RequestHistory { channel_id: String },
}

/// Errors produced while decoding a client frame
///
/// The display strings are client-facing: they are sent back in
/// `error_message` (active phase) or as an `auth_failure` reason
/// (handshake phase).
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The frame is not valid JSON or not a `{type, payload}` object
    #[error("Invalid JSON format")]
    InvalidJson(#[source] serde_json::Error),

    /// The envelope carried a type this server does not understand
    #[error("Unknown message type: {0}")]
    UnknownType(String),

    /// The payload does not have the shape the type requires
    #[error("Invalid payload: {0}")]
    InvalidPayload(#[source] serde_json::Error),
}

/// Raw envelope, stage one of decoding
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: serde_json::Value,
}

/// Missing string fields decode as empty so that validation, not parsing,
/// reports them (matches the wire contract's lenient payload handling).
#[derive(Debug, Deserialize)]
struct AuthRequestPayload {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Deserialize)]
struct SendMessagePayload {
    #[serde(default)]
    channel_id: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct RequestHistoryPayload {
    #[serde(default)]
    channel_id: String,
}

/// Decode one client frame into a typed [`ClientMessage`]
pub fn decode_client_message(text: &str) -> Result<ClientMessage, DecodeError> {
    let envelope: Envelope = serde_json::from_str(text).map_err(DecodeError::InvalidJson)?;

    // An absent payload behaves like an empty one
    let payload = if envelope.payload.is_null() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        envelope.payload
    };

    match envelope.kind.as_str() {
        "auth_request" => {
            let p: AuthRequestPayload =
                serde_json::from_value(payload).map_err(DecodeError::InvalidPayload)?;
            Ok(ClientMessage::AuthRequest {
                username: p.username,
                password: p.password,
            })
        }
        "send_message" => {
            let p: SendMessagePayload =
                serde_json::from_value(payload).map_err(DecodeError::InvalidPayload)?;
            Ok(ClientMessage::SendMessage {
                channel_id: p.channel_id,
                text: p.text,
            })
        }
        "request_history" => {
            let p: RequestHistoryPayload =
                serde_json::from_value(payload).map_err(DecodeError::InvalidPayload)?;
            Ok(ClientMessage::RequestHistory {
                channel_id: p.channel_id,
            })
        }
        other => Err(DecodeError::UnknownType(other.to_string())),
    }
}
