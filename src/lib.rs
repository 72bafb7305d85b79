//! Real-Time Team Chat Server Library
//!
//! A WebSocket group-chat backend built with tokio-tungstenite using the
//! Actor pattern for state management.
//!
//! # Features
//! - Authentication handshake gating every connection
//! - Live-session registry with username uniqueness
//! - Channel-scoped and server-wide message broadcast
//! - Durable message history through a narrow store contract
//! - Online-presence notifications (user joined/left, user list)
//! - Disconnection handling with idempotent cleanup
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `ChatServer` is the central actor owning the connection map and the
//!   session registry
//! - Each connection has a `handler` task communicating with the server
//! - No locks needed - all state access goes through message passing
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use tokio::sync::mpsc;
//! use team_chat_server::{handle_connection, ChatServer, MemoryStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     let store = Arc::new(MemoryStore::seeded().await);
//!     let (cmd_tx, cmd_rx) = mpsc::channel(256);
//!
//!     tokio::spawn(ChatServer::new(cmd_rx, store).run());
//!
//!     while let Ok((stream, _)) = listener.accept().await {
//!         let cmd_tx = cmd_tx.clone();
//!         tokio::spawn(handle_connection(stream, cmd_tx));
//!     }
//! }
//! ```

pub mod broadcast;
pub mod connection;
pub mod error;
pub mod handler;
pub mod message;
pub mod registry;
pub mod server;
pub mod store;
pub mod types;
pub mod validate;

// Re-export main types for convenience
pub use connection::ConnectionHandle;
pub use error::{AppError, SendError};
pub use handler::{handle_connection, ConnectionState};
pub use message::{ClientMessage, ServerMessage};
pub use registry::{Session, SessionRegistry};
pub use server::{ChatServer, ServerCommand};
pub use store::{ChatStore, MemoryStore};
pub use types::ConnectionId;
