//! # Game Server Library
//!
//! Authoritative lobby and game host for the hex-board strategy game. Clients
//! connect over WebSocket, pick a name, browse and create games, and submit
//! whole turns which the server re-validates against its own copy of every
//! game before relaying them to the other players.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Rules
//! Every turn is replayed through the shared engine on the server. A batch of
//! actions either applies completely or not at all; clients never see a
//! half-applied turn.
//!
//! ### Session Management
//! Handles the lifecycle of a connection:
//! - Guest naming and renaming until the first join
//! - The open-games feed every connection is subscribed to
//! - Joining, leaving and the open→running transition
//! - Implicit leave on disconnect
//!
//! ## Architecture Design
//!
//! ### One Task per Connection
//! Each connection gets a reader task that dispatches inbound messages and a
//! writer task that drains its outbox. Games are shared between the readers of
//! their players, so every game sits behind its own mutex and turns for the
//! same game are applied one at a time.
//!
//! ### Coalesced Output
//! Messages produced for a connection within one scheduling tick leave as a
//! single JSON-array frame, in the order they were produced.
//!
//! ## Module Organization
//!
//! ### Client Manager Module (`client_manager`)
//! Connection registry: names, occupied games, subscriptions and outboxes.
//!
//! ### Lobby Module (`lobby`)
//! The session operations (`set_name`, `create_game`, `join_game`,
//! `leave_game`, `turn`) and the fan-out of their notifications.
//!
//! ### Channel Module (`channel`)
//! Outbox type, frame batching and tolerant inbound decoding.
//!
//! ### Network Module (`network`)
//! TCP listener, WebSocket handshake and the per-connection tasks.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         port: 9000,
//!         ..ServerConfig::default()
//!     };
//!     let server = Server::new(&config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod client_manager;
pub mod lobby;
pub mod network;
pub mod utils;
