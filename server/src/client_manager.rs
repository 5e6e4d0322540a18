//! Connection registry for the lobby
//!
//! This module tracks everything the server knows about a live connection:
//! - Its display name and whether that name is locked
//! - The games it currently occupies
//! - Whether it follows the open-games feed
//! - The outbox its writer task drains
//!
//! The name index doubles as the table of names in use, so a name can never be
//! held by two connections at once.

use crate::channel::Outbox;
use crate::utils::{generate_guest_name, is_valid_name};
use log::{debug, info};
use shared::protocol::Outbound;
use shared::{ClientError, GameId};
use std::collections::HashMap;

pub type ConnectionId = u64;

/// Server-side state of one connection
///
/// Each client maintains:
/// - Its identity (connection ID and display name)
/// - The games it is seated in, in join order
/// - The outbox its writer task turns into frames
#[derive(Debug)]
pub struct Client {
    /// Unique connection identifier assigned by the server
    pub id: ConnectionId,
    /// Display name; a guest name until the client picks one
    pub name: String,
    /// Set on the first successful join; names are fixed from then on
    pub name_locked: bool,
    /// Games this connection currently occupies
    pub in_games: Vec<GameId>,
    /// Whether this connection receives the open-games feed
    pub subscribed: bool,
    outbox: Outbox,
}

impl Client {
    /// Creates an unsubscribed client that occupies no games
    ///
    /// The name starts unlocked so the client may still rename itself.
    pub fn new(id: ConnectionId, name: String, outbox: Outbox) -> Self {
        Self {
            id,
            name,
            name_locked: false,
            in_games: Vec::new(),
            subscribed: false,
            outbox,
        }
    }

    /// Queues a message; returns false if the writer side is gone
    pub fn send(&self, message: impl Into<Outbound>) -> bool {
        self.outbox.send(message.into()).is_ok()
    }

    /// Checks whether this connection is seated in `game_id`
    pub fn is_in_game(&self, game_id: GameId) -> bool {
        self.in_games.contains(&game_id)
    }
}

/// All live connections, indexed by id and by name
///
/// The ClientManager is the only place names are assigned or changed, which
/// keeps the two indexes in step and names unique among live connections.
pub struct ClientManager {
    /// Connected clients indexed by their unique ID
    clients: HashMap<ConnectionId, Client>,
    /// Reverse index from display name to connection
    names: HashMap<String, ConnectionId>,
    /// Next available ID for new connections
    next_client_id: ConnectionId,
}

impl ClientManager {
    /// Creates an empty registry
    ///
    /// Connection IDs start from 1 and increment for each new connection.
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
            names: HashMap::new(),
            next_client_id: 1,
        }
    }

    /// Registers a connection under a fresh, unused guest name
    ///
    /// Guest names are drawn again until one is free. The new client is not
    /// yet subscribed to the open-games feed; the lobby does that.
    pub fn add_client(&mut self, outbox: Outbox) -> ConnectionId {
        let id = self.next_client_id;
        self.next_client_id += 1;

        let mut name = generate_guest_name();
        while self.names.contains_key(&name) {
            name = generate_guest_name();
        }

        info!("Client {} connected as {}", id, name);
        self.names.insert(name.clone(), id);
        self.clients.insert(id, Client::new(id, name, outbox));
        id
    }

    /// Drops a connection and frees its name
    ///
    /// Returns the removed client, or None if the ID was unknown.
    pub fn remove_client(&mut self, id: ConnectionId) -> Option<Client> {
        let client = self.clients.remove(&id)?;
        self.names.remove(&client.name);
        info!("Client {} ({}) disconnected", id, client.name);
        Some(client)
    }

    /// Looks up a connection by ID
    pub fn get(&self, id: ConnectionId) -> Option<&Client> {
        self.clients.get(&id)
    }

    /// Looks up a connection by ID for modification
    ///
    /// Names must not be changed through this reference; use
    /// [`rename`](ClientManager::rename) so the name index stays correct.
    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Client> {
        self.clients.get_mut(&id)
    }

    /// Finds the connection currently using `name`
    ///
    /// Players are seated in games by name, so this is how the lobby maps a
    /// seat back to the connection that should receive its messages.
    pub fn find_by_name(&self, name: &str) -> Option<ConnectionId> {
        self.names.get(name).copied()
    }

    /// Checks whether any live connection uses `name`
    pub fn is_name_taken(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// Changes a connection's name
    ///
    /// Renaming to the current name is accepted as a no-op. Errors carry the
    /// name the connection keeps.
    pub fn rename(&mut self, id: ConnectionId, name: &str) -> Result<(), ClientError> {
        let Some(client) = self.clients.get(&id) else {
            return Ok(());
        };
        let current = client.name.clone();

        if client.name_locked {
            return Err(ClientError::NameLocked { current });
        }
        if !is_valid_name(name) {
            return Err(ClientError::InvalidName { current });
        }
        if current == name {
            return Ok(());
        }
        if self.is_name_taken(name) {
            return Err(ClientError::NameTaken { current });
        }

        self.names.remove(&current);
        self.names.insert(name.to_string(), id);
        if let Some(client) = self.clients.get_mut(&id) {
            client.name = name.to_string();
        }
        info!("Client {} renamed {} -> {}", id, current, name);
        Ok(())
    }

    /// Queues a message for one connection
    ///
    /// Unknown IDs and closed outboxes are ignored; the connection's own task
    /// cleans up after a closed socket.
    pub fn send(&self, id: ConnectionId, message: impl Into<Outbound>) {
        if let Some(client) = self.clients.get(&id) {
            if !client.send(message) {
                debug!("Dropping message for closed connection {}", id);
            }
        }
    }

    /// Sends a copy of `message` to every open-games subscriber
    pub fn broadcast(&self, message: impl Into<Outbound>) {
        let message = message.into();
        for client in self.subscribers() {
            client.send(message.clone());
        }
    }

    /// Iterates over every connection following the open-games feed
    pub fn subscribers(&self) -> impl Iterator<Item = &Client> {
        self.clients.values().filter(|c| c.subscribed)
    }

    /// Iterates over every connection, subscribed or not
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Client> {
        self.clients.values_mut()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl Default for ClientManager {
    fn default() -> Self {
        Self::new()
    }
}
