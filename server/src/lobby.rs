//! Session layer: names, the open-games feed, joins and turns
//!
//! Shared state is split three ways so unrelated games never contend:
//! - `clients`: the connection registry
//! - `games`: the game table with its open and running lists
//! - one mutex per game
//!
//! Lock order: a game's mutex may be held while briefly taking `clients` or
//! `games`, never the other way round, and no task ever holds two game locks.

use crate::channel::Outbox;
use crate::client_manager::{ClientManager, ConnectionId};
use log::{debug, error, info, warn};
use shared::error::{ClientError, GameError, IntegrityError};
use shared::game::{Action, Game, GameEvent, Player};
use shared::protocol::{ClientMessage, GameSpec, Outbound, ServerMessage};
use shared::GameId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

pub type SharedGame = Arc<Mutex<Game>>;

#[derive(Default)]
struct GameRegistry {
    games: HashMap<GameId, SharedGame>,
    open: Vec<GameId>,
    running: Vec<GameId>,
    next_game_id: GameId,
}

/// Session state shared by every connection task
///
/// Every operation takes the connection it acts for and reports rejections
/// as [`GameError`]; [`dispatch`](Lobby::dispatch) turns those into messages
/// for that connection.
pub struct Lobby {
    clients: RwLock<ClientManager>,
    games: RwLock<GameRegistry>,
    max_radius: u32,
}

impl Lobby {
    /// Creates an empty lobby; boards larger than `max_radius` are clamped
    pub fn new(max_radius: u32) -> Self {
        Self {
            clients: RwLock::new(ClientManager::new()),
            games: RwLock::new(GameRegistry::default()),
            max_radius,
        }
    }

    /// Registers a connection, names it and subscribes it to the open-games feed
    pub async fn connect(&self, outbox: Outbox) -> ConnectionId {
        let (id, name) = {
            let mut clients = self.clients.write().await;
            let id = clients.add_client(outbox);
            match clients.get_mut(id) {
                Some(client) => {
                    client.subscribed = true;
                    (id, client.name.clone())
                }
                None => (id, String::new()),
            }
        };
        self.send(id, ServerMessage::SetName { name }).await;

        for game in self.open_games().await {
            let data = game.lock().await.serialize();
            self.send(id, ServerMessage::OpenGamesPush { game: data }).await;
        }
        id
    }

    /// Unsubscribes, leaves every occupied game and frees the name
    pub async fn disconnect(&self, conn: ConnectionId) {
        let games = {
            let mut clients = self.clients.write().await;
            let Some(client) = clients.get_mut(conn) else {
                return;
            };
            client.subscribed = false;
            client.in_games.clone()
        };

        for game_id in games {
            if let Err(e) = self.leave_game(conn, game_id).await {
                debug!("Client {} could not leave game {}: {}", conn, game_id, e);
            }
        }
        self.clients.write().await.remove_client(conn);
    }

    /// Runs one inbound message
    ///
    /// Client errors are reported to `conn` and swallowed. Integrity errors are
    /// logged and returned so the caller can drop the connection.
    pub async fn dispatch(
        &self,
        conn: ConnectionId,
        message: ClientMessage,
    ) -> Result<(), IntegrityError> {
        let kind = message.kind();
        let result = match message {
            ClientMessage::SetName { name } => self.set_name(conn, &name).await,
            ClientMessage::CreateGame { game } => self.create_game(conn, &game).await.map(|_| ()),
            ClientMessage::JoinGame { game_id } => self.join_game(conn, game_id).await,
            ClientMessage::LeaveGame { game_id } => self.leave_game(conn, game_id).await,
            ClientMessage::Turn { game_id, actions } => self.turn(conn, game_id, actions).await,
        };

        match result {
            Ok(()) => Ok(()),
            Err(GameError::Client(err)) => {
                debug!("Client {} {} rejected: {}", conn, kind, err);
                let clients = self.clients.read().await;
                for message in Outbound::client_error(&err) {
                    clients.send(conn, message);
                }
                Ok(())
            }
            Err(GameError::Integrity(err)) => {
                error!("Client {} {} broke game integrity: {}", conn, kind, err);
                Err(err)
            }
        }
    }

    /// Renames a connection and echoes the accepted name back to it
    ///
    /// Fails once the connection has joined a game, or if the name is invalid
    /// or held by another connection. The errors carry the name it keeps.
    pub async fn set_name(&self, conn: ConnectionId, name: &str) -> Result<(), GameError> {
        let mut clients = self.clients.write().await;
        clients.rename(conn, name)?;
        clients.send(
            conn,
            ServerMessage::SetName {
                name: name.to_string(),
            },
        );
        Ok(())
    }

    /// Creates an open game, advertises it and seats its creator
    pub async fn create_game(&self, conn: ConnectionId, spec: &GameSpec) -> Result<GameId, GameError> {
        let game_id = {
            let mut registry = self.games.write().await;
            let id = registry.next_game_id;
            registry.next_game_id += 1;
            id
        };

        let mut game = Game::from_spec(game_id, spec, self.max_radius);
        for event in game.take_events() {
            if let GameEvent::Warning(warning) = event {
                warn!("Game {}: {}", game_id, warning);
            }
        }
        let data = game.serialize();

        {
            let mut registry = self.games.write().await;
            registry.games.insert(game_id, Arc::new(Mutex::new(game)));
            registry.open.push(game_id);
        }
        info!("Client {} created game {}", conn, game_id);
        self.clients
            .read()
            .await
            .broadcast(ServerMessage::OpenGamesPush { game: data });

        self.join_game(conn, game_id).await?;
        Ok(game_id)
    }

    /// Seats a connection in an open game
    ///
    /// Locks the connection's name and tells every subscriber about the join.
    /// When the join fills the game it moves to running before the game lock
    /// is released, then every subscriber gets its `open_games_pop` and the
    /// players are pulled out of their other games.
    pub async fn join_game(&self, conn: ConnectionId, game_id: GameId) -> Result<(), GameError> {
        let shared = self.game(game_id).await?;
        let Some(name) = self.client_name(conn).await else {
            return Ok(());
        };

        let mut game = shared.lock().await;
        self.ensure_registered(game_id).await?;
        let full = game.join_player(Player::new(name.clone()))?;
        game.take_events();

        {
            let mut clients = self.clients.write().await;
            if let Some(client) = clients.get_mut(conn) {
                client.name_locked = true;
                if !client.is_in_game(game_id) {
                    client.in_games.push(game_id);
                }
            }
            clients.broadcast(ServerMessage::JoinGameNotif {
                game_id,
                player_name: name.clone(),
            });
        }
        info!("{} joined game {}", name, game_id);

        if !full {
            return Ok(());
        }
        let seats: HashMap<String, usize> = game
            .players()
            .iter()
            .enumerate()
            .filter_map(|(seat, p)| p.as_ref().map(|p| (p.name().to_string(), seat)))
            .collect();
        {
            let mut registry = self.games.write().await;
            registry.open.retain(|id| *id != game_id);
            registry.running.push(game_id);
        }
        drop(game);

        self.start_game(game_id, seats).await;
        Ok(())
    }

    /// Takes a connection out of a game
    ///
    /// Leaving a running game forfeits. A game left empty, or decided by the
    /// forfeit, is dropped from the registry while its lock is still held, so
    /// no join or turn queued behind the leave can reach it.
    pub async fn leave_game(&self, conn: ConnectionId, game_id: GameId) -> Result<(), GameError> {
        let shared = self.game(game_id).await?;
        let Some(name) = self.client_name(conn).await else {
            return Ok(());
        };

        let mut game = shared.lock().await;
        self.ensure_registered(game_id).await?;
        let empty = game.leave_player(&name)?;
        let events = game.take_events();
        let players = self.player_connections(&game).await;
        let removed = if empty || is_decided(&events) {
            self.unregister(game_id).await
        } else {
            None
        };
        drop(game);

        {
            let mut clients = self.clients.write().await;
            if let Some(client) = clients.get_mut(conn) {
                client.in_games.retain(|id| *id != game_id);
            }
            clients.broadcast(ServerMessage::LeaveGameNotif {
                game_id,
                player_name: name.clone(),
            });
        }
        info!("{} left game {}", name, game_id);

        self.apply_events(game_id, events, &players).await;
        if let Some(was_open) = removed {
            self.retire(game_id, was_open).await;
        }
        Ok(())
    }

    /// Applies a submitted turn and relays it to the other players
    ///
    /// The batch is all-or-nothing. Turns for one game are applied one at a
    /// time under its lock; a turn that ends the match retires the game
    /// before the lock is released.
    pub async fn turn(
        &self,
        conn: ConnectionId,
        game_id: GameId,
        actions: Vec<Action>,
    ) -> Result<(), GameError> {
        let shared = self.game(game_id).await?;
        let (name, in_game) = {
            let clients = self.clients.read().await;
            match clients.get(conn) {
                Some(client) => (client.name.clone(), client.is_in_game(game_id)),
                None => return Ok(()),
            }
        };
        if !in_game {
            return Err(ClientError::NotInGame.into());
        }

        let mut game = shared.lock().await;
        self.ensure_registered(game_id).await?;
        let seat = game.seat_of(&name).ok_or(ClientError::NotInGame)?;
        let applied = game.play_turn(seat, actions)?;
        let events = game.take_events();
        let players = self.player_connections(&game).await;
        let removed = if is_decided(&events) {
            self.unregister(game_id).await
        } else {
            None
        };
        drop(game);

        debug!("Game {}: {} played {} actions", game_id, name, applied.len());
        {
            let clients = self.clients.read().await;
            for (id, _) in players.iter().filter(|(id, _)| *id != conn) {
                clients.send(
                    *id,
                    ServerMessage::Turn {
                        game_id,
                        actions: applied.clone(),
                    },
                );
            }
        }

        self.apply_events(game_id, events, &players).await;
        if let Some(was_open) = removed {
            self.retire(game_id, was_open).await;
        }
        Ok(())
    }

    /// Shared handle to a registered game
    ///
    /// Returns GameNotFound once the game has been retired.
    pub async fn game(&self, game_id: GameId) -> Result<SharedGame, ClientError> {
        self.games
            .read()
            .await
            .games
            .get(&game_id)
            .cloned()
            .ok_or(ClientError::GameNotFound(game_id))
    }

    /// IDs of games still accepting players, oldest first
    pub async fn open_game_ids(&self) -> Vec<GameId> {
        self.games.read().await.open.clone()
    }

    /// IDs of full games in progress, in start order
    pub async fn running_game_ids(&self) -> Vec<GameId> {
        self.games.read().await.running.clone()
    }

    pub async fn client_name(&self, conn: ConnectionId) -> Option<String> {
        self.clients.read().await.get(conn).map(|c| c.name.clone())
    }

    /// Games the connection currently occupies; empty for unknown connections
    pub async fn client_games(&self, conn: ConnectionId) -> Vec<GameId> {
        self.clients
            .read()
            .await
            .get(conn)
            .map(|c| c.in_games.clone())
            .unwrap_or_default()
    }

    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    async fn send(&self, conn: ConnectionId, message: impl Into<Outbound>) {
        self.clients.read().await.send(conn, message);
    }

    async fn open_games(&self) -> Vec<SharedGame> {
        let registry = self.games.read().await;
        registry
            .open
            .iter()
            .filter_map(|id| registry.games.get(id).cloned())
            .collect()
    }

    /// Fails for a game retired while the caller waited for its lock
    async fn ensure_registered(&self, game_id: GameId) -> Result<(), ClientError> {
        if self.games.read().await.games.contains_key(&game_id) {
            Ok(())
        } else {
            Err(ClientError::GameNotFound(game_id))
        }
    }

    /// Connection and seat of every seated player
    async fn player_connections(&self, game: &Game) -> Vec<(ConnectionId, usize)> {
        let clients = self.clients.read().await;
        game.players()
            .iter()
            .enumerate()
            .filter_map(|(seat, p)| {
                p.as_ref()
                    .and_then(|p| clients.find_by_name(p.name()))
                    .map(|id| (id, seat))
            })
            .collect()
    }

    /// Announces a game that already moved to running and pulls its players
    /// out of their other games
    async fn start_game(&self, game_id: GameId, seats: HashMap<String, usize>) {
        let participants: Vec<(ConnectionId, Vec<GameId>)> = {
            let clients = self.clients.read().await;
            for client in clients.subscribers() {
                client.send(ServerMessage::OpenGamesPop {
                    game_id,
                    player_id: seats.get(&client.name).copied(),
                });
            }
            seats
                .keys()
                .filter_map(|name| clients.find_by_name(name))
                .filter_map(|id| clients.get(id))
                .map(|c| {
                    let others = c.in_games.iter().copied().filter(|g| *g != game_id);
                    (c.id, others.collect())
                })
                .collect()
        };
        info!("Game {} started with {} players", game_id, seats.len());

        for (conn, others) in participants {
            for other in others {
                if let Err(e) = self.leave_game(conn, other).await {
                    debug!("Client {} could not leave game {}: {}", conn, other, e);
                }
            }
        }
    }

    async fn apply_events(
        &self,
        game_id: GameId,
        events: Vec<GameEvent>,
        players: &[(ConnectionId, usize)],
    ) {
        for event in events {
            match event {
                GameEvent::Warning(warning) => warn!("Game {}: {}", game_id, warning),
                GameEvent::PlayerEliminated { player_id } => {
                    info!("Game {}: player {} eliminated", game_id, player_id);
                }
                GameEvent::GameOver { winner } => {
                    info!("Game {} over, player {} wins", game_id, winner);
                    let clients = self.clients.read().await;
                    for (id, _) in players {
                        clients.send(
                            *id,
                            ServerMessage::GameOver {
                                game_id,
                                player_id: winner,
                            },
                        );
                    }
                }
                _ => {}
            }
        }
    }

    /// Drops a game from the registry; must be called with the game locked
    ///
    /// Returns whether the game was still open, or None if it was already gone.
    async fn unregister(&self, game_id: GameId) -> Option<bool> {
        let mut registry = self.games.write().await;
        registry.games.remove(&game_id)?;
        let was_open = registry.open.contains(&game_id);
        registry.open.retain(|id| *id != game_id);
        registry.running.retain(|id| *id != game_id);
        Some(was_open)
    }

    /// Clears an unregistered game from every connection; open games are
    /// popped from the feed
    async fn retire(&self, game_id: GameId, was_open: bool) {
        let mut clients = self.clients.write().await;
        for client in clients.iter_mut() {
            client.in_games.retain(|g| *g != game_id);
        }
        if was_open {
            clients.broadcast(ServerMessage::OpenGamesPop {
                game_id,
                player_id: None,
            });
        }
        debug!("Game {} removed", game_id);
    }
}

fn is_decided(events: &[GameEvent]) -> bool {
    events
        .iter()
        .any(|e| matches!(e, GameEvent::GameOver { .. }))
}
