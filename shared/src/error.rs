//! Error types shared by the engine and the session layer
//!
//! Two classes of failure exist and they are handled very differently:
//!
//! - [`ClientError`] is an expected, recoverable rejection of something a
//!   client asked for. It is reported back to the originating connection only.
//! - [`IntegrityError`] means the engine's own invariants were broken. It is
//!   never reported as a client mistake; callers log it and tear down the
//!   offending connection.

use crate::GameId;
use serde_json::{json, Value};
use thiserror::Error;

/// Recoverable rejection of a client request
///
/// The `Display` text is the human message sent as `error{msg}`. Variants that
/// return a [`code`](ClientError::code) are additionally reported as
/// `error_<code>{data}` so the client can roll back optimistic UI state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClientError {
    #[error("Invalid name")]
    InvalidName { current: String },
    #[error("Name already in use")]
    NameTaken { current: String },
    #[error("You cannot change your name right now")]
    NameLocked { current: String },
    #[error("You have already joined this game")]
    DuplicateJoin,
    #[error("This game is already full")]
    GameFull,
    #[error("You are not in that game")]
    NotInGame,
    #[error("Game id does not exist")]
    GameNotFound(GameId),
    #[error("Invalid action {index}")]
    InvalidAction { game_id: GameId, index: usize },
    #[error("Unexpected action direction: {0}")]
    InvalidDirection(u8),
    #[error("It is not your turn")]
    NotYourTurn { game_id: GameId },
    #[error("A turn needs at least one action")]
    EmptyTurn { game_id: GameId },
}

impl ClientError {
    /// Machine-readable code, used as the suffix of the `error_<code>` message
    pub fn code(&self) -> Option<&'static str> {
        match self {
            ClientError::InvalidName { .. }
            | ClientError::NameTaken { .. }
            | ClientError::NameLocked { .. } => Some("set_name"),
            ClientError::InvalidAction { .. }
            | ClientError::NotYourTurn { .. }
            | ClientError::EmptyTurn { .. } => Some("turn"),
            _ => None,
        }
    }

    /// Structured payload that accompanies [`code`](ClientError::code)
    pub fn data(&self) -> Value {
        match self {
            ClientError::InvalidName { current }
            | ClientError::NameTaken { current }
            | ClientError::NameLocked { current } => json!({ "name": current }),
            ClientError::InvalidAction { game_id, index } => {
                json!({ "game_id": game_id, "index": index })
            }
            ClientError::NotYourTurn { game_id } | ClientError::EmptyTurn { game_id } => {
                json!({ "game_id": game_id })
            }
            _ => Value::Null,
        }
    }
}

/// Violated engine invariant
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityError {
    #[error("action destination {0} is not a playable cell")]
    ImpassableDestination(usize),
    #[error("piece placement at {0} failed after validation")]
    Placement(usize),
}

/// Any failure surfaced by the engine
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GameError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("integrity violation: {0}")]
    Integrity(#[from] IntegrityError),
}
