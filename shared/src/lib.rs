//! Engine and wire types for a hex-board strategy game
//!
//! This crate has no I/O. It holds everything a server and a client must agree
//! on so both can run the same rules over the same state:
//!
//! - [`hexgrid`]: the compact text format boards and formations are written in
//! - [`board`]: cell storage and neighbour arithmetic
//! - [`options`]: `key=value` game options
//! - [`game`]: the authoritative rules engine
//! - [`protocol`]: JSON messages and frames
//! - [`error`]: client-facing and integrity errors

pub mod board;
pub mod error;
pub mod game;
pub mod hexgrid;
pub mod options;
pub mod protocol;

pub type GameId = u64;

pub use board::{Board, Cell, PieceId};
pub use error::{ClientError, GameError, IntegrityError};
pub use game::{Action, ActionType, Game, GameEvent, Piece, Player};
pub use options::GameOptions;
pub use protocol::{ClientMessage, GameSpec, Outbound, SerializedGame, ServerMessage};
