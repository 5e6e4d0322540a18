//! Wire protocol
//!
//! Every message is a JSON object tagged by its kind in the `q` field, and every
//! frame is a JSON array of such objects processed in order.

use crate::error::ClientError;
use crate::game::Action;
use crate::GameId;
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The three descriptors a game is built from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSpec {
    pub board: String,
    pub formation: String,
    #[serde(default)]
    pub options: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedGame {
    pub game_id: GameId,
    pub board: String,
    pub formation: String,
    #[serde(default)]
    pub options: String,
    #[serde(default)]
    pub player_names: Vec<Option<String>>,
}

impl SerializedGame {
    pub fn spec(&self) -> GameSpec {
        GameSpec {
            board: self.board.clone(),
            formation: self.formation.clone(),
            options: self.options.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "q", rename_all = "snake_case")]
pub enum ClientMessage {
    SetName { name: String },
    CreateGame { game: GameSpec },
    JoinGame { game_id: GameId },
    LeaveGame { game_id: GameId },
    Turn { game_id: GameId, actions: Vec<Action> },
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::SetName { .. } => "set_name",
            ClientMessage::CreateGame { .. } => "create_game",
            ClientMessage::JoinGame { .. } => "join_game",
            ClientMessage::LeaveGame { .. } => "leave_game",
            ClientMessage::Turn { .. } => "turn",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "q", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms a rename, or corrects the client after a rejected one
    SetName { name: String },
    Error { msg: String },
    OpenGamesPush { game: SerializedGame },
    /// `player_id` is the receiver's own seat when the game started with them in it
    OpenGamesPop {
        game_id: GameId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_id: Option<usize>,
    },
    JoinGameNotif { game_id: GameId, player_name: String },
    LeaveGameNotif { game_id: GameId, player_name: String },
    Turn { game_id: GameId, actions: Vec<Action> },
    GameOver { game_id: GameId, player_id: usize },
}

/// Anything the server can put in a frame
///
/// Coded errors use a kind built at runtime (`error_<code>`), so they cannot be
/// a variant of [`ServerMessage`].
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Message(ServerMessage),
    CodedError { code: String, data: Value },
}

impl Outbound {
    /// The messages reporting `err` to the connection that caused it
    pub fn client_error(err: &ClientError) -> Vec<Outbound> {
        let mut out = vec![Outbound::Message(ServerMessage::Error {
            msg: err.to_string(),
        })];
        if let Some(code) = err.code() {
            out.push(Outbound::CodedError {
                code: code.to_string(),
                data: err.data(),
            });
        }
        out
    }

    pub fn kind(&self) -> String {
        match self {
            Outbound::Message(msg) => serde_json::to_value(msg)
                .ok()
                .and_then(|v| v.get("q").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_default(),
            Outbound::CodedError { code, .. } => format!("error_{}", code),
        }
    }
}

impl From<ServerMessage> for Outbound {
    fn from(msg: ServerMessage) -> Self {
        Outbound::Message(msg)
    }
}

impl Serialize for Outbound {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Outbound::Message(msg) => msg.serialize(serializer),
            Outbound::CodedError { code, data } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("q", &format!("error_{}", code))?;
                map.serialize_entry("data", data)?;
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Outbound {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let kind = value.get("q").and_then(Value::as_str).unwrap_or_default();

        if let Some(code) = kind.strip_prefix("error_") {
            return Ok(Outbound::CodedError {
                code: code.to_string(),
                data: value.get("data").cloned().unwrap_or(Value::Null),
            });
        }
        ServerMessage::deserialize(value)
            .map(Outbound::Message)
            .map_err(de::Error::custom)
    }
}

/// Splits a frame into its messages
///
/// Fails only when the frame is not a JSON array. Each element is decoded on its
/// own, so one bad element does not hide the others.
pub fn decode_frame<T: DeserializeOwned>(
    text: &str,
) -> Result<Vec<Result<T, serde_json::Error>>, serde_json::Error> {
    let elements: Vec<Value> = serde_json::from_str(text)?;
    Ok(elements.into_iter().map(serde_json::from_value).collect())
}

pub fn encode_frame<T: Serialize>(messages: &[T]) -> Result<String, serde_json::Error> {
    serde_json::to_string(messages)
}
