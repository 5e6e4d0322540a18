//! Authoritative game state
//!
//! A [`Game`] is built from three descriptor strings (board, formation,
//! options) which are kept verbatim so the game can be re-serialized and
//! rebuilt elsewhere. Every mutation queues [`GameEvent`]s; callers drain them
//! with [`Game::take_events`] and decide how to fan them out.
//!
//! Turn rules:
//! - Only the current player's pieces have actions.
//! - A move (single step) is legal only as the first action of a turn.
//! - Shots need a "glider": the two cells diagonally behind the firer hold
//!   friendly pieces and the cell directly behind is empty. Any number of shots
//!   may be chained, but the first non-shot action ends shooting for the turn.
//! - Spawning is disabled.

use crate::board::{Board, Cell, PieceId};
use crate::error::{ClientError, GameError, IntegrityError};
use crate::hexgrid::{self, GridVisitor, Token, DEFAULT_MAX_RADIUS};
use crate::options::GameOptions;
use crate::protocol::{GameSpec, SerializedGame};
use crate::GameId;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
    Move,
    Shoot,
    Spawn,
}

/// One step of a turn as it travels over the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: ActionType,
    pub dir: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dist: Option<u32>,
    /// Origin cell of the acting piece, filled in by the engine that applied it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<usize>,
}

impl Action {
    pub fn movement(dir: u8) -> Self {
        Self {
            kind: ActionType::Move,
            dir,
            dist: None,
            loc: None,
        }
    }

    pub fn shot(dir: u8, dist: u32) -> Self {
        Self {
            kind: ActionType::Shoot,
            dir,
            dist: Some(dist),
            loc: None,
        }
    }

    pub fn spawn(dir: u8) -> Self {
        Self {
            kind: ActionType::Spawn,
            dir,
            dist: None,
            loc: None,
        }
    }

    /// Same action, originating from `loc`
    pub fn from_loc(mut self, loc: usize) -> Self {
        self.loc = Some(loc);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Piece {
    pub id: PieceId,
    pub player_id: usize,
    pub is_king: bool,
    pub loc: usize,
}

/// A participant, identified by display name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Player {
    name: String,
}

impl Player {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Side effect of a mutation, in the order it happened
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    Warning(String),
    PlayerChanged {
        seat: usize,
        player: Option<Player>,
    },
    PieceAdded(Piece),
    PieceRemoved(Piece),
    ActionApplied {
        piece: PieceId,
        action: Action,
    },
    PlayerEliminated {
        player_id: usize,
    },
    TurnEnded {
        previous_player: usize,
        actions: Vec<Action>,
    },
    GameOver {
        winner: usize,
    },
}

#[derive(Debug, Clone)]
pub struct Game {
    game_id: GameId,
    max_radius: u32,

    board_code: String,
    formation_code: String,
    options_code: String,

    board: Board,
    pieces: BTreeMap<PieceId, Piece>,
    next_piece_id: u32,
    opts: GameOptions,

    players: Vec<Option<Player>>,
    num_players: usize,
    players_dead: Vec<bool>,
    player_spawns: Vec<u32>,
    started: bool,
    winner: Option<usize>,

    turn: u64,
    current_player: usize,
    can_shoot: bool,
    turn_actions: Vec<Action>,

    events: Vec<GameEvent>,
}

impl Game {
    /// Creates an empty game; descriptors still have to be applied
    pub fn new(game_id: GameId) -> Self {
        Self::with_max_radius(game_id, DEFAULT_MAX_RADIUS)
    }

    pub fn with_max_radius(game_id: GameId, max_radius: u32) -> Self {
        Self {
            game_id,
            max_radius,
            board_code: String::new(),
            formation_code: String::new(),
            options_code: String::new(),
            board: Board::default(),
            pieces: BTreeMap::new(),
            next_piece_id: 0,
            opts: GameOptions::default(),
            players: Vec::new(),
            num_players: 0,
            players_dead: Vec::new(),
            player_spawns: Vec::new(),
            started: false,
            winner: None,
            turn: 0,
            current_player: 0,
            can_shoot: true,
            turn_actions: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Builds a game from the three descriptors of a create request
    pub fn from_spec(game_id: GameId, spec: &GameSpec, max_radius: u32) -> Self {
        let mut game = Self::with_max_radius(game_id, max_radius);
        game.update_board(&spec.board);
        game.update_formation(&spec.formation);
        game.update_options(&spec.options);
        game
    }

    /// Rebuilds a game, seats included, from its serialized form
    pub fn deserialize(data: &SerializedGame, max_radius: u32) -> Self {
        let mut game = Self::from_spec(data.game_id, &data.spec(), max_radius);
        for (seat, name) in data.player_names.iter().enumerate().take(game.num_players) {
            game.players[seat] = name.as_deref().map(Player::new);
        }
        game.started = game.is_full();
        game
    }

    pub fn serialize(&self) -> SerializedGame {
        SerializedGame {
            game_id: self.game_id,
            board: self.board_code.clone(),
            formation: self.formation_code.clone(),
            options: self.options_code.clone(),
            player_names: self
                .players
                .iter()
                .map(|p| p.as_ref().map(|p| p.name.clone()))
                .collect(),
        }
    }

    pub fn game_id(&self) -> GameId {
        self.game_id
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn board_code(&self) -> &str {
        &self.board_code
    }

    pub fn formation_code(&self) -> &str {
        &self.formation_code
    }

    pub fn options_code(&self) -> &str {
        &self.options_code
    }

    pub fn options(&self) -> &GameOptions {
        &self.opts
    }

    pub fn pieces(&self) -> impl Iterator<Item = &Piece> {
        self.pieces.values()
    }

    pub fn piece(&self, id: PieceId) -> Option<&Piece> {
        self.pieces.get(&id)
    }

    pub fn piece_at(&self, loc: usize) -> Option<&Piece> {
        self.board.piece_at(loc).and_then(|id| self.pieces.get(&id))
    }

    pub fn num_players(&self) -> usize {
        self.num_players
    }

    pub fn players(&self) -> &[Option<Player>] {
        &self.players
    }

    pub fn seat_of(&self, name: &str) -> Option<usize> {
        self.players
            .iter()
            .position(|p| p.as_ref().is_some_and(|p| p.name == name))
    }

    pub fn player_count(&self) -> usize {
        self.players.iter().filter(|p| p.is_some()).count()
    }

    pub fn is_full(&self) -> bool {
        self.num_players > 0 && self.player_count() == self.num_players
    }

    pub fn is_empty(&self) -> bool {
        self.player_count() == 0
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_eliminated(&self, player_id: usize) -> bool {
        self.players_dead.get(player_id).copied().unwrap_or(false)
    }

    pub fn spawns(&self, player_id: usize) -> u32 {
        self.player_spawns.get(player_id).copied().unwrap_or(0)
    }

    pub fn winner(&self) -> Option<usize> {
        self.winner
    }

    pub fn turn(&self) -> u64 {
        self.turn
    }

    pub fn current_player(&self) -> usize {
        self.current_player
    }

    pub fn turn_is(&self, player_id: usize) -> bool {
        self.current_player == player_id
    }

    pub fn can_shoot(&self) -> bool {
        self.can_shoot
    }

    pub fn turn_actions(&self) -> &[Action] {
        &self.turn_actions
    }

    /// Drains every event queued since the last call
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    /// Replaces the terrain; all pieces are discarded without notification
    pub fn update_board(&mut self, code: &str) {
        self.board_code = code.to_string();

        let mut builder = TerrainBuilder::default();
        hexgrid::parse_with_limit(code, self.max_radius, &mut builder);

        self.board = builder.board;
        self.pieces.clear();
        self.events
            .extend(builder.warnings.into_iter().map(GameEvent::Warning));
    }

    /// Replaces the piece layout and resets the turn state
    pub fn update_formation(&mut self, code: &str) {
        self.formation_code = code.to_string();

        for (_, piece) in std::mem::take(&mut self.pieces) {
            self.board.set(piece.loc, Cell::Empty);
            self.events.push(GameEvent::PieceRemoved(piece));
        }

        let mut layout = FormationLayout::default();
        hexgrid::parse_with_limit(code, self.max_radius, &mut layout);
        self.events
            .extend(layout.warnings.into_iter().map(GameEvent::Warning));

        self.num_players = 6 / layout.sectors.max(1) as usize;
        self.players_dead = vec![false; self.num_players];
        self.player_spawns = vec![self.opts.spawns; self.num_players];
        self.players.resize(self.num_players, None);
        self.winner = None;
        self.turn = 0;
        self.current_player = 0;
        self.can_shoot = true;
        self.turn_actions.clear();

        for placement in layout.placements {
            let Some(loc) = self.board.loc(placement.row, placement.col) else {
                self.warn("Make piece location is an edge cell");
                continue;
            };
            match self.board.get(loc) {
                Cell::Edge => self.warn("Make piece location is an edge cell"),
                Cell::Wall => self.warn("Make piece location is a wall"),
                Cell::Empty | Cell::Occupied(_) => {
                    if let Err(e) = self.make_piece(placement.sector, loc, placement.is_king) {
                        debug!("Game {}: {}", self.game_id, e);
                        self.warn("Make piece location is already occupied");
                    }
                }
            }
        }
    }

    /// Resets options to defaults, applies the overrides and refills spawn credits
    pub fn update_options(&mut self, code: &str) {
        self.options_code = code.to_string();

        let (opts, warnings) = GameOptions::parse(code);
        self.opts = opts;
        self.events.extend(warnings.into_iter().map(GameEvent::Warning));
        self.player_spawns = vec![self.opts.spawns; self.num_players];
    }

    /// Seats a player in the first vacant slot
    ///
    /// Returns whether this join filled the game.
    pub fn join_player(&mut self, player: Player) -> Result<bool, ClientError> {
        if self.seat_of(&player.name).is_some() {
            return Err(ClientError::DuplicateJoin);
        }
        if self.started {
            return Err(ClientError::GameFull);
        }
        let seat = self
            .players
            .iter()
            .position(Option::is_none)
            .ok_or(ClientError::GameFull)?;

        self.players[seat] = Some(player.clone());
        self.events.push(GameEvent::PlayerChanged {
            seat,
            player: Some(player),
        });

        let full = self.is_full();
        if full {
            self.started = true;
        }
        Ok(full)
    }

    /// Vacates the player's slot
    ///
    /// Leaving a started game forfeits the seat. Returns whether the game has
    /// no players left.
    pub fn leave_player(&mut self, name: &str) -> Result<bool, ClientError> {
        let seat = self.seat_of(name).ok_or(ClientError::NotInGame)?;

        self.players[seat] = None;
        self.events.push(GameEvent::PlayerChanged { seat, player: None });

        if self.started && !self.is_eliminated(seat) {
            self.eliminate(seat);
            if self.current_player == seat && self.winner.is_none() {
                self.advance_player();
                self.can_shoot = true;
                self.turn_actions.clear();
            }
        }

        Ok(self.is_empty())
    }

    /// Every legal action for a piece this turn
    pub fn get_piece_actions(&self, piece_id: PieceId) -> Vec<Action> {
        let Some(piece) = self.pieces.get(&piece_id) else {
            return Vec::new();
        };
        if piece.player_id != self.current_player {
            return Vec::new();
        }

        let mut actions = Vec::new();
        for dir in 0..6u8 {
            if self.is_move_valid(piece, dir as usize) {
                actions.push(Action::movement(dir));
            }
            if self.is_shoot_valid(piece, dir as usize) {
                actions.extend(
                    self.shot_distances(piece, dir as usize)
                        .into_iter()
                        .map(|dist| Action::shot(dir, dist)),
                );
            }
            if self.is_spawn_valid(piece, dir as usize) {
                actions.push(Action::spawn(dir));
            }
        }
        actions
    }

    /// Re-derives the legality of a client-declared action
    pub fn is_action_valid(&self, piece_id: PieceId, action: &Action) -> Result<bool, ClientError> {
        if action.dir >= 6 {
            return Err(ClientError::InvalidDirection(action.dir));
        }
        let Some(piece) = self.pieces.get(&piece_id) else {
            return Ok(false);
        };
        if piece.player_id != self.current_player {
            return Ok(false);
        }

        let dir = action.dir as usize;
        Ok(match action.kind {
            ActionType::Move => self.is_move_valid(piece, dir),
            ActionType::Shoot => {
                self.is_shoot_valid(piece, dir)
                    && action
                        .dist
                        .is_some_and(|dist| self.shot_distances(piece, dir).contains(&dist))
            }
            ActionType::Spawn => self.is_spawn_valid(piece, dir),
        })
    }

    pub fn is_end_turn_valid(&self) -> bool {
        !self.turn_actions.is_empty()
    }

    /// Validates and applies one action
    ///
    /// `Ok(false)` means the action was rejected and nothing changed. On success
    /// `action.loc` is set to the acting piece's origin cell.
    pub fn do_action(&mut self, piece_id: PieceId, action: &mut Action) -> Result<bool, GameError> {
        if !self.is_action_valid(piece_id, action)? {
            return Ok(false);
        }
        let Some(piece) = self.pieces.get(&piece_id).copied() else {
            return Ok(false);
        };

        let dst = self
            .action_destination(&piece, action)
            .ok_or(IntegrityError::ImpassableDestination(piece.loc))?;
        match self.board.get(dst) {
            Cell::Edge | Cell::Wall => {
                return Err(IntegrityError::ImpassableDestination(dst).into());
            }
            Cell::Occupied(victim) => self.remove_piece(victim),
            Cell::Empty => {}
        }

        if action.kind != ActionType::Shoot {
            self.can_shoot = false;
        }
        action.loc = Some(piece.loc);

        if action.kind == ActionType::Spawn {
            if let Some(credits) = self.player_spawns.get_mut(piece.player_id) {
                *credits = credits.saturating_sub(1);
            }
            self.make_piece(piece.player_id, dst, false)?;
        } else {
            self.board.set(piece.loc, Cell::Empty);
            self.board.set(dst, Cell::Occupied(piece_id));
            if let Some(moved) = self.pieces.get_mut(&piece_id) {
                moved.loc = dst;
            }
        }

        self.turn_actions.push(action.clone());
        self.events.push(GameEvent::ActionApplied {
            piece: piece_id,
            action: action.clone(),
        });
        Ok(true)
    }

    /// Passes control to the next non-eliminated player
    ///
    /// Returns false, changing nothing, when no action was taken this turn.
    pub fn end_turn(&mut self) -> bool {
        if !self.is_end_turn_valid() {
            return false;
        }

        let previous_player = self.current_player;
        self.advance_player();
        self.can_shoot = true;
        let actions = std::mem::take(&mut self.turn_actions);

        self.events.push(GameEvent::TurnEnded {
            previous_player,
            actions,
        });
        true
    }

    /// Applies a whole turn for `seat` as one unit
    ///
    /// Actions are applied in order to a staged copy of the game. The first
    /// rejected action aborts the batch with its index and leaves `self`
    /// untouched; otherwise the turn is ended and the copy committed. Returns
    /// the applied actions with their origin cells filled in.
    pub fn play_turn(&mut self, seat: usize, actions: Vec<Action>) -> Result<Vec<Action>, GameError> {
        let game_id = self.game_id;
        if actions.is_empty() {
            return Err(ClientError::EmptyTurn { game_id }.into());
        }
        if seat != self.current_player || self.is_eliminated(seat) {
            return Err(ClientError::NotYourTurn { game_id }.into());
        }

        let mut staged = self.clone();
        let mut applied = Vec::with_capacity(actions.len());

        for (index, mut action) in actions.into_iter().enumerate() {
            let invalid = ClientError::InvalidAction { game_id, index };
            let Some(piece_id) = action.loc.and_then(|loc| staged.board.piece_at(loc)) else {
                return Err(invalid.into());
            };
            match staged.do_action(piece_id, &mut action) {
                Ok(true) => applied.push(action),
                Ok(false) | Err(GameError::Client(_)) => {
                    debug!("Game {}: rejecting action {} of turn", game_id, index);
                    return Err(invalid.into());
                }
                Err(err @ GameError::Integrity(_)) => return Err(err),
            }
        }

        staged.end_turn();
        *self = staged;
        Ok(applied)
    }

    fn warn(&mut self, message: &str) {
        self.events.push(GameEvent::Warning(message.to_string()));
    }

    fn is_enemy(&self, cell: Cell) -> Option<&Piece> {
        match cell {
            Cell::Occupied(id) => self
                .pieces
                .get(&id)
                .filter(|p| p.player_id != self.current_player),
            _ => None,
        }
    }

    fn is_friendly(&self, loc: Option<usize>) -> bool {
        match loc.map(|loc| self.board.get(loc)) {
            Some(Cell::Occupied(id)) => self
                .pieces
                .get(&id)
                .is_some_and(|p| p.player_id == self.current_player),
            _ => false,
        }
    }

    fn is_move_valid(&self, piece: &Piece, dir: usize) -> bool {
        if !self.turn_actions.is_empty() {
            return false;
        }
        let Some(front) = self.board.neighbor(piece.loc, dir) else {
            return false;
        };

        let cell = self.board.get(front);
        if cell == Cell::Empty {
            return true;
        }
        self.is_enemy(cell)
            .is_some_and(|target| piece.is_king || target.is_king)
    }

    fn is_shoot_valid(&self, piece: &Piece, dir: usize) -> bool {
        if !self.can_shoot {
            return false;
        }
        if !self.is_friendly(self.board.neighbor(piece.loc, dir + 2))
            || !self.is_friendly(self.board.neighbor(piece.loc, dir + 4))
        {
            return false;
        }
        self.board
            .neighbor(piece.loc, dir + 3)
            .is_some_and(|back| self.board.get(back) == Cell::Empty)
    }

    fn is_spawn_valid(&self, _piece: &Piece, _dir: usize) -> bool {
        false
    }

    /// Candidate shot distances: every empty cell along the ray, plus the
    /// first enemy piece that stops it
    fn shot_distances(&self, piece: &Piece, dir: usize) -> Vec<u32> {
        let mut distances = Vec::new();
        let mut loc = piece.loc;
        let mut dist = 1;

        while let Some(next) = self.board.neighbor(loc, dir) {
            let cell = self.board.get(next);
            if cell == Cell::Empty {
                distances.push(dist);
                loc = next;
                dist += 1;
                continue;
            }
            if self.is_enemy(cell).is_some() {
                distances.push(dist);
            }
            break;
        }
        distances
    }

    fn action_destination(&self, piece: &Piece, action: &Action) -> Option<usize> {
        let dir = action.dir as usize;
        match action.kind {
            ActionType::Move | ActionType::Spawn => self.board.neighbor(piece.loc, dir),
            ActionType::Shoot => {
                let mut loc = piece.loc;
                for _ in 0..action.dist? {
                    loc = self.board.neighbor(loc, dir)?;
                }
                Some(loc)
            }
        }
    }

    fn make_piece(
        &mut self,
        player_id: usize,
        loc: usize,
        is_king: bool,
    ) -> Result<PieceId, IntegrityError> {
        if self.board.get(loc) != Cell::Empty {
            return Err(IntegrityError::Placement(loc));
        }

        let id = PieceId(self.next_piece_id);
        self.next_piece_id += 1;

        let piece = Piece {
            id,
            player_id,
            is_king,
            loc,
        };
        self.board.set(loc, Cell::Occupied(id));
        self.pieces.insert(id, piece);
        self.events.push(GameEvent::PieceAdded(piece));
        Ok(id)
    }

    fn remove_piece(&mut self, id: PieceId) {
        let Some(piece) = self.pieces.remove(&id) else {
            return;
        };
        self.board.set(piece.loc, Cell::Empty);
        self.events.push(GameEvent::PieceRemoved(piece));

        if piece.is_king && !self.has_king(piece.player_id) {
            self.eliminate(piece.player_id);
        }
    }

    fn has_king(&self, player_id: usize) -> bool {
        self.pieces
            .values()
            .any(|p| p.player_id == player_id && p.is_king)
    }

    fn eliminate(&mut self, player_id: usize) {
        match self.players_dead.get_mut(player_id) {
            Some(dead) if !*dead => *dead = true,
            _ => return,
        }
        self.events.push(GameEvent::PlayerEliminated { player_id });

        if self.num_players < 2 || self.winner.is_some() {
            return;
        }
        let mut alive = (0..self.num_players).filter(|p| !self.players_dead[*p]);
        if let (Some(winner), None) = (alive.next(), alive.next()) {
            self.winner = Some(winner);
            self.events.push(GameEvent::GameOver { winner });
        }
    }

    fn advance_player(&mut self) {
        if self.num_players == 0 {
            return;
        }
        for _ in 0..self.num_players {
            self.turn += 1;
            self.current_player = (self.turn % self.num_players as u64) as usize;
            if !self.is_eliminated(self.current_player) {
                break;
            }
        }
    }
}

/// Terrain visitor for board descriptors
#[derive(Default)]
struct TerrainBuilder {
    board: Board,
    warnings: Vec<String>,
}

impl GridVisitor for TerrainBuilder {
    fn meta(&mut self, radius: u32, _sectors: u32) {
        self.board = Board::new(radius);
    }

    fn cell(&mut self, row: i32, col: i32, token: Token, _sector: usize) {
        let cell = match token {
            Token::Playable | Token::Unused | Token::Blank => Cell::Empty,
            Token::Void => Cell::Edge,
            Token::Wall => Cell::Wall,
            Token::King => {
                self.warnings
                    .push("King code is not valid in a board descriptor".to_string());
                return;
            }
        };
        if let Some(loc) = self.board.loc(row, col) {
            self.board.set(loc, cell);
        }
    }

    fn warning(&mut self, message: String) {
        self.warnings.push(message);
    }
}

struct Placement {
    row: i32,
    col: i32,
    sector: usize,
    is_king: bool,
}

/// Piece-layout visitor for formation descriptors
#[derive(Default)]
struct FormationLayout {
    sectors: u32,
    placements: Vec<Placement>,
    warnings: Vec<String>,
}

impl GridVisitor for FormationLayout {
    fn meta(&mut self, _radius: u32, sectors: u32) {
        self.sectors = sectors;
    }

    fn cell(&mut self, row: i32, col: i32, token: Token, sector: usize) {
        match token {
            Token::Playable | Token::King => self.placements.push(Placement {
                row,
                col,
                sector,
                is_king: token == Token::King,
            }),
            Token::Unused | Token::Blank => {}
            Token::Void | Token::Wall => self.warnings.push(format!(
                "Type code \"{}\" is not valid in a formation",
                token.code()
            )),
        }
    }

    fn warning(&mut self, message: String) {
        self.warnings.push(message);
    }
}
