//! `Game`: a base position, the ordered moves played from it, and the
//! resulting current position, plus terminal-status detection.
//!
//! Mirrors the shape of a position plus a move history, generalized with
//! the repetition bookkeeping and ordered terminal checks spec'd for the
//! rules engine: checkmate, then stalemate, then insufficient material,
//! then fifty-move, then threefold repetition.

use std::collections::HashMap;

use crate::coretypes::{Color, Move};
use crate::error;
use crate::fen::Fen;
use crate::position::{MoveRecord, Position};

/// Terminal (or non-terminal) status of a `Game`, checked in a fixed order
/// after every applied move.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum GameStatus {
    InProgress,
    Checkmate { winner: Color },
    Stalemate,
    DrawInsufficientMaterial,
    DrawFiftyMove,
    DrawThreefoldRepetition,
}

impl GameStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, GameStatus::InProgress)
    }
}

/// Half-moves at which the fifty-move rule becomes claimable (automatic for
/// this engine).
const FIFTY_MOVE_HALFMOVE_LIMIT: u32 = 100;
const THREEFOLD_REPETITION_COUNT: u32 = 3;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Game {
    pub base_position: Position,
    pub moves: Vec<MoveRecord>,
    pub position: Position,
    repetition_counts: HashMap<String, u32>,
}

impl Game {
    /// Builds a game from a base position and a sequence of already-played
    /// moves, replaying each one. Returns an error on the first illegal move
    /// encountered.
    pub fn new(base_position: Position, moves: &[Move]) -> error::Result<Self> {
        let mut game = Self::from(base_position);
        for &mv in moves {
            game.apply_move(mv)?;
        }
        Ok(game)
    }

    pub fn start_position() -> Self {
        Self::from(Position::start_position())
    }

    /// Validates and applies `mv` to the current position, recording it and
    /// updating repetition bookkeeping. Returns the applied move's record.
    pub fn apply_move(&mut self, mv: Move) -> error::Result<MoveRecord> {
        let (next, record) = self.position.apply(mv)?;
        self.position = next;
        self.moves.push(record);
        *self
            .repetition_counts
            .entry(self.position.repetition_key())
            .or_insert(0) += 1;
        Ok(record)
    }

    /// Evaluates the current position's status, per the fixed check order:
    /// checkmate, stalemate, insufficient material, fifty-move, threefold
    /// repetition.
    pub fn status(&self) -> GameStatus {
        if self.position.is_checkmate() {
            return GameStatus::Checkmate {
                winner: self.position.side_to_move.opposite(),
            };
        }
        if self.position.is_stalemate() {
            return GameStatus::Stalemate;
        }
        if self.position.is_insufficient_material() {
            return GameStatus::DrawInsufficientMaterial;
        }
        if self.position.halfmove_clock >= FIFTY_MOVE_HALFMOVE_LIMIT {
            return GameStatus::DrawFiftyMove;
        }
        let key = self.position.repetition_key();
        if self.repetition_counts.get(&key).copied().unwrap_or(0) >= THREEFOLD_REPETITION_COUNT {
            return GameStatus::DrawThreefoldRepetition;
        }
        GameStatus::InProgress
    }
}

impl From<Position> for Game {
    fn from(position: Position) -> Self {
        let mut repetition_counts = HashMap::new();
        repetition_counts.insert(position.repetition_key(), 1);
        Self {
            base_position: position.clone(),
            moves: Vec::new(),
            position,
            repetition_counts,
        }
    }
}

impl Default for Game {
    fn default() -> Self {
        Self::start_position()
    }
}
