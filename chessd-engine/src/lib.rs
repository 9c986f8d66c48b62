//! Chess rules engine, position encoder, and baseline bot.
//!
//! This crate has no knowledge of networking, sessions, or clocks — it is a
//! pure function library over `Position` and `Game` values, meant to be
//! embedded by a server that owns all of that state.

pub mod bot;
pub mod coretypes;
pub mod error;
pub mod fen;
pub mod game;
pub(crate) mod movegen;
pub mod position;

pub use bot::Bot;
pub use coretypes::{Color, File, Move, Piece, PieceKind, Rank, Square};
pub use error::{Error, ErrorKind, Result};
pub use fen::Fen;
pub use game::{Game, GameStatus};
pub use position::{MoveRecord, Position};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_exposes_a_playable_game() {
        let mut game = Game::start_position();
        let record = game.apply_move("e2e4".parse().unwrap()).unwrap();
        assert!(record.captured.is_none() && !record.is_castle);
        assert_eq!(game.status(), GameStatus::InProgress);
    }
}
