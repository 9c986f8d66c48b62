//! In-process baseline opponent (C6).
//!
//! Evaluation is a static function of the `Position` returning a score
//! where positive favours White. A bounded-depth minimax with alpha-beta
//! pruning searches this function from the side to move's perspective, one
//! player maximizing the score and the other minimizing it — mirroring the
//! shape of a textbook alpha-beta search. At the lowest strength setting,
//! the bot occasionally plays a uniformly random legal move instead of the
//! engine's first choice.

use std::cmp;

use rand::Rng;

use crate::coretypes::{Color, Move, PieceKind};
use crate::error::{self, ErrorKind};
use crate::movegen;
use crate::position::Position;

pub type Centipawns = i32;

const CHECKMATE_SCORE: Centipawns = 1_000_000;
const STALEMATE_SCORE: Centipawns = 0;

/// Lowest supported strength: 1. Highest: 5.
pub const MIN_STRENGTH: u8 = 1;
pub const MAX_STRENGTH: u8 = 5;

impl PieceKind {
    /// Independent material value, in centipawns.
    const fn centipawns(&self) -> Centipawns {
        match self {
            PieceKind::Pawn => 100,
            PieceKind::Knight => 305,
            PieceKind::Bishop => 310,
            PieceKind::Rook => 510,
            PieceKind::Queen => 950,
            PieceKind::King => 0,
        }
    }
}

const MOBILITY_CENTIPAWNS: Centipawns = 1;

/// A configurable-strength in-process opponent.
#[derive(Debug, Copy, Clone)]
pub struct Bot {
    strength: u8,
}

impl Bot {
    /// Clamps `strength` into `MIN_STRENGTH..=MAX_STRENGTH`.
    pub fn new(strength: u8) -> Self {
        Self {
            strength: strength.clamp(MIN_STRENGTH, MAX_STRENGTH),
        }
    }

    pub fn strength(&self) -> u8 {
        self.strength
    }

    /// Ply depth this strength searches to. Strength 1 searches one ply
    /// deep, strength 5 searches three.
    pub fn depth(&self) -> u32 {
        (u32::from(self.strength) + 1) / 2
    }

    /// Random-move probability at this strength; zero above the lowest
    /// setting.
    fn randomization_chance(&self) -> f64 {
        if self.strength == MIN_STRENGTH {
            0.2
        } else {
            0.0
        }
    }

    /// Chooses a legal move for the side to move in `position`. Errors if
    /// the position has no legal move — callers must not invoke the bot on
    /// a terminal position.
    pub fn choose_move(&self, position: &Position) -> error::Result<Move> {
        let legal_moves = position.legal_moves();
        if legal_moves.is_empty() {
            return Err((ErrorKind::GameAlreadyEnded, "no legal move available").into());
        }

        if self.randomization_chance() > 0.0
            && rand::thread_rng().gen_bool(self.randomization_chance())
        {
            let index = rand::thread_rng().gen_range(0..legal_moves.len());
            return Ok(legal_moves[index]);
        }

        Ok(self.search_root(position, &legal_moves))
    }

    fn search_root(&self, position: &Position, legal_moves: &[Move]) -> Move {
        let depth = self.depth();
        let maximizing = position.side_to_move == Color::White;

        let mut best_move = legal_moves[0];
        let mut best_score = if maximizing {
            Centipawns::MIN
        } else {
            Centipawns::MAX
        };
        let mut alpha = Centipawns::MIN;
        let mut beta = Centipawns::MAX;

        for &mv in legal_moves {
            let (child, _) = position
                .apply(mv)
                .expect("candidate came from legal_moves, must apply");
            let score = alpha_beta(&child, depth - 1, alpha, beta);

            if maximizing {
                if score > best_score {
                    best_score = score;
                    best_move = mv;
                }
                alpha = cmp::max(alpha, best_score);
            } else if score < best_score {
                best_score = score;
                best_move = mv;
                beta = cmp::min(beta, best_score);
            }
        }

        best_move
    }
}

/// Evaluates `position` to a fixed ply `depth` using the same alpha-beta
/// search the bot itself plays with, without selecting a move. Exposed so
/// read-only advisory queries (analysis, move recommendations) can score
/// positions by lookahead instead of a single static `evaluate` call, at a
/// caller-chosen depth independent of any bot actually seated in a game.
pub fn search_to_depth(position: &Position, depth: u32) -> Centipawns {
    alpha_beta(position, depth, Centipawns::MIN, Centipawns::MAX)
}

/// Negamax-free minimax with alpha-beta pruning, operating on the absolute
/// (White-positive) score. `position` is the node to evaluate; the side to
/// move there determines whether this level maximizes or minimizes.
fn alpha_beta(position: &Position, depth: u32, mut alpha: Centipawns, mut beta: Centipawns) -> Centipawns {
    let legal_moves = position.legal_moves();

    if legal_moves.is_empty() {
        return terminal_score(position);
    }
    if depth == 0 {
        return evaluate(position);
    }

    let maximizing = position.side_to_move == Color::White;
    let mut best = if maximizing {
        Centipawns::MIN
    } else {
        Centipawns::MAX
    };

    for mv in legal_moves {
        let (child, _) = position
            .apply(mv)
            .expect("candidate came from legal_moves, must apply");
        let score = alpha_beta(&child, depth - 1, alpha, beta);

        if maximizing {
            best = cmp::max(best, score);
            alpha = cmp::max(alpha, best);
        } else {
            best = cmp::min(best, score);
            beta = cmp::min(beta, best);
        }
        if alpha >= beta {
            break;
        }
    }

    best
}

/// Score for a position with no legal moves: checkmate short-circuits to
/// (near) infinity signed by the winner, stalemate is exactly zero.
fn terminal_score(position: &Position) -> Centipawns {
    if position.is_checkmate() {
        match position.side_to_move {
            Color::White => -CHECKMATE_SCORE,
            Color::Black => CHECKMATE_SCORE,
        }
    } else {
        STALEMATE_SCORE
    }
}

/// Material plus mobility, absolute (positive favours White).
pub fn evaluate(position: &Position) -> Centipawns {
    let mut score = 0;
    for rank in 0..8u8 {
        for file in 0..8u8 {
            let square = crate::coretypes::Square::new(file, rank);
            if let Some(piece) = position.piece_at(square) {
                let value = piece.kind.centipawns();
                score += match piece.color {
                    Color::White => value,
                    Color::Black => -value,
                };
            }
        }
    }

    let white_mobility = movegen::pseudo_legal_moves(&with_side_to_move(position, Color::White)).len() as Centipawns;
    let black_mobility = movegen::pseudo_legal_moves(&with_side_to_move(position, Color::Black)).len() as Centipawns;
    score += (white_mobility - black_mobility) * MOBILITY_CENTIPAWNS;

    score
}

fn with_side_to_move(position: &Position, color: Color) -> Position {
    let mut clone = position.clone();
    clone.side_to_move = color;
    clone
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bot_plays_legal_move_from_start_position() {
        let bot = Bot::new(3);
        let position = Position::start_position();
        let mv = bot.choose_move(&position).unwrap();
        assert!(position.legal_moves().contains(&mv));
    }

    #[test]
    fn bot_takes_mate_in_one() {
        // White: Qh5, Bc4; Black: king on e8 only, no other pieces; a
        // scholar's-mate-style forced mate in one (Qxf7#).
        let mut position = Position::empty();
        position.set_piece_at(
            crate::coretypes::Square::new(4, 0),
            Some(crate::coretypes::Piece::new(Color::White, PieceKind::King)),
        );
        position.set_piece_at(
            crate::coretypes::Square::new(7, 4),
            Some(crate::coretypes::Piece::new(Color::White, PieceKind::Queen)),
        );
        position.set_piece_at(
            crate::coretypes::Square::new(2, 3),
            Some(crate::coretypes::Piece::new(Color::White, PieceKind::Bishop)),
        );
        position.set_piece_at(
            crate::coretypes::Square::new(4, 7),
            Some(crate::coretypes::Piece::new(Color::Black, PieceKind::King)),
        );
        position.castling = crate::coretypes::Castling::none();

        let bot = Bot::new(5);
        let mv = bot.choose_move(&position).unwrap();
        let (child, _) = position.apply(mv).unwrap();
        assert!(child.is_checkmate(), "expected bot to find the forced mate");
    }

    #[test]
    fn evaluate_start_position_is_symmetric() {
        assert_eq!(evaluate(&Position::start_position()), 0);
    }

    #[test]
    fn search_to_depth_zero_matches_static_evaluation() {
        let position = Position::start_position();
        assert_eq!(search_to_depth(&position, 0), evaluate(&position));
    }

    #[test]
    fn search_to_depth_finds_the_forced_mate_score() {
        // Same mate-in-one setup as `bot_takes_mate_in_one`: White to move
        // with Qxf7# available should score as a won position for White.
        let mut position = Position::empty();
        position.set_piece_at(
            crate::coretypes::Square::new(4, 0),
            Some(crate::coretypes::Piece::new(Color::White, PieceKind::King)),
        );
        position.set_piece_at(
            crate::coretypes::Square::new(7, 4),
            Some(crate::coretypes::Piece::new(Color::White, PieceKind::Queen)),
        );
        position.set_piece_at(
            crate::coretypes::Square::new(2, 3),
            Some(crate::coretypes::Piece::new(Color::White, PieceKind::Bishop)),
        );
        position.set_piece_at(
            crate::coretypes::Square::new(4, 7),
            Some(crate::coretypes::Piece::new(Color::Black, PieceKind::King)),
        );
        position.castling = crate::coretypes::Castling::none();
        position.side_to_move = Color::White;

        assert!(search_to_depth(&position, 2) > 0);
    }
}
