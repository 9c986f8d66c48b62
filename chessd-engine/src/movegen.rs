//! Pseudo-legal move generation and square-attack queries.
//!
//! Generation works directly off the 8x8 `Option<Piece>` grid in
//! `Position`: rays are scanned outward from a square until the first
//! occupying piece is hit, exactly as described for check detection in the
//! rules engine design. Legality (does a move leave the mover's own king in
//! check) is filtered separately in `position::legal_moves`.

use crate::coretypes::{Color, Move, Piece, PieceKind, Square};
use crate::position::Position;

const ORTHOGONAL: [(i8, i8); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];
const DIAGONAL: [(i8, i8); 4] = [(1, 1), (1, -1), (-1, 1), (-1, -1)];
const KNIGHT_OFFSETS: [(i8, i8); 8] = [
    (1, 2),
    (2, 1),
    (2, -1),
    (1, -2),
    (-1, -2),
    (-2, -1),
    (-2, 1),
    (-1, 2),
];
const KING_OFFSETS: [(i8, i8); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

/// Scans outward from `from` in each of `directions` until blocked, stopping
/// after (and including) the first occupied square.
fn slide_targets(position: &Position, from: Square, directions: &[(i8, i8)]) -> Vec<Square> {
    let mut targets = Vec::new();
    for &(df, dr) in directions {
        let mut current = from;
        while let Some(next) = current.try_offset(df, dr) {
            match position.piece_at(next) {
                None => {
                    targets.push(next);
                    current = next;
                }
                Some(_) => {
                    targets.push(next);
                    break;
                }
            }
        }
    }
    targets
}

fn jump_targets(from: Square, offsets: &[(i8, i8)]) -> Vec<Square> {
    offsets
        .iter()
        .filter_map(|&(df, dr)| from.try_offset(df, dr))
        .collect()
}

/// Pseudo-legal moves for the piece on `from`, ignoring whether the move
/// leaves the mover's own king in check. Returns an empty vector if `from`
/// is empty or holds a piece of the side not to move.
pub fn pseudo_legal_moves_from(position: &Position, from: Square) -> Vec<Move> {
    let Some(piece) = position.piece_at(from) else {
        return Vec::new();
    };
    if piece.color != position.side_to_move {
        return Vec::new();
    }

    match piece.kind {
        PieceKind::Pawn => pawn_moves(position, from, piece),
        PieceKind::Knight => {
            simple_moves(position, from, piece, &jump_targets(from, &KNIGHT_OFFSETS))
        }
        PieceKind::Bishop => simple_moves(
            position,
            from,
            piece,
            &slide_targets(position, from, &DIAGONAL),
        ),
        PieceKind::Rook => simple_moves(
            position,
            from,
            piece,
            &slide_targets(position, from, &ORTHOGONAL),
        ),
        PieceKind::Queen => {
            let mut targets = slide_targets(position, from, &ORTHOGONAL);
            targets.extend(slide_targets(position, from, &DIAGONAL));
            simple_moves(position, from, piece, &targets)
        }
        PieceKind::King => king_moves(position, from, piece),
    }
}

/// All pseudo-legal moves for the side to move.
pub fn pseudo_legal_moves(position: &Position) -> Vec<Move> {
    let mut moves = Vec::new();
    for rank in 0..crate::coretypes::NUM_RANKS as u8 {
        for file in 0..crate::coretypes::NUM_FILES as u8 {
            let square = Square::new(file, rank);
            if let Some(piece) = position.piece_at(square) {
                if piece.color == position.side_to_move {
                    moves.extend(pseudo_legal_moves_from(position, square));
                }
            }
        }
    }
    moves
}

/// Non-pawn, non-king moves: keep targets that are empty or hold an enemy
/// piece.
fn simple_moves(position: &Position, from: Square, piece: Piece, targets: &[Square]) -> Vec<Move> {
    targets
        .iter()
        .filter(|&&to| match position.piece_at(to) {
            None => true,
            Some(occupant) => occupant.color != piece.color,
        })
        .map(|&to| Move::new(from, to, None))
        .collect()
}

fn king_moves(position: &Position, from: Square, piece: Piece) -> Vec<Move> {
    let mut moves = simple_moves(
        position,
        from,
        piece,
        &jump_targets(from, &KING_OFFSETS),
    );
    moves.extend(castling_moves(position, from, piece.color));
    moves
}

fn castling_moves(position: &Position, from: Square, color: Color) -> Vec<Move> {
    let mut moves = Vec::new();
    let back_rank = color.back_rank();
    if from != Square::new(4, back_rank) {
        return moves;
    }
    // The king may never castle out of check.
    if is_square_attacked(position, from, color.opposite()) {
        return moves;
    }

    let (king_side_right, queen_side_right) = match color {
        Color::White => (
            position.castling.white_king_side,
            position.castling.white_queen_side,
        ),
        Color::Black => (
            position.castling.black_king_side,
            position.castling.black_queen_side,
        ),
    };

    if king_side_right {
        let f = Square::new(5, back_rank);
        let g = Square::new(6, back_rank);
        let h = Square::new(7, back_rank);
        let rook_present = matches!(position.piece_at(h), Some(p) if p.kind == PieceKind::Rook && p.color == color);
        if rook_present
            && position.piece_at(f).is_none()
            && position.piece_at(g).is_none()
            && !is_square_attacked(position, f, color.opposite())
        {
            moves.push(Move::new(from, g, None));
        }
    }
    if queen_side_right {
        let d = Square::new(3, back_rank);
        let c = Square::new(2, back_rank);
        let b = Square::new(1, back_rank);
        let a = Square::new(0, back_rank);
        let rook_present = matches!(position.piece_at(a), Some(p) if p.kind == PieceKind::Rook && p.color == color);
        if rook_present
            && position.piece_at(d).is_none()
            && position.piece_at(c).is_none()
            && position.piece_at(b).is_none()
            && !is_square_attacked(position, d, color.opposite())
        {
            moves.push(Move::new(from, c, None));
        }
    }
    moves
}

fn pawn_moves(position: &Position, from: Square, piece: Piece) -> Vec<Move> {
    let mut moves = Vec::new();
    let color = piece.color;
    let direction = color.pawn_direction();
    let start_rank = match color {
        Color::White => 1,
        Color::Black => 6,
    };
    let promotion_rank = color.promotion_rank();

    let push_targets_with_promo = |to: Square, moves: &mut Vec<Move>| {
        if to.rank == promotion_rank {
            for kind in PieceKind::PROMOTABLE {
                moves.push(Move::new(from, to, Some(kind)));
            }
        } else {
            moves.push(Move::new(from, to, None));
        }
    };

    // Single push.
    if let Some(one) = from.try_offset(0, direction) {
        if position.piece_at(one).is_none() {
            push_targets_with_promo(one, &mut moves);

            // Double push, only from the starting rank and only if both
            // squares ahead are empty.
            if from.rank == start_rank {
                if let Some(two) = from.try_offset(0, 2 * direction) {
                    if position.piece_at(two).is_none() {
                        moves.push(Move::new(from, two, None));
                    }
                }
            }
        }
    }

    // Captures, including en-passant.
    for d_file in [-1i8, 1] {
        if let Some(to) = from.try_offset(d_file, direction) {
            match position.piece_at(to) {
                Some(occupant) if occupant.color != color => {
                    push_targets_with_promo(to, &mut moves);
                }
                None => {
                    if position.en_passant == Some(to) {
                        moves.push(Move::new(from, to, None));
                    }
                }
                _ => {}
            }
        }
    }

    moves
}

/// True if `square` is attacked by any piece of `by_color` in `position`.
pub fn is_square_attacked(position: &Position, square: Square, by_color: Color) -> bool {
    // Pawns: a pawn of by_color attacks square if it sits one step behind
    // (relative to its own advance direction) and one file to either side.
    let pawn_dir = by_color.pawn_direction();
    for d_file in [-1i8, 1] {
        if let Some(from) = square.try_offset(d_file, -pawn_dir) {
            if let Some(p) = position.piece_at(from) {
                if p.color == by_color && p.kind == PieceKind::Pawn {
                    return true;
                }
            }
        }
    }

    // Knights.
    for from in jump_targets(square, &KNIGHT_OFFSETS) {
        if let Some(p) = position.piece_at(from) {
            if p.color == by_color && p.kind == PieceKind::Knight {
                return true;
            }
        }
    }

    // King.
    for from in jump_targets(square, &KING_OFFSETS) {
        if let Some(p) = position.piece_at(from) {
            if p.color == by_color && p.kind == PieceKind::King {
                return true;
            }
        }
    }

    // Sliding orthogonal: rook/queen.
    for &(df, dr) in &ORTHOGONAL {
        let mut current = square;
        while let Some(next) = current.try_offset(df, dr) {
            if let Some(p) = position.piece_at(next) {
                if p.color == by_color
                    && (p.kind == PieceKind::Rook || p.kind == PieceKind::Queen)
                {
                    return true;
                }
                break;
            }
            current = next;
        }
    }

    // Sliding diagonal: bishop/queen.
    for &(df, dr) in &DIAGONAL {
        let mut current = square;
        while let Some(next) = current.try_offset(df, dr) {
            if let Some(p) = position.piece_at(next) {
                if p.color == by_color
                    && (p.kind == PieceKind::Bishop || p.kind == PieceKind::Queen)
                {
                    return true;
                }
                break;
            }
            current = next;
        }
    }

    false
}
