//! End-to-end scenarios and cross-cutting invariants for the rules engine,
//! exercised through the public `Game`/`Position` API rather than internals.

use chessd_engine::coretypes::Castling;
use chessd_engine::{Color, Fen, Game, GameStatus, Move, Piece, PieceKind, Position, Square};

fn play(game: &mut Game, moves: &[&str]) {
    for mv in moves {
        game.apply_move(mv.parse().unwrap())
            .unwrap_or_else(|e| panic!("'{mv}' should be legal here: {e}"));
    }
}

#[test]
fn fools_mate_is_checkmate_in_four_half_moves() {
    let mut game = Game::start_position();
    play(&mut game, &["f2f3", "e7e5", "g2g4", "d8h4"]);
    assert_eq!(game.status(), GameStatus::Checkmate { winner: Color::Black });
}

#[test]
fn smallest_stalemate_has_no_legal_moves_and_is_not_check() {
    // White king a1, black king c2, black queen b3, white to move.
    let mut pos = Position::empty();
    pos.set_piece_at(Square::new(0, 0), Some(Piece::new(Color::White, PieceKind::King)));
    pos.set_piece_at(Square::new(2, 1), Some(Piece::new(Color::Black, PieceKind::King)));
    pos.set_piece_at(Square::new(1, 2), Some(Piece::new(Color::Black, PieceKind::Queen)));
    pos.castling = Castling::none();

    assert!(pos.legal_moves().is_empty());
    assert!(!pos.is_check(Color::White));

    let game = Game::from(pos);
    assert_eq!(game.status(), GameStatus::Stalemate);
}

#[test]
fn en_passant_is_only_legal_immediately_after_the_double_step() {
    let mut game = Game::start_position();
    play(&mut game, &["e2e4", "a7a6", "e4e5", "d7d5"]);

    let capture: Move = "e5d6".parse().unwrap();
    assert!(game.position.legal_moves().contains(&capture));
    assert_eq!(game.position.en_passant, Some(Square::new(3, 5)));

    let before_black_pawns = game.position.piece_at(Square::new(3, 4));
    assert!(before_black_pawns.is_some());

    let record = game.apply_move(capture).unwrap();
    assert!(record.is_en_passant);
    assert_eq!(record.capture_square, Square::new(3, 4));
    assert!(game.position.piece_at(Square::new(3, 4)).is_none());
    assert!(game.position.piece_at(Square::new(3, 5)).is_some());
}

#[test]
fn en_passant_right_expires_after_one_ply() {
    let mut game = Game::start_position();
    play(&mut game, &["e2e4", "a7a6", "e4e5", "d7d5"]);
    assert_eq!(game.position.en_passant, Some(Square::new(3, 5)));

    // White declines the capture; any other move clears the target.
    play(&mut game, &["g1f3"]);
    assert_eq!(game.position.en_passant, None);

    play(&mut game, &["g8f6"]);
    let capture: Move = "e5d6".parse().unwrap();
    assert!(!game.position.legal_moves().contains(&capture));
}

#[test]
fn castling_through_an_attacked_square_is_illegal_but_the_far_side_is_not() {
    let mut pos = Position::empty();
    pos.set_piece_at(Square::new(4, 0), Some(Piece::new(Color::White, PieceKind::King)));
    pos.set_piece_at(Square::new(7, 0), Some(Piece::new(Color::White, PieceKind::Rook)));
    pos.set_piece_at(Square::new(0, 0), Some(Piece::new(Color::White, PieceKind::Rook)));
    pos.set_piece_at(Square::new(4, 7), Some(Piece::new(Color::Black, PieceKind::King)));
    // Rook on f8 rakes the f1 square the king would cross to castle king-side.
    pos.set_piece_at(Square::new(5, 7), Some(Piece::new(Color::Black, PieceKind::Rook)));
    pos.castling = Castling::start_position();

    let moves = pos.legal_moves_from(Square::new(4, 0));
    let king_side = Move::new(Square::new(4, 0), Square::new(6, 0), None);
    let queen_side = Move::new(Square::new(4, 0), Square::new(2, 0), None);
    assert!(!moves.contains(&king_side));
    assert!(moves.contains(&queen_side));
}

#[test]
fn knight_shuffle_triggers_threefold_repetition() {
    let mut game = Game::start_position();
    play(
        &mut game,
        &["g1f3", "g8f6", "f3g1", "f6g8", "g1f3", "g8f6", "f3g1", "f6g8"],
    );
    assert_eq!(game.status(), GameStatus::DrawThreefoldRepetition);
}

#[test]
fn every_legal_move_applies_without_error_and_leaves_the_mover_unchecked() {
    let pos = Position::start_position();
    for mv in pos.legal_moves() {
        let (next, _) = pos.apply(mv).unwrap_or_else(|e| panic!("{mv} should apply: {e}"));
        assert!(!next.is_check(pos.side_to_move), "{mv} should not leave the mover in check");
    }
}

#[test]
fn halfmove_clock_resets_on_pawn_move_or_capture_and_otherwise_increments() {
    let mut game = Game::start_position();
    play(&mut game, &["g1f3"]);
    assert_eq!(game.position.halfmove_clock, 1);
    play(&mut game, &["g8f6"]);
    assert_eq!(game.position.halfmove_clock, 2);
    play(&mut game, &["e2e4"]);
    assert_eq!(game.position.halfmove_clock, 0);
}

#[test]
fn castling_rights_only_ever_shrink() {
    let mut game = Game::start_position();
    assert_eq!(game.position.castling, Castling::start_position());

    // Knight moves touch neither king nor rook: rights are untouched.
    play(&mut game, &["g1f3", "g8f6"]);
    assert_eq!(game.position.castling, Castling::start_position());

    // Clear the king's path and move it: both of White's rights are revoked.
    play(&mut game, &["e2e4", "b8c6", "f1c4", "a7a6", "e1f1"]);
    let after_king_move = game.position.castling;
    assert!(!after_king_move.white_king_side && !after_king_move.white_queen_side);
    assert!(after_king_move.black_king_side && after_king_move.black_queen_side);
}

#[test]
fn repetition_key_is_stable_across_move_counters_but_sensitive_to_position() {
    let a = Position::parse_fen("8/8/8/8/8/8/8/K6k w - - 3 7").unwrap();
    let b = Position::parse_fen("8/8/8/8/8/8/8/K6k w - - 40 90").unwrap();
    let c = Position::parse_fen("8/8/8/8/8/8/1K5k w - - 3 7").unwrap();
    assert_eq!(a.repetition_key(), b.repetition_key());
    assert_ne!(a.repetition_key(), c.repetition_key());
}
