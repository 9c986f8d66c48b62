//! Canonical position encoding (spec §3's position encoder, C2).
//!
//! The format is FEN: six space-separated fields — piece placement,
//! side to move, castling rights, en-passant target, halfmove clock,
//! fullmove number. Used both as the external analysis format handed
//! to clients/spectators and, with the last two fields stripped, as the
//! repetition key a `Game` uses to detect threefold repetition.

use std::fmt::Write as _;

use crate::coretypes::{Castling, Color, MoveCount, Piece, PieceKind, Square};
use crate::error::{self, ErrorKind};
use crate::position::Position;

/// Encode/decode a `Position` as FEN.
pub trait Fen: Sized {
    fn parse_fen(fen: &str) -> error::Result<Self>;
    fn to_fen(&self) -> String;

    /// `to_fen` with the halfmove clock and fullmove number fields dropped:
    /// two positions are "the same" for repetition purposes iff this string
    /// matches, regardless of how many quiet moves preceded either.
    fn repetition_key(&self) -> String {
        let full = self.to_fen();
        full.rsplitn(3, ' ')
            .last()
            .map(str::to_string)
            .unwrap_or(full)
    }
}

impl Fen for Position {
    fn parse_fen(fen: &str) -> error::Result<Self> {
        let mut fields = fen.split_ascii_whitespace();
        let placement = fields.next().ok_or(ErrorKind::ParseFenMalformed)?;
        let side = fields.next().ok_or(ErrorKind::ParseFenMalformed)?;
        let castling = fields.next().ok_or(ErrorKind::ParseFenMalformed)?;
        let en_passant = fields.next().ok_or(ErrorKind::ParseFenMalformed)?;
        let halfmove = fields.next().unwrap_or("0");
        let fullmove = fields.next().unwrap_or("1");
        if fields.next().is_some() {
            return Err(ErrorKind::ParseFenMalformed.into());
        }

        let mut position = Position::empty();

        let ranks: Vec<&str> = placement.split('/').collect();
        if ranks.len() != 8 {
            return Err(ErrorKind::ParseFenMalformed.into());
        }
        // FEN lists rank 8 first.
        for (i, rank_str) in ranks.iter().enumerate() {
            let rank = 7 - i as u8;
            let mut file: u8 = 0;
            for c in rank_str.chars() {
                if let Some(skip) = c.to_digit(10) {
                    file += skip as u8;
                    continue;
                }
                if file >= 8 {
                    return Err(ErrorKind::ParseFenMalformed.into());
                }
                let color = if c.is_ascii_uppercase() {
                    Color::White
                } else {
                    Color::Black
                };
                let kind = match c.to_ascii_uppercase() {
                    'P' => PieceKind::Pawn,
                    'N' => PieceKind::Knight,
                    'B' => PieceKind::Bishop,
                    'R' => PieceKind::Rook,
                    'Q' => PieceKind::Queen,
                    'K' => PieceKind::King,
                    _ => return Err(ErrorKind::ParseFenMalformed.into()),
                };
                position.set_piece_at(Square::new(file, rank), Some(Piece::new(color, kind)));
                file += 1;
            }
            if file != 8 {
                return Err(ErrorKind::ParseFenMalformed.into());
            }
        }

        position.side_to_move = match side {
            "w" => Color::White,
            "b" => Color::Black,
            _ => return Err(ErrorKind::ParseFenMalformed.into()),
        };

        position.castling = if castling == "-" {
            Castling::none()
        } else {
            let mut rights = Castling::none();
            for c in castling.chars() {
                match c {
                    'K' => rights.white_king_side = true,
                    'Q' => rights.white_queen_side = true,
                    'k' => rights.black_king_side = true,
                    'q' => rights.black_queen_side = true,
                    _ => return Err(ErrorKind::ParseFenMalformed.into()),
                }
            }
            rights
        };

        position.en_passant = if en_passant == "-" {
            None
        } else {
            Some(en_passant.parse().map_err(|_| ErrorKind::ParseFenMalformed)?)
        };

        position.halfmove_clock = halfmove
            .parse::<MoveCount>()
            .map_err(|_| ErrorKind::ParseFenMalformed)?;
        position.fullmove_number = fullmove
            .parse::<MoveCount>()
            .map_err(|_| ErrorKind::ParseFenMalformed)?;

        Ok(position)
    }

    fn to_fen(&self) -> String {
        let mut placement = String::new();
        for i in 0..8u8 {
            let rank = 7 - i;
            let mut empty_run = 0u8;
            for file in 0..8u8 {
                match self.piece_at(Square::new(file, rank)) {
                    None => empty_run += 1,
                    Some(piece) => {
                        if empty_run > 0 {
                            write!(placement, "{empty_run}").unwrap();
                            empty_run = 0;
                        }
                        let letter = piece.kind.letter();
                        let c = if piece.color == Color::White {
                            letter
                        } else {
                            letter.to_ascii_lowercase()
                        };
                        placement.push(c);
                    }
                }
            }
            if empty_run > 0 {
                write!(placement, "{empty_run}").unwrap();
            }
            if rank != 0 {
                placement.push('/');
            }
        }

        let side = match self.side_to_move {
            Color::White => "w",
            Color::Black => "b",
        };

        let mut castling = String::new();
        if self.castling.white_king_side {
            castling.push('K');
        }
        if self.castling.white_queen_side {
            castling.push('Q');
        }
        if self.castling.black_king_side {
            castling.push('k');
        }
        if self.castling.black_queen_side {
            castling.push('q');
        }
        if castling.is_empty() {
            castling.push('-');
        }

        let en_passant = self
            .en_passant
            .map(|sq| sq.to_string())
            .unwrap_or_else(|| "-".to_string());

        format!(
            "{placement} {side} {castling} {en_passant} {} {}",
            self.halfmove_clock, self.fullmove_number
        )
    }
}
