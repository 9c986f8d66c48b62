//! Chess engine error type.

use std::error;
use std::fmt::{self, Display};
use std::result;

/// Chess engine generic result type.
pub type Result<T> = result::Result<T, Error>;

/// A list specifying general errors the rules engine can produce.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// There is no piece of the side to move on the move's `from` square.
    NoPieceAt,
    /// The piece on `from` belongs to the side that is not to move.
    WrongSide,
    /// The piece on `from` cannot legally reach `to` in this position.
    PieceCannotReach,
    /// Applying the move would leave (or keep) the mover's own king in check.
    WouldLeaveOwnKingInCheck,
    /// The move named a promotion piece kind that is not one of
    /// knight/bishop/rook/queen.
    BadPromotionChoice,
    /// `apply` was called on a position whose game has already ended.
    GameAlreadyEnded,

    /// Square parse string malformed, e.g. not `<file><rank>`.
    ParseSquareMalformed,
    /// File parse character out of `a`..=`h`.
    ParseFileMalformed,
    /// Rank parse character out of `1`..=`8`.
    ParseRankMalformed,
    /// FEN-like position string malformed.
    ParseFenMalformed,
    /// Move string malformed, expected `<from><to>[promo]`.
    ParseMoveMalformed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NoPieceAt => "no piece at square",
            ErrorKind::WrongSide => "wrong side to move",
            ErrorKind::PieceCannotReach => "piece cannot reach square",
            ErrorKind::WouldLeaveOwnKingInCheck => "would leave own king in check",
            ErrorKind::BadPromotionChoice => "bad promotion choice",
            ErrorKind::GameAlreadyEnded => "game already ended",
            ErrorKind::ParseSquareMalformed => "parse square malformed",
            ErrorKind::ParseFileMalformed => "parse file malformed",
            ErrorKind::ParseRankMalformed => "parse rank malformed",
            ErrorKind::ParseFenMalformed => "parse fen malformed",
            ErrorKind::ParseMoveMalformed => "parse move malformed",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The primary error type for the chess rules engine.
#[derive(Debug)]
pub enum Error {
    Simple(ErrorKind),
    Message(ErrorKind, String),
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Simple(error_kind) => write!(f, "{error_kind}"),
            Error::Message(error_kind, string) => write!(f, "{error_kind}: {string}"),
        }
    }
}

impl error::Error for Error {}

impl From<ErrorKind> for Error {
    fn from(error_kind: ErrorKind) -> Self {
        Self::Simple(error_kind)
    }
}

impl<S: ToString> From<(ErrorKind, S)> for Error {
    fn from((error_kind, stringable): (ErrorKind, S)) -> Self {
        Self::Message(error_kind, stringable.to_string())
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Simple(kind) | Error::Message(kind, _) => *kind,
        }
    }
}
