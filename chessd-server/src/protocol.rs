//! Wire protocol: framing and the message taxonomy (C8, spec §4.8/§6).
//!
//! Framing is a 4-byte big-endian length prefix followed by exactly that
//! many payload bytes; the payload is a JSON object carrying a `type` tag
//! and the fields for that tag. The frame length is an upper bound on bytes
//! consumed per message: `read_frame` never reads past it. An unrecognized
//! tag is reported separately from a malformed payload so the dispatcher
//! can drop-with-warning on the former and close the connection on the
//! latter, per spec.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

use crate::collaborators::{Profile, SessionSnapshot};
use crate::error::{Rejection, ServerError};

/// Frames larger than this are refused outright; a conforming client never
/// needs more than a few KiB for any tag in this taxonomy.
pub const MAX_FRAME_LEN: u32 = 1 << 20;

/// Side of the board, mirrored from `chessd_engine::Color` so the wire
/// format has no dependency on the engine crate's internal representation.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum Side {
    White,
    Black,
}

impl From<chessd_engine::Color> for Side {
    fn from(color: chessd_engine::Color) -> Self {
        match color {
            chessd_engine::Color::White => Side::White,
            chessd_engine::Color::Black => Side::Black,
        }
    }
}

/// A matchmaking ticket action: enqueue with a desired time control, or
/// cancel the caller's own outstanding ticket. `time_control_profile` is
/// required when `cancel` is false and ignored otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchmakingAction {
    pub cancel: bool,
    pub time_control_profile: Option<String>,
}

/// A move, as applied, rendered for the wire: the move text plus the flags
/// a client needs to render it (check, capture, castle, etc).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMoveRecord {
    pub mv: String,
    pub captured: Option<String>,
    pub is_castle: bool,
    pub is_en_passant: bool,
    pub is_promotion: bool,
    pub gives_check: bool,
    pub is_checkmate: bool,
    pub is_stalemate: bool,
}

impl From<chessd_engine::MoveRecord> for WireMoveRecord {
    fn from(record: chessd_engine::MoveRecord) -> Self {
        Self {
            mv: record.move_.to_string(),
            captured: record.captured.map(|k| k.letter().to_string()),
            is_castle: record.is_castle,
            is_en_passant: record.is_en_passant,
            is_promotion: record.is_promotion,
            gives_check: record.gives_check,
            is_checkmate: record.is_checkmate,
            is_stalemate: record.is_stalemate,
        }
    }
}

/// Every inbound request and outbound broadcast this server emits or
/// accepts. Inbound/outbound share one tagged enum, matching the
/// serde-tagged message taxonomy pattern used across the example pack.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    // --- inbound ---
    Login {
        username: String,
        password: String,
    },
    Register {
        username: String,
        password: String,
    },
    Connect {
        session_id: Option<Uuid>,
        time_control_profile: Option<String>,
    },
    Move {
        mv: String,
    },
    RequestDraw,
    RespondDraw {
        accept: bool,
    },
    Resign,
    MatchmakingRequest {
        #[serde(flatten)]
        request: MatchmakingAction,
    },
    SaveGame,
    LoadGame {
        id: Uuid,
    },
    PlayerStats {
        username: Option<String>,
    },
    LeaderboardRequest {
        n: usize,
    },
    GameAnalysisRequest,
    MoveRecommendationsRequest {
        n: Option<usize>,
    },
    Ping,

    // --- outbound ---
    Pong,
    LoginResult {
        success: bool,
        profile: Option<Profile>,
    },
    RegisterResult {
        success: bool,
        profile: Option<Profile>,
    },
    GameStart {
        session_id: Uuid,
        side: Side,
    },
    GameState {
        fen: String,
        side_to_move: Side,
        status: String,
    },
    MoveResult {
        record: WireMoveRecord,
    },
    PossibleMoves {
        moves: Vec<String>,
    },
    TimeUpdate {
        white_ms: u64,
        black_ms: u64,
    },
    GameEnd {
        status: String,
        reason: Option<String>,
    },
    MatchmakingStatus {
        state: String,
    },
    PlayerStatsResult {
        profile: Profile,
    },
    LeaderboardResult {
        profiles: Vec<Profile>,
    },
    GameAnalysisResult {
        evaluation_centipawns: i32,
    },
    MoveRecommendations {
        moves: Vec<(String, i32)>,
    },
    SaveGameResult {
        id: Uuid,
    },
    LoadGameResult {
        snapshot: SessionSnapshot,
    },
    Error(Rejection),
}

/// The full set of tags this server recognizes. Used to separate "unknown
/// tag" (drop, warn, stay connected) from "malformed payload" (close).
const KNOWN_TAGS: &[&str] = &[
    "Login",
    "Register",
    "Connect",
    "Move",
    "RequestDraw",
    "RespondDraw",
    "Resign",
    "MatchmakingRequest",
    "SaveGame",
    "LoadGame",
    "PlayerStats",
    "LeaderboardRequest",
    "GameAnalysisRequest",
    "MoveRecommendationsRequest",
    "Ping",
];

/// Result of decoding one payload: either a recognized message, or a tag
/// that isn't one of ours (caller should drop-with-warning, not close).
pub enum Decoded {
    Message(Message),
    UnknownTag(String),
}

/// Decodes one payload (the bytes inside a single frame) into a `Message`.
/// Distinguishes an unrecognized tag from a genuinely malformed payload.
pub fn decode_message(bytes: &[u8]) -> Result<Decoded, ServerError> {
    let value: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| ServerError::ClientProtocol(format!("malformed payload: {e}")))?;

    let tag = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| ServerError::ClientProtocol("payload missing 'type' tag".to_string()))?;

    if !KNOWN_TAGS.contains(&tag) {
        return Ok(Decoded::UnknownTag(tag.to_string()));
    }

    let message: Message = serde_json::from_value(value)
        .map_err(|e| ServerError::ClientProtocol(format!("malformed body for tag '{tag}': {e}")))?;
    Ok(Decoded::Message(message))
}

/// Serializes a message to its payload bytes. Infallible for every variant
/// this server constructs itself.
pub fn encode_message(message: &Message) -> Vec<u8> {
    serde_json::to_vec(message).expect("Message always serializes")
}

/// Reads one length-prefixed frame's payload. Returns `Ok(None)` on a clean
/// EOF before any bytes of a new frame arrive.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame length {len} exceeds maximum {MAX_FRAME_LEN}"),
        ));
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

/// Writes one length-prefixed frame carrying `payload`.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> std::io::Result<()> {
    let len = u32::try_from(payload.len()).map_err(|_| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "payload too large to frame")
    })?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_round_trips() {
        let bytes = encode_message(&Message::Ping);
        match decode_message(&bytes).unwrap() {
            Decoded::Message(Message::Ping) => {}
            _ => panic!("expected Ping"),
        }
    }

    #[test]
    fn unknown_tag_is_reported_distinctly() {
        let bytes = br#"{"type":"Teleport","to":"h8"}"#.to_vec();
        match decode_message(&bytes).unwrap() {
            Decoded::UnknownTag(tag) => assert_eq!(tag, "Teleport"),
            Decoded::Message(_) => panic!("expected UnknownTag"),
        }
    }

    #[test]
    fn malformed_json_is_a_client_protocol_error() {
        let bytes = b"not json".to_vec();
        assert!(matches!(
            decode_message(&bytes),
            Err(ServerError::ClientProtocol(_))
        ));
    }

    #[tokio::test]
    async fn frame_round_trips_over_a_duplex_pipe() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let payload = encode_message(&Message::Resign);
        write_frame(&mut client, &payload).await.unwrap();
        let received = read_frame(&mut server).await.unwrap().unwrap();
        assert_eq!(received, payload);
    }
}
