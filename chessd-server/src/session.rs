//! Per-game session state machine (C3).
//!
//! A `Session` owns exactly one game's `chessd_engine::Game`, both players'
//! clocks, and the session-level status (which is a superset of the rules
//! engine's terminal statuses: it also covers timeout, resignation, draw
//! agreement, and abandonment, none of which the engine knows about). All
//! mutating methods take `&mut self` — the caller (the dispatcher) is
//! responsible for holding this session's exclusive lock for the duration
//! of the call and releasing it before any network I/O.

use std::time::{Duration, Instant};

use chessd_engine::{Color, Game, GameStatus, Move, MoveRecord};
use uuid::Uuid;

use crate::collaborators::TimeControl;
use crate::error::{Result, ServerError};
use crate::registry::EndpointId;

/// Why a terminal `SessionStatus` was reached.
#[derive(Debug, Copy, Clone, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum TerminationReason {
    Checkmate,
    Stalemate,
    Timeout,
    Resignation,
    Agreement,
    InsufficientMaterial,
    FiftyMove,
    ThreefoldRepetition,
    Abandonment,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::Checkmate => "checkmate",
            TerminationReason::Stalemate => "stalemate",
            TerminationReason::Timeout => "timeout",
            TerminationReason::Resignation => "resignation",
            TerminationReason::Agreement => "agreement",
            TerminationReason::InsufficientMaterial => "insufficient-material",
            TerminationReason::FiftyMove => "fifty-move",
            TerminationReason::ThreefoldRepetition => "threefold-repetition",
            TerminationReason::Abandonment => "abandonment",
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SessionStatus {
    Pending,
    Active,
    /// A seated player's endpoint dropped while a reconnection grace period
    /// was configured. A matching `Connect` before the deadline resumes the
    /// game in place; otherwise the clock loop finishes it as `Abandoned`.
    AwaitingReconnect,
    WhiteWin,
    BlackWin,
    Draw,
    Abandoned,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::WhiteWin
                | SessionStatus::BlackWin
                | SessionStatus::Draw
                | SessionStatus::Abandoned
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Active => "active",
            SessionStatus::AwaitingReconnect => "awaiting-reconnect",
            SessionStatus::WhiteWin => "white-win",
            SessionStatus::BlackWin => "black-win",
            SessionStatus::Draw => "draw",
            SessionStatus::Abandoned => "abandoned",
        }
    }

    fn for_winner(color: Color) -> Self {
        match color {
            Color::White => SessionStatus::WhiteWin,
            Color::Black => SessionStatus::BlackWin,
        }
    }
}

/// One occupied player slot.
#[derive(Debug, Clone)]
pub struct PlayerSlot {
    pub identity: String,
    pub endpoint: Option<EndpointId>,
    pub clock_remaining_ms: u64,
    pub is_bot: bool,
    pub bot_strength: Option<u8>,
}

impl PlayerSlot {
    pub fn human(identity: impl Into<String>, endpoint: EndpointId, clock_remaining_ms: u64) -> Self {
        Self {
            identity: identity.into(),
            endpoint: Some(endpoint),
            clock_remaining_ms,
            is_bot: false,
            bot_strength: None,
        }
    }

    pub fn bot(identity: impl Into<String>, clock_remaining_ms: u64, strength: u8) -> Self {
        Self {
            identity: identity.into(),
            endpoint: None,
            clock_remaining_ms,
            is_bot: true,
            bot_strength: Some(strength),
        }
    }
}

pub struct Session {
    pub id: Uuid,
    pub white: Option<PlayerSlot>,
    pub black: Option<PlayerSlot>,
    pub game: Game,
    pub time_control: TimeControl,
    pub status: SessionStatus,
    pub termination_reason: Option<TerminationReason>,
    pub pending_draw_offer: Option<Color>,
    move_start: Instant,
    reconnect_grace: Duration,
    disconnect_deadline: Option<Instant>,
}

impl Session {
    pub fn new(time_control: TimeControl) -> Self {
        Self {
            id: Uuid::new_v4(),
            white: None,
            black: None,
            game: Game::start_position(),
            time_control,
            status: SessionStatus::Pending,
            termination_reason: None,
            pending_draw_offer: None,
            move_start: Instant::now(),
            reconnect_grace: Duration::ZERO,
            disconnect_deadline: None,
        }
    }

    /// Opts this session into a reconnection grace period: a disconnect
    /// while `Active` parks the session as `AwaitingReconnect` for `grace`
    /// instead of abandoning it immediately. `Duration::ZERO` (the default)
    /// preserves immediate-abandon semantics.
    pub fn with_reconnect_grace(mut self, grace: Duration) -> Self {
        self.reconnect_grace = grace;
        self
    }

    pub fn slot(&self, color: Color) -> Option<&PlayerSlot> {
        match color {
            Color::White => self.white.as_ref(),
            Color::Black => self.black.as_ref(),
        }
    }

    fn slot_mut(&mut self, color: Color) -> Option<&mut PlayerSlot> {
        match color {
            Color::White => self.white.as_mut(),
            Color::Black => self.black.as_mut(),
        }
    }

    pub(crate) fn side_of(&self, identity: &str) -> Option<Color> {
        if self.white.as_ref().is_some_and(|s| s.identity == identity) {
            Some(Color::White)
        } else if self.black.as_ref().is_some_and(|s| s.identity == identity) {
            Some(Color::Black)
        } else {
            None
        }
    }

    /// Fills the named side's slot. Transitions Pending → Active and starts
    /// the clock once both slots are filled.
    pub fn attach(&mut self, side: Color, slot: PlayerSlot, now: Instant) -> Result<()> {
        if self.slot(side).is_some() {
            return Err(ServerError::RuleRejection(format!(
                "{side:?} slot is already occupied"
            )));
        }
        match side {
            Color::White => self.white = Some(slot),
            Color::Black => self.black = Some(slot),
        }
        if self.white.is_some() && self.black.is_some() {
            self.status = SessionStatus::Active;
            self.move_start = now;
        }
        Ok(())
    }

    /// Validates and applies a move from `identity`. Only valid while
    /// `Active` and only for the side whose turn it is.
    pub fn submit_move(&mut self, identity: &str, mv: Move, now: Instant) -> Result<MoveRecord> {
        if self.status != SessionStatus::Active {
            return Err(ServerError::RuleRejection("game is not active".to_string()));
        }
        let mover = self.game.position.side_to_move;
        match self.side_of(identity) {
            Some(side) if side == mover => {}
            Some(_) => return Err(ServerError::RuleRejection("not your turn".to_string())),
            None => {
                return Err(ServerError::RuleRejection(
                    "identity is not seated in this session".to_string(),
                ))
            }
        }

        let record = self.game.apply_move(mv)?;

        let elapsed_ms = now.saturating_duration_since(self.move_start).as_millis() as u64;
        if let Some(slot) = self.slot_mut(mover) {
            slot.clock_remaining_ms = slot.clock_remaining_ms.saturating_sub(elapsed_ms);
            slot.clock_remaining_ms += self.time_control.increment_ms;
        }
        self.move_start = now;
        self.pending_draw_offer = None;

        self.apply_terminal_checks();
        Ok(record)
    }

    fn apply_terminal_checks(&mut self) {
        match self.game.status() {
            GameStatus::InProgress => {}
            GameStatus::Checkmate { winner } => {
                self.finish(SessionStatus::for_winner(winner), TerminationReason::Checkmate)
            }
            GameStatus::Stalemate => self.finish(SessionStatus::Draw, TerminationReason::Stalemate),
            GameStatus::DrawInsufficientMaterial => {
                self.finish(SessionStatus::Draw, TerminationReason::InsufficientMaterial)
            }
            GameStatus::DrawFiftyMove => {
                self.finish(SessionStatus::Draw, TerminationReason::FiftyMove)
            }
            GameStatus::DrawThreefoldRepetition => {
                self.finish(SessionStatus::Draw, TerminationReason::ThreefoldRepetition)
            }
        }
    }

    fn finish(&mut self, status: SessionStatus, reason: TerminationReason) {
        self.status = status;
        self.termination_reason = Some(reason);
    }

    /// Registers a standing draw offer from `identity`. If the opponent has
    /// an outstanding offer too, the offers cross and the game ends in a
    /// draw by agreement. A repeated offer from the same side is a no-op.
    pub fn offer_draw(&mut self, identity: &str) -> Result<()> {
        if self.status != SessionStatus::Active {
            return Err(ServerError::RuleRejection("game is not active".to_string()));
        }
        let side = self
            .side_of(identity)
            .ok_or_else(|| ServerError::RuleRejection("identity is not seated in this session".to_string()))?;

        match self.pending_draw_offer {
            Some(existing) if existing == side => {}
            Some(_opponent) => self.finish(SessionStatus::Draw, TerminationReason::Agreement),
            None => self.pending_draw_offer = Some(side),
        }
        Ok(())
    }

    /// Responds to the opponent's pending draw offer.
    pub fn respond_draw(&mut self, identity: &str, accept: bool) -> Result<()> {
        if self.status != SessionStatus::Active {
            return Err(ServerError::RuleRejection("game is not active".to_string()));
        }
        let side = self
            .side_of(identity)
            .ok_or_else(|| ServerError::RuleRejection("identity is not seated in this session".to_string()))?;

        match self.pending_draw_offer {
            Some(offeror) if offeror != side => {
                if accept {
                    self.finish(SessionStatus::Draw, TerminationReason::Agreement);
                } else {
                    self.pending_draw_offer = None;
                }
                Ok(())
            }
            _ => Err(ServerError::RuleRejection("no pending draw offer to respond to".to_string())),
        }
    }

    /// Immediate resignation: the opposite side wins.
    pub fn resign(&mut self, identity: &str) -> Result<()> {
        if self.status != SessionStatus::Active {
            return Err(ServerError::RuleRejection("game is not active".to_string()));
        }
        let side = self
            .side_of(identity)
            .ok_or_else(|| ServerError::RuleRejection("identity is not seated in this session".to_string()))?;
        self.finish(SessionStatus::for_winner(side.opposite()), TerminationReason::Resignation);
        Ok(())
    }

    /// Called by the registry when an endpoint drops. If `Active` and a
    /// reconnection grace period is configured, the session is parked as
    /// `AwaitingReconnect` with a deadline instead of finishing outright;
    /// with no grace period it is abandoned immediately, as before. If
    /// `Pending`, the vacated slot is simply cleared.
    pub fn on_disconnect(&mut self, endpoint: EndpointId, now: Instant) {
        match self.status {
            SessionStatus::Active => {
                if self.reconnect_grace.is_zero() {
                    self.finish(SessionStatus::Abandoned, TerminationReason::Abandonment);
                    return;
                }
                if let Some(slot) = self.white.as_mut().filter(|s| s.endpoint == Some(endpoint)) {
                    slot.endpoint = None;
                }
                if let Some(slot) = self.black.as_mut().filter(|s| s.endpoint == Some(endpoint)) {
                    slot.endpoint = None;
                }
                self.status = SessionStatus::AwaitingReconnect;
                self.disconnect_deadline = Some(now + self.reconnect_grace);
            }
            SessionStatus::Pending => {
                if self.white.as_ref().and_then(|s| s.endpoint) == Some(endpoint) {
                    self.white = None;
                }
                if self.black.as_ref().and_then(|s| s.endpoint) == Some(endpoint) {
                    self.black = None;
                }
            }
            _ => {}
        }
    }

    /// Resumes an `AwaitingReconnect` session for the named identity's
    /// already-seated slot, binding it to the new endpoint. Fails if the
    /// session isn't awaiting reconnection or the identity isn't seated.
    pub fn reconnect(&mut self, identity: &str, endpoint: EndpointId, now: Instant) -> Result<Color> {
        if self.status != SessionStatus::AwaitingReconnect {
            return Err(ServerError::RuleRejection(
                "session is not awaiting reconnection".to_string(),
            ));
        }
        let side = self
            .side_of(identity)
            .ok_or_else(|| ServerError::RuleRejection("identity is not seated in this session".to_string()))?;
        if let Some(slot) = self.slot_mut(side) {
            slot.endpoint = Some(endpoint);
        }
        self.status = SessionStatus::Active;
        self.disconnect_deadline = None;
        self.move_start = now;
        Ok(side)
    }

    /// Unconditionally ends the session as `Abandoned`, regardless of its
    /// current status. Used when the server hits an internal error while
    /// handling this session and can no longer trust it to keep running
    /// correctly. A no-op if the session already reached a terminal status.
    pub fn force_abandon(&mut self) {
        if !self.status.is_terminal() {
            self.finish(SessionStatus::Abandoned, TerminationReason::Abandonment);
        }
    }

    /// Invoked periodically by the clock loop. If the side to move has run
    /// out of time since `move_start`, the opponent wins by timeout. A
    /// session past its reconnection deadline is abandoned. A terminal or
    /// `Pending` session is always a no-op.
    pub fn tick(&mut self, now: Instant) {
        if self.status == SessionStatus::AwaitingReconnect {
            if self.disconnect_deadline.is_some_and(|deadline| now >= deadline) {
                self.finish(SessionStatus::Abandoned, TerminationReason::Abandonment);
            }
            return;
        }
        if self.status != SessionStatus::Active {
            return;
        }
        let mover = self.game.position.side_to_move;
        let elapsed_ms = now.saturating_duration_since(self.move_start).as_millis() as u64;
        let remaining_ms = self.slot(mover).map(|s| s.clock_remaining_ms).unwrap_or(0);
        if elapsed_ms > remaining_ms {
            self.finish(SessionStatus::for_winner(mover.opposite()), TerminationReason::Timeout);
        }
    }
}
