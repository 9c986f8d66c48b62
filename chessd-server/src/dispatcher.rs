//! Protocol dispatcher (C8 routing): routes one already-decoded `Message` to
//! its handler, enforces the authentication gate, and composes outbound
//! replies/broadcasts through the registry.
//!
//! Handlers acquire the registry, then (if needed) one session lock, in that
//! order, and release both before sending anything — no handler here awaits
//! network I/O while holding a lock. This mirrors the teacher's top-level
//! match-on-command dispatch loop, generalized to the full tag set and made
//! async so the orchestrator can run one dispatch per connection task.

use std::sync::Arc;
use std::time::Instant;

use chessd_engine::{Bot, Color, Fen, Move};
use tracing::warn;
use uuid::Uuid;

use crate::clock::SessionHandle;
use crate::collaborators::{Profile, SessionSnapshot, TimeControl};
use crate::error::{Result, ServerError};
use crate::matchmaker::Ticket;
use crate::orchestrator::AppState;
use crate::protocol::{Message, MatchmakingAction, Side, WireMoveRecord};
use crate::registry::EndpointId;
use crate::session::{PlayerSlot, Session, SessionStatus};

/// Default breadth for `MoveRecommendationsRequest` when the client omits
/// `n`.
const DEFAULT_RECOMMENDATION_COUNT: usize = 3;
/// Strength whose `depth()` sets the fixed, shallow lookahead used by
/// `handle_game_analysis` and `handle_move_recommendations` — a read-only
/// query searches at this depth regardless of any bot actually seated in
/// the session it is advising about.
const ADVISORY_BOT_STRENGTH: u8 = 3;

/// Tags an unauthenticated endpoint may send. Everything else is rejected
/// with `ClientProtocol` per spec's authentication gate.
fn requires_auth(message: &Message) -> bool {
    !matches!(message, Message::Login { .. } | Message::Register { .. } | Message::Ping)
}

pub async fn handle_message(state: &AppState, endpoint: EndpointId, message: Message) -> Result<()> {
    if requires_auth(&message) && !state.registry.is_authenticated(endpoint) {
        return Err(ServerError::ClientProtocol(
            "this message requires an authenticated connection".to_string(),
        ));
    }

    match message {
        Message::Login { username, password } => handle_login(state, endpoint, username, password),
        Message::Register { username, password } => handle_register(state, endpoint, username, password),
        Message::Connect { session_id, time_control_profile } => {
            handle_connect(state, endpoint, session_id, time_control_profile)
        }
        Message::Move { mv } => handle_move(state, endpoint, mv),
        Message::RequestDraw => handle_request_draw(state, endpoint),
        Message::RespondDraw { accept } => handle_respond_draw(state, endpoint, accept),
        Message::Resign => handle_resign(state, endpoint),
        Message::MatchmakingRequest { request } => handle_matchmaking_request(state, endpoint, request),
        Message::SaveGame => handle_save_game(state, endpoint),
        Message::LoadGame { id } => handle_load_game(state, endpoint, id),
        Message::PlayerStats { username } => handle_player_stats(state, endpoint, username),
        Message::LeaderboardRequest { n } => handle_leaderboard(state, endpoint, n),
        Message::GameAnalysisRequest => handle_game_analysis(state, endpoint),
        Message::MoveRecommendationsRequest { n } => handle_move_recommendations(state, endpoint, n),
        Message::Ping => {
            state.registry.send(endpoint, Message::Pong);
            Ok(())
        }
        other => Err(ServerError::ClientProtocol(format!(
            "'{other:?}' is not a client-sendable message"
        ))),
    }
}

fn identity_of(state: &AppState, endpoint: EndpointId) -> Result<String> {
    state.registry.lookup_identity(endpoint).ok_or_else(|| {
        ServerError::Internal("authenticated endpoint has no identity on record".to_string())
    })
}

fn session_handle(state: &AppState, session_id: Uuid) -> Result<SessionHandle> {
    state
        .sessions
        .lock()
        .unwrap()
        .get(&session_id)
        .cloned()
        .ok_or(ServerError::SessionMissing(session_id))
}

fn endpoint_session(state: &AppState, endpoint: EndpointId) -> Result<(Uuid, SessionHandle)> {
    let session_id = state
        .registry
        .lookup_session(endpoint)
        .ok_or_else(|| ServerError::RuleRejection("not connected to a session".to_string()))?;
    Ok((session_id, session_handle(state, session_id)?))
}

fn handle_login(state: &AppState, endpoint: EndpointId, username: String, password: String) -> Result<()> {
    let success = state.account_store.authenticate(&username, &password);
    let profile = if success {
        state.registry.authenticate(endpoint, username.clone());
        state.account_store.load(&username)
    } else {
        None
    };
    state.registry.send(endpoint, Message::LoginResult { success, profile });
    Ok(())
}

fn handle_register(state: &AppState, endpoint: EndpointId, username: String, password: String) -> Result<()> {
    match state.account_store.register(&username, &password) {
        Ok(profile) => {
            state.registry.authenticate(endpoint, username);
            state
                .registry
                .send(endpoint, Message::RegisterResult { success: true, profile: Some(profile) });
        }
        Err(e) => {
            warn!(error = %e, "registration rejected");
            state
                .registry
                .send(endpoint, Message::RegisterResult { success: false, profile: None });
        }
    }
    Ok(())
}

fn handle_connect(
    state: &AppState,
    endpoint: EndpointId,
    session_id: Option<Uuid>,
    time_control_profile: Option<String>,
) -> Result<()> {
    let identity = identity_of(state, endpoint)?;
    let now = Instant::now();

    let (id, handle, side) = match session_id {
        Some(id) => {
            let handle = session_handle(state, id)?;
            let side = {
                let mut session = handle.lock().unwrap();
                if session.status == SessionStatus::AwaitingReconnect && session.side_of(&identity).is_some() {
                    session.reconnect(&identity, endpoint, now)?
                } else if session.slot(Color::White).is_none() {
                    let clock_ms = session.time_control.initial_ms;
                    session.attach(Color::White, PlayerSlot::human(identity.clone(), endpoint, clock_ms), now)?;
                    Color::White
                } else if session.slot(Color::Black).is_none() {
                    let clock_ms = session.time_control.initial_ms;
                    session.attach(Color::Black, PlayerSlot::human(identity.clone(), endpoint, clock_ms), now)?;
                    Color::Black
                } else {
                    return Err(ServerError::RuleRejection("session is already full".to_string()));
                }
            };
            (id, handle, side)
        }
        None => {
            let time_control = time_control_profile
                .as_deref()
                .and_then(TimeControl::from_profile_name)
                .unwrap_or_default();
            let session = Session::new(time_control).with_reconnect_grace(state.reconnect_grace);
            let id = session.id;
            let handle: SessionHandle = Arc::new(std::sync::Mutex::new(session));
            state.sessions.lock().unwrap().insert(id, Arc::clone(&handle));
            {
                let mut session = handle.lock().unwrap();
                let clock_ms = session.time_control.initial_ms;
                session.attach(Color::White, PlayerSlot::human(identity, endpoint, clock_ms), now)?;
            }
            (id, handle, Color::White)
        }
    };

    state.registry.bind_to_session(endpoint, id);
    state.registry.send(endpoint, Message::GameStart { session_id: id, side: side.into() });

    let session = handle.lock().unwrap();
    broadcast_state(state, &session);
    Ok(())
}

/// Sends `GameState`, `PossibleMoves`, and `TimeUpdate` to every human slot
/// currently attached to `session`. Bot slots have no endpoint and receive
/// nothing, per spec.
pub(crate) fn broadcast_state(state: &AppState, session: &Session) {
    let fen = session.game.position.to_fen();
    let side_to_move: Side = session.game.position.side_to_move.into();
    let status = session.status.as_str().to_string();
    let possible_moves: Vec<String> = session
        .game
        .position
        .legal_moves()
        .iter()
        .map(Move::to_string)
        .collect();
    let white_ms = session.slot(Color::White).map(|s| s.clock_remaining_ms).unwrap_or(0);
    let black_ms = session.slot(Color::Black).map(|s| s.clock_remaining_ms).unwrap_or(0);

    for color in [Color::White, Color::Black] {
        let Some(endpoint) = session.slot(color).and_then(|s| s.endpoint) else {
            continue;
        };
        state.registry.send(
            endpoint,
            Message::GameState { fen: fen.clone(), side_to_move, status: status.clone() },
        );
        state.registry.send(endpoint, Message::PossibleMoves { moves: possible_moves.clone() });
        state.registry.send(endpoint, Message::TimeUpdate { white_ms, black_ms });
    }
}

/// If `session` just became terminal, broadcasts `GameEnd`, updates ratings
/// for human participants, and records history. Called with the status
/// observed immediately before the mutation that may have ended the game —
/// a session can only transition into terminal once, so this fires exactly
/// once per game.
fn finalize_if_newly_terminal(state: &AppState, session: &Session, was_active: bool) {
    if was_active && session.status.is_terminal() {
        finalize_terminal_session(state, session);
    }
}

/// Broadcasts `GameEnd`, updates ratings for human participants, and records
/// history for a session the caller has already confirmed just became
/// terminal. Also used directly by the clock loop's timeout callback, which
/// only fires on a genuine Active-to-terminal transition.
pub fn finalize_terminal_session(state: &AppState, session: &Session) {
    let reason = session.termination_reason.map(|r| r.as_str().to_string());
    for color in [Color::White, Color::Black] {
        if let Some(endpoint) = session.slot(color).and_then(|s| s.endpoint) {
            state.registry.send(
                endpoint,
                Message::GameEnd { status: session.status.as_str().to_string(), reason: reason.clone() },
            );
        }
    }
    update_ratings_and_history(state, session);
}

fn update_ratings_and_history(state: &AppState, session: &Session) {
    if let (Some(white), Some(black)) = (session.slot(Color::White), session.slot(Color::Black)) {
        let outcome = match session.status {
            SessionStatus::WhiteWin => Some((Color::White, false)),
            SessionStatus::BlackWin => Some((Color::Black, false)),
            SessionStatus::Draw => Some((Color::White, true)),
            _ => None,
        };
        if let Some((winner, draw)) = outcome {
            let (winner_slot, loser_slot) = if winner == Color::White { (white, black) } else { (black, white) };
            if !winner_slot.is_bot || !loser_slot.is_bot {
                apply_rating_update(state, winner_slot, loser_slot, draw);
            }
        }
    }

    let snapshot = SessionSnapshot {
        session_id: session.id,
        base_position_fen: session.game.base_position.to_fen(),
        moves: session.game.moves.iter().map(|r| r.move_.to_string()).collect(),
        time_control: session.time_control,
        white_username: session.slot(Color::White).map(|s| s.identity.clone()).unwrap_or_default(),
        black_username: session.slot(Color::Black).map(|s| s.identity.clone()).unwrap_or_default(),
        status: session.status.as_str().to_string(),
        reason: session.termination_reason.map(|r| r.as_str().to_string()),
    };
    state.history_store.save(snapshot);
}

fn apply_rating_update(state: &AppState, winner: &PlayerSlot, loser: &PlayerSlot, draw: bool) {
    let mut winner_profile = state
        .account_store
        .load(&winner.identity)
        .unwrap_or_else(|| Profile::new(winner.identity.as_str()));
    let mut loser_profile = state
        .account_store
        .load(&loser.identity)
        .unwrap_or_else(|| Profile::new(loser.identity.as_str()));

    let (new_winner_rating, new_loser_rating) =
        state.rating_updater.update(winner_profile.rating, loser_profile.rating, draw);

    winner_profile.rating = new_winner_rating;
    winner_profile.games_played += 1;
    loser_profile.rating = new_loser_rating;
    loser_profile.games_played += 1;
    if draw {
        winner_profile.draws += 1;
        loser_profile.draws += 1;
    } else {
        winner_profile.wins += 1;
        loser_profile.losses += 1;
    }

    if !winner.is_bot {
        let _ = state.account_store.save(winner_profile);
    }
    if !loser.is_bot {
        let _ = state.account_store.save(loser_profile);
    }
}

fn handle_move(state: &AppState, endpoint: EndpointId, mv: String) -> Result<()> {
    let identity = identity_of(state, endpoint)?;
    let (_, handle) = endpoint_session(state, endpoint)?;
    let parsed: Move = mv.parse().map_err(|_| ServerError::RuleRejection(format!("'{mv}' is not a valid move")))?;

    {
        let mut session = handle.lock().unwrap();
        let was_active = session.status == SessionStatus::Active;
        let record = session.submit_move(&identity, parsed, Instant::now())?;
        state.registry.send(endpoint, Message::MoveResult { record: WireMoveRecord::from(record) });
        broadcast_state(state, &session);
        finalize_if_newly_terminal(state, &session, was_active);
    }

    drive_bot_reply(state, &handle);
    Ok(())
}

/// If the session's new side to move is a bot slot, plays its move
/// immediately so a human never has to poll for it.
fn drive_bot_reply(state: &AppState, handle: &SessionHandle) {
    loop {
        let (bot_identity, bot_strength, position) = {
            let session = handle.lock().unwrap();
            if session.status != SessionStatus::Active {
                return;
            }
            let mover = session.game.position.side_to_move;
            match session.slot(mover) {
                Some(slot) if slot.is_bot => {
                    (slot.identity.clone(), slot.bot_strength.unwrap_or(ADVISORY_BOT_STRENGTH), session.game.position.clone())
                }
                _ => return,
            }
        };

        let bot = Bot::new(bot_strength);
        let Ok(mv) = bot.choose_move(&position) else { return };

        {
            let mut session = handle.lock().unwrap();
            let was_active = session.status == SessionStatus::Active;
            match session.submit_move(&bot_identity, mv, Instant::now()) {
                Ok(_) => {
                    broadcast_state(state, &session);
                    finalize_if_newly_terminal(state, &session, was_active);
                }
                Err(e) => {
                    warn!(error = %e, "bot produced an illegal move");
                    return;
                }
            }
        }
    }
}

fn handle_request_draw(state: &AppState, endpoint: EndpointId) -> Result<()> {
    let identity = identity_of(state, endpoint)?;
    let (_, handle) = endpoint_session(state, endpoint)?;
    let mut session = handle.lock().unwrap();
    let was_active = session.status == SessionStatus::Active;
    session.offer_draw(&identity)?;
    broadcast_state(state, &session);
    finalize_if_newly_terminal(state, &session, was_active);
    Ok(())
}

fn handle_respond_draw(state: &AppState, endpoint: EndpointId, accept: bool) -> Result<()> {
    let identity = identity_of(state, endpoint)?;
    let (_, handle) = endpoint_session(state, endpoint)?;
    let mut session = handle.lock().unwrap();
    let was_active = session.status == SessionStatus::Active;
    session.respond_draw(&identity, accept)?;
    broadcast_state(state, &session);
    finalize_if_newly_terminal(state, &session, was_active);
    Ok(())
}

fn handle_resign(state: &AppState, endpoint: EndpointId) -> Result<()> {
    let identity = identity_of(state, endpoint)?;
    let (_, handle) = endpoint_session(state, endpoint)?;
    let mut session = handle.lock().unwrap();
    let was_active = session.status == SessionStatus::Active;
    session.resign(&identity)?;
    broadcast_state(state, &session);
    finalize_if_newly_terminal(state, &session, was_active);
    Ok(())
}

fn handle_matchmaking_request(state: &AppState, endpoint: EndpointId, request: MatchmakingAction) -> Result<()> {
    let identity = identity_of(state, endpoint)?;
    if request.cancel {
        state.matchmaker.cancel(&identity);
        state.registry.send(endpoint, Message::MatchmakingStatus { state: "cancelled".to_string() });
        return Ok(());
    }

    let profile_name = request
        .time_control_profile
        .ok_or_else(|| ServerError::ClientProtocol("matchmaking enqueue requires a time_control_profile".to_string()))?;
    if TimeControl::from_profile_name(&profile_name).is_none() {
        return Err(ServerError::ClientProtocol(format!("unknown time control profile '{profile_name}'")));
    }
    let rating = state.account_store.load(&identity).map(|p| p.rating).unwrap_or(crate::collaborators::DEFAULT_RATING);

    state.matchmaker.enqueue(Ticket {
        identity,
        endpoint,
        rating,
        time_control_profile: profile_name,
        enqueued_at: Instant::now(),
    });
    state.registry.send(endpoint, Message::MatchmakingStatus { state: "queued".to_string() });
    Ok(())
}

fn handle_save_game(state: &AppState, endpoint: EndpointId) -> Result<()> {
    let (_, handle) = endpoint_session(state, endpoint)?;
    let session = handle.lock().unwrap();
    let snapshot = SessionSnapshot {
        session_id: session.id,
        base_position_fen: session.game.base_position.to_fen(),
        moves: session.game.moves.iter().map(|r| r.move_.to_string()).collect(),
        time_control: session.time_control,
        white_username: session.slot(Color::White).map(|s| s.identity.clone()).unwrap_or_default(),
        black_username: session.slot(Color::Black).map(|s| s.identity.clone()).unwrap_or_default(),
        status: session.status.as_str().to_string(),
        reason: session.termination_reason.map(|r| r.as_str().to_string()),
    };
    let id = state.history_store.save(snapshot);
    state.registry.send(endpoint, Message::SaveGameResult { id });
    Ok(())
}

fn handle_load_game(state: &AppState, endpoint: EndpointId, id: Uuid) -> Result<()> {
    let snapshot = state.history_store.load(id).ok_or(ServerError::SessionMissing(id))?;
    state.registry.send(endpoint, Message::LoadGameResult { snapshot });
    Ok(())
}

fn handle_player_stats(state: &AppState, endpoint: EndpointId, username: Option<String>) -> Result<()> {
    let identity = identity_of(state, endpoint)?;
    let username = username.unwrap_or(identity);
    let profile = state
        .account_store
        .load(&username)
        .ok_or_else(|| ServerError::RuleRejection(format!("no such player '{username}'")))?;
    state.registry.send(endpoint, Message::PlayerStatsResult { profile });
    Ok(())
}

fn handle_leaderboard(state: &AppState, endpoint: EndpointId, n: usize) -> Result<()> {
    let profiles = state.account_store.top(n);
    state.registry.send(endpoint, Message::LeaderboardResult { profiles });
    Ok(())
}

fn handle_game_analysis(state: &AppState, endpoint: EndpointId) -> Result<()> {
    let (_, handle) = endpoint_session(state, endpoint)?;
    let position = handle.lock().unwrap().game.position.clone();
    let depth = chessd_engine::Bot::new(ADVISORY_BOT_STRENGTH).depth();
    let evaluation_centipawns = chessd_engine::bot::search_to_depth(&position, depth);
    state.registry.send(endpoint, Message::GameAnalysisResult { evaluation_centipawns });
    Ok(())
}

fn handle_move_recommendations(state: &AppState, endpoint: EndpointId, n: Option<usize>) -> Result<()> {
    let (_, handle) = endpoint_session(state, endpoint)?;
    let position = handle.lock().unwrap().game.position.clone();
    let side = position.side_to_move;
    let depth = chessd_engine::Bot::new(ADVISORY_BOT_STRENGTH).depth();

    let mut ranked: Vec<(String, i32)> = position
        .legal_moves()
        .into_iter()
        .filter_map(|mv| {
            let (child, _) = position.apply(mv).ok()?;
            Some((mv.to_string(), chessd_engine::bot::search_to_depth(&child, depth.saturating_sub(1))))
        })
        .collect();

    // Favour the side to move: White sorts by descending score, Black by
    // ascending.
    ranked.sort_by_key(|(_, score)| if side == Color::White { -*score } else { *score });
    ranked.truncate(n.unwrap_or(DEFAULT_RECOMMENDATION_COUNT));

    state.registry.send(endpoint, Message::MoveRecommendations { moves: ranked });
    Ok(())
}
