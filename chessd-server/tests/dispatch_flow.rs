//! End-to-end dispatcher scenarios: login/connect/move/game-end through the
//! same `AppState` + `dispatcher::handle_message` path the orchestrator
//! drives per connection, minus the TCP socket itself.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chessd_server::collaborators::{EloRatingUpdater, InMemoryAccountStore, InMemoryHistoryStore};
use chessd_server::dispatcher;
use chessd_server::matchmaker::{Matchmaker, MatchmakerConfig, Pairing, Ticket};
use chessd_server::orchestrator::AppState;
use chessd_server::protocol::{MatchmakingAction, Message, Side};
use chessd_server::registry::EndpointId;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use uuid::Uuid;

fn test_state() -> AppState {
    AppState::new(
        Arc::new(InMemoryAccountStore::new()),
        Arc::new(InMemoryHistoryStore::new()),
        Arc::new(EloRatingUpdater::default()),
        Matchmaker::new(MatchmakerConfig::default()),
    )
}

fn register_endpoint(state: &AppState) -> (EndpointId, UnboundedReceiver<Message>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (state.registry.register(tx), rx)
}

fn drain(rx: &mut UnboundedReceiver<Message>) -> Vec<Message> {
    let mut out = Vec::new();
    while let Ok(message) = rx.try_recv() {
        out.push(message);
    }
    out
}

fn expect_register_success(rx: &mut UnboundedReceiver<Message>) {
    let messages = drain(rx);
    assert!(
        messages
            .iter()
            .any(|m| matches!(m, Message::RegisterResult { success: true, .. })),
        "expected a successful RegisterResult, got {messages:?}"
    );
}

fn expect_game_start(rx: &mut UnboundedReceiver<Message>, expected_side: Side) -> Uuid {
    let messages = drain(rx);
    messages
        .into_iter()
        .find_map(|m| match m {
            Message::GameStart { session_id, side } if side == expected_side => Some(session_id),
            _ => None,
        })
        .unwrap_or_else(|| panic!("expected a GameStart for {expected_side:?}"))
}

#[tokio::test]
async fn register_connect_move_and_checkmate_finalizes_the_session() {
    let state = test_state();
    let (white, mut white_rx) = register_endpoint(&state);
    let (black, mut black_rx) = register_endpoint(&state);

    dispatcher::handle_message(
        &state,
        white,
        Message::Register { username: "alice".into(), password: "pw".into() },
    )
    .await
    .unwrap();
    expect_register_success(&mut white_rx);

    dispatcher::handle_message(
        &state,
        black,
        Message::Register { username: "bob".into(), password: "pw".into() },
    )
    .await
    .unwrap();
    expect_register_success(&mut black_rx);

    dispatcher::handle_message(
        &state,
        white,
        Message::Connect { session_id: None, time_control_profile: Some("blitz".into()) },
    )
    .await
    .unwrap();
    let session_id = expect_game_start(&mut white_rx, Side::White);

    dispatcher::handle_message(
        &state,
        black,
        Message::Connect { session_id: Some(session_id), time_control_profile: None },
    )
    .await
    .unwrap();
    expect_game_start(&mut black_rx, Side::Black);
    drain(&mut white_rx);

    let fools_mate = ["f2f3", "e7e5", "g2g4", "d8h4"];
    let movers = [white, black, white, black];
    for (mv, endpoint) in fools_mate.into_iter().zip(movers) {
        dispatcher::handle_message(&state, endpoint, Message::Move { mv: mv.to_string() })
            .await
            .unwrap();
    }

    let white_messages = drain(&mut white_rx);
    assert!(
        white_messages
            .iter()
            .any(|m| matches!(m, Message::GameEnd { status, .. } if status == "black-win")),
        "expected a GameEnd(black-win), got {white_messages:?}"
    );

    let alice = state.account_store.load("alice").unwrap();
    let bob = state.account_store.load("bob").unwrap();
    assert_eq!(alice.losses, 1);
    assert_eq!(bob.wins, 1);
    assert!(bob.rating > 1200);
    assert!(alice.rating < 1200);
}

#[tokio::test]
async fn a_reconnect_within_the_grace_period_resumes_the_session() {
    let state = test_state().with_reconnect_grace(Duration::from_secs(30));
    let (white, mut white_rx) = register_endpoint(&state);
    let (black, mut black_rx) = register_endpoint(&state);

    dispatcher::handle_message(
        &state,
        white,
        Message::Register { username: "erin".into(), password: "pw".into() },
    )
    .await
    .unwrap();
    expect_register_success(&mut white_rx);
    dispatcher::handle_message(
        &state,
        black,
        Message::Register { username: "frank".into(), password: "pw".into() },
    )
    .await
    .unwrap();
    expect_register_success(&mut black_rx);

    dispatcher::handle_message(
        &state,
        white,
        Message::Connect { session_id: None, time_control_profile: Some("blitz".into()) },
    )
    .await
    .unwrap();
    let session_id = expect_game_start(&mut white_rx, Side::White);
    dispatcher::handle_message(
        &state,
        black,
        Message::Connect { session_id: Some(session_id), time_control_profile: None },
    )
    .await
    .unwrap();
    expect_game_start(&mut black_rx, Side::Black);
    drain(&mut white_rx);
    drain(&mut black_rx);

    // White's connection drops; with a grace period configured the session
    // is parked rather than abandoned.
    let white_endpoint_id = state.registry.drop_endpoint(white).unwrap();
    assert_eq!(white_endpoint_id, session_id);
    {
        let handle = state.sessions.lock().unwrap().get(&session_id).unwrap().clone();
        let mut session = handle.lock().unwrap();
        session.on_disconnect(white, Instant::now());
        assert_eq!(session.status, chessd_server::session::SessionStatus::AwaitingReconnect);
    }

    // A fresh endpoint reconnects as the same identity before the deadline.
    let (new_white, mut new_white_rx) = register_endpoint(&state);
    dispatcher::handle_message(
        &state,
        new_white,
        Message::Login { username: "erin".into(), password: "pw".into() },
    )
    .await
    .unwrap();
    let messages = drain(&mut new_white_rx);
    assert!(
        messages.iter().any(|m| matches!(m, Message::LoginResult { success: true, .. })),
        "expected a successful LoginResult, got {messages:?}"
    );
    dispatcher::handle_message(
        &state,
        new_white,
        Message::Connect { session_id: Some(session_id), time_control_profile: None },
    )
    .await
    .unwrap();
    expect_game_start(&mut new_white_rx, Side::White);

    let handle = state.sessions.lock().unwrap().get(&session_id).unwrap().clone();
    assert_eq!(handle.lock().unwrap().status, chessd_server::session::SessionStatus::Active);

    // The resumed session accepts moves again.
    dispatcher::handle_message(&state, new_white, Message::Move { mv: "e2e4".to_string() })
        .await
        .unwrap();
}

#[tokio::test]
async fn unauthenticated_endpoint_cannot_issue_a_move() {
    let state = test_state();
    let (endpoint, _rx) = register_endpoint(&state);
    let result = dispatcher::handle_message(&state, endpoint, Message::Move { mv: "e2e4".into() }).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn matchmaking_enqueue_and_cancel_round_trip() {
    let state = test_state();
    let (endpoint, mut rx) = register_endpoint(&state);
    dispatcher::handle_message(
        &state,
        endpoint,
        Message::Register { username: "carol".into(), password: "pw".into() },
    )
    .await
    .unwrap();
    drain(&mut rx);

    dispatcher::handle_message(
        &state,
        endpoint,
        Message::MatchmakingRequest {
            request: MatchmakingAction { cancel: false, time_control_profile: Some("bullet".into()) },
        },
    )
    .await
    .unwrap();
    let messages = drain(&mut rx);
    assert!(messages
        .iter()
        .any(|m| matches!(m, Message::MatchmakingStatus { state } if state == "queued")));

    dispatcher::handle_message(
        &state,
        endpoint,
        Message::MatchmakingRequest { request: MatchmakingAction { cancel: true, time_control_profile: None } },
    )
    .await
    .unwrap();
    let messages = drain(&mut rx);
    assert!(messages
        .iter()
        .any(|m| matches!(m, Message::MatchmakingStatus { state } if state == "cancelled")));
}

/// S7: a lone ticket stays queued until `bot_fallback` elapses, then pairs
/// against a bot of rating-appropriate strength — never against itself.
#[test]
fn lone_ticket_falls_back_to_a_bot_after_the_fallback_window() {
    let mm = Matchmaker::new(MatchmakerConfig {
        band: 200,
        relax_after: Duration::from_secs(30),
        bot_fallback: Duration::from_secs(60),
    });
    let now = Instant::now();
    mm.enqueue(Ticket {
        identity: "dave".into(),
        endpoint: Uuid::new_v4(),
        rating: 1400,
        time_control_profile: "blitz".into(),
        enqueued_at: now,
    });

    assert!(mm.process_pass(now + Duration::from_secs(10)).is_empty());

    let pairings = mm.process_pass(now + Duration::from_secs(61));
    assert_eq!(pairings.len(), 1);
    match &pairings[0] {
        Pairing::Bot { human, bot_strength } => {
            assert_eq!(human.identity, "dave");
            assert!(*bot_strength >= 1 && *bot_strength <= 5);
        }
        other => panic!("expected a bot pairing, got {other:?}"),
    }
}
