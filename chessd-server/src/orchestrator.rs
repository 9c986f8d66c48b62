//! Server orchestrator (C9): owns the listening socket, the shared
//! component graph, and the background loops (clock ticker, matchmaking
//! sweep). Generalized from the teacher's channel-driven main loop and
//! `threads.rs` worker-pool shape into `tokio::task`s, with a `watch`
//! channel standing in for the teacher's `Message::Terminate`.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chessd_engine::Color;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::clock::{self, SessionHandle, SessionTable};
use crate::collaborators::{AccountStore, HistoryStore, RatingUpdater, TimeControl};
use crate::dispatcher;
use crate::error::ServerError;
use crate::matchmaker::{Matchmaker, Pairing};
use crate::protocol::{self, Decoded, Message, Side};
use crate::registry::{EndpointId, Registry};
use crate::session::{PlayerSlot, Session};

/// The component graph one server instance wires up and hands to every
/// connection task and background loop. Every field is an `Arc`, so cloning
/// `AppState` is cheap and gives each task its own handle to the same
/// underlying state.
pub struct AppState {
    pub registry: Arc<Registry>,
    pub sessions: SessionTable,
    pub matchmaker: Arc<Matchmaker>,
    pub account_store: Arc<dyn AccountStore>,
    pub history_store: Arc<dyn HistoryStore>,
    pub rating_updater: Arc<dyn RatingUpdater>,
    /// Grace period new sessions are created with. `Duration::ZERO` (the
    /// default) preserves immediate-abandon-on-disconnect semantics.
    pub reconnect_grace: Duration,
}

impl Clone for AppState {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            sessions: Arc::clone(&self.sessions),
            matchmaker: Arc::clone(&self.matchmaker),
            account_store: Arc::clone(&self.account_store),
            history_store: Arc::clone(&self.history_store),
            rating_updater: Arc::clone(&self.rating_updater),
            reconnect_grace: self.reconnect_grace,
        }
    }
}

impl AppState {
    pub fn new(
        account_store: Arc<dyn AccountStore>,
        history_store: Arc<dyn HistoryStore>,
        rating_updater: Arc<dyn RatingUpdater>,
        matchmaker: Matchmaker,
    ) -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            sessions: Arc::new(Mutex::new(std::collections::HashMap::new())),
            matchmaker: Arc::new(matchmaker),
            account_store,
            history_store,
            rating_updater,
            reconnect_grace: Duration::ZERO,
        }
    }

    pub fn with_reconnect_grace(mut self, grace: Duration) -> Self {
        self.reconnect_grace = grace;
        self
    }

    fn new_session(&self, time_control: TimeControl) -> (Uuid, SessionHandle) {
        let session = Session::new(time_control).with_reconnect_grace(self.reconnect_grace);
        let id = session.id;
        (id, Arc::new(Mutex::new(session)))
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub listen_addr: SocketAddr,
    pub tick_interval: Duration,
    pub matchmaking_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 7878)),
            tick_interval: clock::DEFAULT_TICK_INTERVAL,
            matchmaking_interval: Duration::from_secs(1),
        }
    }
}

/// Binds the listener and runs until `shutdown` reports `true`: accepts
/// connections onto their own task, runs the clock ticker and matchmaking
/// sweep as background tasks, and joins all of them — including every
/// still-running connection task — before returning.
pub async fn run(
    state: AppState,
    config: OrchestratorConfig,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(config.listen_addr).await?;
    info!(addr = %config.listen_addr, "chessd listening");

    let clock_task = tokio::spawn(run_clock_loop(state.clone(), config.tick_interval, shutdown.clone()));
    let matchmaking_task = tokio::spawn(run_matchmaking_loop(
        state.clone(),
        config.matchmaking_interval,
        shutdown.clone(),
    ));

    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        let state = state.clone();
                        let conn_shutdown = shutdown.clone();
                        connections.spawn(async move {
                            if let Err(e) = handle_connection(state, stream, conn_shutdown).await {
                                warn!(%addr, error = %e, "connection task ended with an io error");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("no longer accepting connections, shutting down");
                    break;
                }
            }
        }
    }

    while connections.join_next().await.is_some() {}
    let _ = clock_task.await;
    let _ = matchmaking_task.await;
    Ok(())
}

async fn run_clock_loop(state: AppState, tick_interval: Duration, shutdown: watch::Receiver<bool>) {
    let sessions = state.sessions.clone();
    clock::run(sessions, tick_interval, shutdown, move |session_id| {
        on_session_timeout(&state, session_id);
    })
    .await;
}

fn on_session_timeout(state: &AppState, session_id: Uuid) {
    let handle = state.sessions.lock().unwrap().get(&session_id).cloned();
    if let Some(handle) = handle {
        let session = handle.lock().unwrap();
        dispatcher::finalize_terminal_session(state, &session);
    }
}

async fn run_matchmaking_loop(state: AppState, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let pairings = state.matchmaker.process_pass(Instant::now());
                for pairing in pairings {
                    spawn_session_for_pairing(&state, pairing);
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

fn spawn_session_for_pairing(state: &AppState, pairing: Pairing) {
    match pairing {
        Pairing::Human { a, b } => {
            let time_control = TimeControl::from_profile_name(&a.time_control_profile).unwrap_or_default();
            let (id, handle) = state.new_session(time_control);
            let now = Instant::now();
            {
                let mut session = handle.lock().unwrap();
                let clock_ms = session.time_control.initial_ms;
                let _ = session.attach(Color::White, PlayerSlot::human(a.identity.clone(), a.endpoint, clock_ms), now);
                let _ = session.attach(Color::Black, PlayerSlot::human(b.identity.clone(), b.endpoint, clock_ms), now);
            }
            state.sessions.lock().unwrap().insert(id, Arc::clone(&handle));
            state.registry.bind_to_session(a.endpoint, id);
            state.registry.bind_to_session(b.endpoint, id);
            state.registry.send(a.endpoint, Message::GameStart { session_id: id, side: Side::White });
            state.registry.send(b.endpoint, Message::GameStart { session_id: id, side: Side::Black });
            let session = handle.lock().unwrap();
            dispatcher::broadcast_state(state, &session);
        }
        Pairing::Bot { human, bot_strength } => {
            let time_control = TimeControl::from_profile_name(&human.time_control_profile).unwrap_or_default();
            let (id, handle) = state.new_session(time_control);
            let now = Instant::now();
            {
                let mut session = handle.lock().unwrap();
                let clock_ms = session.time_control.initial_ms;
                let _ = session.attach(Color::White, PlayerSlot::human(human.identity.clone(), human.endpoint, clock_ms), now);
                let _ = session.attach(
                    Color::Black,
                    PlayerSlot::bot(format!("bot-strength-{bot_strength}"), clock_ms, bot_strength),
                    now,
                );
            }
            state.sessions.lock().unwrap().insert(id, Arc::clone(&handle));
            state.registry.bind_to_session(human.endpoint, id);
            state.registry.send(human.endpoint, Message::GameStart { session_id: id, side: Side::White });
            let session = handle.lock().unwrap();
            dispatcher::broadcast_state(state, &session);
        }
    }
}

/// Runs one accepted connection: a writer task drains the endpoint's
/// outbound queue while this task reads frames, decodes them, and hands
/// each to the dispatcher. Returns once the client disconnects, a malformed
/// payload closes the connection, or `shutdown` reports `true`.
async fn handle_connection(
    state: AppState,
    stream: TcpStream,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let (mut reader, mut writer) = stream.into_split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
    let endpoint = state.registry.register(outbound_tx);

    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let payload = protocol::encode_message(&message);
            if protocol::write_frame(&mut writer, &payload).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            frame = protocol::read_frame(&mut reader) => {
                match frame {
                    Ok(Some(bytes)) => match protocol::decode_message(&bytes) {
                        Ok(Decoded::Message(message)) => {
                            if let Err(e) = dispatcher::handle_message(&state, endpoint, message).await {
                                if let ServerError::Internal(ref reason) = e {
                                    error!(error = %reason, "internal error handling message, abandoning session");
                                    abandon_session_for(&state, endpoint);
                                }
                                if !matches!(e, ServerError::Transport(_)) {
                                    state.registry.send(endpoint, Message::Error(e.to_rejection()));
                                }
                            }
                        }
                        Ok(Decoded::UnknownTag(tag)) => {
                            warn!(%tag, "dropping frame with an unrecognized tag");
                        }
                        Err(e) => {
                            warn!(error = %e, "closing connection after a malformed payload");
                            break;
                        }
                    },
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "read error, closing connection");
                        break;
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!(%endpoint, "closing connection for shutdown");
                    break;
                }
            }
        }
    }

    disconnect(&state, endpoint);
    let _ = writer_task.await;
    Ok(())
}

/// Forces the session bound to `endpoint`, if any, to `Abandoned` and
/// finalizes it. Used when an `Internal` error leaves the session's state
/// no longer trustworthy to keep serving.
fn abandon_session_for(state: &AppState, endpoint: EndpointId) {
    let Some(session_id) = state.registry.lookup_session(endpoint) else {
        return;
    };
    let handle = state.sessions.lock().unwrap().get(&session_id).cloned();
    if let Some(handle) = handle {
        let mut session = handle.lock().unwrap();
        session.force_abandon();
        if session.status.is_terminal() {
            dispatcher::finalize_terminal_session(state, &session);
        }
    }
}

/// Drops the endpoint from the registry and, if it was bound to a session,
/// runs `Session::on_disconnect` and finalizes the session if that just
/// abandoned it.
fn disconnect(state: &AppState, endpoint: EndpointId) {
    let Some(session_id) = state.registry.drop_endpoint(endpoint) else {
        return;
    };
    let handle = state.sessions.lock().unwrap().get(&session_id).cloned();
    if let Some(handle) = handle {
        let mut session = handle.lock().unwrap();
        session.on_disconnect(endpoint, Instant::now());
        if session.status.is_terminal() {
            dispatcher::finalize_terminal_session(state, &session);
        }
    }
}
