//! Clock service (C4): a scheduler that wakes at a bounded cadence and
//! calls `Session::tick` on every still-active or awaiting-reconnect
//! session.
//!
//! The scheduler is not authoritative for game time — `Session::submit_move`
//! computes elapsed time precisely from the stored move-start timestamp.
//! This loop exists only to detect timeouts between moves, the way a small
//! periodic task replaces Qt's signal/slot timer machinery (see design
//! notes on the timer-based source pattern).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;
use uuid::Uuid;

use crate::session::{Session, SessionStatus};

pub type SessionHandle = Arc<Mutex<Session>>;
pub type SessionTable = Arc<Mutex<HashMap<Uuid, SessionHandle>>>;

/// Tick cadence used unless overridden by `--tick-ms`.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Runs the tick loop until `shutdown` reports `true`. `on_timeout` is
/// invoked (outside any session lock) for every session that transitions
/// to a terminal status on this pass, so the caller can broadcast a
/// GameEnd message.
pub async fn run<F>(
    sessions: SessionTable,
    tick_interval: Duration,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
    on_timeout: F,
) where
    F: Fn(Uuid) + Send + Sync + 'static,
{
    let mut interval = tokio::time::interval(tick_interval);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                tick_all(&sessions, &on_timeout);
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    debug!("clock loop shutting down");
                    break;
                }
            }
        }
    }
}

fn tick_all<F>(sessions: &SessionTable, on_timeout: &F)
where
    F: Fn(Uuid),
{
    let now = Instant::now();
    // Snapshot handles so the table lock is never held while ticking a
    // session (tick briefly takes that session's own lock).
    let handles: Vec<(Uuid, SessionHandle)> = sessions
        .lock()
        .unwrap()
        .iter()
        .map(|(id, handle)| (*id, Arc::clone(handle)))
        .collect();

    for (id, handle) in handles {
        let became_terminal = {
            let mut session = handle.lock().unwrap();
            if !matches!(session.status, SessionStatus::Active | SessionStatus::AwaitingReconnect) {
                continue;
            }
            session.tick(now);
            session.status.is_terminal()
        };
        if became_terminal {
            on_timeout(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::TimeControl;
    use crate::session::PlayerSlot;
    use chessd_engine::Color;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn tick_all_skips_non_active_and_fires_on_timeout() {
        let mut session = Session::new(TimeControl::new(1_000, 0));
        let now = Instant::now();
        session
            .attach(Color::White, PlayerSlot::human("w", Uuid::new_v4(), 1_000), now)
            .unwrap();
        session
            .attach(Color::Black, PlayerSlot::human("b", Uuid::new_v4(), 1_000), now)
            .unwrap();

        let id = session.id;
        let mut table = HashMap::new();
        table.insert(id, Arc::new(Mutex::new(session)));
        let table: SessionTable = Arc::new(Mutex::new(table));

        // First pass: not enough time has elapsed, no timeout.
        let fired = Arc::new(AtomicUsize::new(0));
        {
            let fired = Arc::clone(&fired);
            tick_all(&table, &move |_| {
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        // Simulate time passing past the 1s budget by ticking the session
        // directly with a manufactured later Instant.
        {
            let handle = table.lock().unwrap().get(&id).unwrap().clone();
            handle.lock().unwrap().tick(now + Duration::from_millis(1_500));
        }
        assert_eq!(
            table.lock().unwrap().get(&id).unwrap().lock().unwrap().status,
            SessionStatus::WhiteWin
        );
    }
}
