//! Connection registry (C7): maps a transport endpoint to its authenticated
//! identity (if any) and the session it is bound to (if any).
//!
//! The registry has its own lock, held briefly for map lookups and updates
//! only — per the lock order (Registry → Session → Matchmaker), it is
//! always acquired before a session lock, never while holding one.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::protocol::Message;

/// Opaque per-connection identifier, generated at `register` time. Not tied
/// to a socket address so a reconnection can, in principle, resume under a
/// new endpoint id bound to the same identity/session.
pub type EndpointId = Uuid;

/// What the registry knows about one live endpoint.
struct Entry {
    identity: Option<String>,
    session_id: Option<Uuid>,
    outbound: UnboundedSender<Message>,
}

/// Endpoint → {identity?, session?} map, guarded by a single mutex. Lookups
/// and updates never block on I/O — outbound delivery goes through the
/// per-endpoint channel stashed at `register` time, so handlers can enqueue
/// a broadcast without waiting on that endpoint's writer task.
#[derive(Default)]
pub struct Registry {
    entries: Mutex<HashMap<EndpointId, Entry>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly-accepted, unauthenticated endpoint.
    pub fn register(&self, outbound: UnboundedSender<Message>) -> EndpointId {
        let id = Uuid::new_v4();
        self.entries.lock().unwrap().insert(
            id,
            Entry {
                identity: None,
                session_id: None,
                outbound,
            },
        );
        id
    }

    /// Records a successful login/registration for `endpoint`.
    pub fn authenticate(&self, endpoint: EndpointId, identity: String) {
        if let Some(entry) = self.entries.lock().unwrap().get_mut(&endpoint) {
            entry.identity = Some(identity);
        }
    }

    pub fn bind_to_session(&self, endpoint: EndpointId, session_id: Uuid) {
        if let Some(entry) = self.entries.lock().unwrap().get_mut(&endpoint) {
            entry.session_id = Some(session_id);
        }
    }

    pub fn unbind_from_session(&self, endpoint: EndpointId) {
        if let Some(entry) = self.entries.lock().unwrap().get_mut(&endpoint) {
            entry.session_id = None;
        }
    }

    pub fn lookup_identity(&self, endpoint: EndpointId) -> Option<String> {
        self.entries
            .lock()
            .unwrap()
            .get(&endpoint)
            .and_then(|e| e.identity.clone())
    }

    pub fn lookup_session(&self, endpoint: EndpointId) -> Option<Uuid> {
        self.entries.lock().unwrap().get(&endpoint).and_then(|e| e.session_id)
    }

    pub fn is_authenticated(&self, endpoint: EndpointId) -> bool {
        self.entries
            .lock()
            .unwrap()
            .get(&endpoint)
            .is_some_and(|e| e.identity.is_some())
    }

    /// Enqueues `message` for delivery to `endpoint`'s writer task. A
    /// failure (the endpoint already dropped) is silently ignored — the
    /// disconnect path is responsible for session cleanup.
    pub fn send(&self, endpoint: EndpointId, message: Message) {
        if let Some(entry) = self.entries.lock().unwrap().get(&endpoint) {
            let _ = entry.outbound.send(message);
        }
    }

    /// Removes `endpoint` entirely, returning the session it was bound to
    /// (if any) so the caller can run `Session::on_disconnect`.
    pub fn drop_endpoint(&self, endpoint: EndpointId) -> Option<Uuid> {
        self.entries
            .lock()
            .unwrap()
            .remove(&endpoint)
            .and_then(|e| e.session_id)
    }
}
