//! Server-level error taxonomy (spec §7).
//!
//! Mirrors `chessd_engine::error`'s `ErrorKind`/`Error` shape but widened to
//! the session/network layer, and additionally derives `thiserror::Error`
//! for the wire-facing kinds the way the rest of the example pack derives
//! its network error types.

use uuid::Uuid;

/// Server-wide result alias.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Errors a handler or background loop can produce. Not every variant is
/// sent to the client: `Transport` always results in treating the endpoint
/// as disconnected, and `Internal` is logged and never exposed verbatim.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Malformed frame, unknown tag on a gated call, or a gated tag used by
    /// an unauthenticated endpoint.
    #[error("client protocol violation: {0}")]
    ClientProtocol(String),

    /// The move or action is illegal, it is not the caller's turn, or the
    /// game has already ended.
    #[error("rule rejection: {0}")]
    RuleRejection(String),

    /// A session id was referenced that this instance does not own.
    #[error("session {0} not found")]
    SessionMissing(Uuid),

    /// Bad credentials, or a duplicate username on register.
    #[error("authentication failed: {0}")]
    AuthFailure(String),

    /// A read or write against an endpoint failed or timed out.
    #[error("transport error: {0}")]
    Transport(String),

    /// An invariant that should be unreachable was violated. Logged at
    /// error level; the offending session is terminated as Abandoned, the
    /// process keeps running.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn kind(&self) -> RejectionKind {
        match self {
            ServerError::ClientProtocol(_) => RejectionKind::ClientProtocol,
            ServerError::RuleRejection(_) => RejectionKind::RuleRejection,
            ServerError::SessionMissing(_) => RejectionKind::SessionMissing,
            ServerError::AuthFailure(_) => RejectionKind::AuthFailure,
            ServerError::Transport(_) => RejectionKind::Transport,
            ServerError::Internal(_) => RejectionKind::Internal,
        }
    }

    /// The wire-facing form: a machine-readable kind plus a human-readable
    /// reason. `Internal`'s reason is never forwarded verbatim — it may
    /// describe server-side state the client has no business seeing — and
    /// is replaced with a generic message instead.
    pub fn to_rejection(&self) -> Rejection {
        let reason = match self {
            ServerError::Internal(_) => "an internal error occurred".to_string(),
            _ => self.to_string(),
        };
        Rejection { kind: self.kind(), reason }
    }
}

/// Maps rules-engine rejections onto `RuleRejection`, preserving the
/// engine's own reason text.
impl From<chessd_engine::Error> for ServerError {
    fn from(err: chessd_engine::Error) -> Self {
        ServerError::RuleRejection(err.to_string())
    }
}

/// Machine-readable classification of a `ServerError`, serialized onto the
/// wire inside an `Error` message body.
#[derive(Debug, Copy, Clone, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum RejectionKind {
    ClientProtocol,
    RuleRejection,
    SessionMissing,
    AuthFailure,
    Transport,
    Internal,
}

/// The wire form of any refusal: carries a `kind` the client can switch on
/// and a `reason` it is expected to render as-is.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Rejection {
    pub kind: RejectionKind,
    pub reason: String,
}
