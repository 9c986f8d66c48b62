//! External collaborator contracts (spec §6) and in-process default
//! implementations.
//!
//! The account store, history store, and rating updater are, per the
//! specification, out of scope for hard engineering — they plug into the
//! core via these narrow traits. The in-memory implementations below are
//! sufficient defaults for a single-process deployment and for tests; a
//! real deployment swaps them for a database-backed implementation without
//! touching the session/protocol layers, which only ever see the trait
//! objects.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ServerError, Result};

/// A player's persisted profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub username: String,
    pub rating: i32,
    pub games_played: u32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub saved_game_ids: Vec<Uuid>,
}

impl Profile {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            rating: DEFAULT_RATING,
            games_played: 0,
            wins: 0,
            losses: 0,
            draws: 0,
            saved_game_ids: Vec::new(),
        }
    }
}

pub const DEFAULT_RATING: i32 = 1200;

/// Credential check, registration, profile load/save, and leaderboard query.
pub trait AccountStore: Send + Sync {
    fn authenticate(&self, username: &str, password: &str) -> bool;
    fn register(&self, username: &str, password: &str) -> Result<Profile>;
    fn load(&self, username: &str) -> Option<Profile>;
    fn save(&self, profile: Profile) -> Result<()>;
    fn top(&self, n: usize) -> Vec<Profile>;
}

/// Cheap, non-cryptographic digest used only so the in-memory store never
/// holds a plaintext password. Not a substitute for a real KDF in a
/// deployment backed by an actual account database.
fn digest(password: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    password.hash(&mut hasher);
    hasher.finish()
}

struct Account {
    password_digest: u64,
    profile: Profile,
}

#[derive(Default)]
pub struct InMemoryAccountStore {
    accounts: Mutex<HashMap<String, Account>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AccountStore for InMemoryAccountStore {
    fn authenticate(&self, username: &str, password: &str) -> bool {
        let accounts = self.accounts.lock().unwrap();
        match accounts.get(username) {
            Some(account) => account.password_digest == digest(password),
            None => false,
        }
    }

    fn register(&self, username: &str, password: &str) -> Result<Profile> {
        let mut accounts = self.accounts.lock().unwrap();
        if accounts.contains_key(username) {
            return Err(ServerError::AuthFailure(format!(
                "username '{username}' is already taken"
            )));
        }
        let profile = Profile::new(username);
        accounts.insert(
            username.to_string(),
            Account {
                password_digest: digest(password),
                profile: profile.clone(),
            },
        );
        Ok(profile)
    }

    fn load(&self, username: &str) -> Option<Profile> {
        self.accounts
            .lock()
            .unwrap()
            .get(username)
            .map(|a| a.profile.clone())
    }

    fn save(&self, profile: Profile) -> Result<()> {
        let mut accounts = self.accounts.lock().unwrap();
        match accounts.get_mut(&profile.username) {
            Some(account) => {
                account.profile = profile;
                Ok(())
            }
            None => Err(ServerError::Internal(format!(
                "save called for unregistered username '{}'",
                profile.username
            ))),
        }
    }

    fn top(&self, n: usize) -> Vec<Profile> {
        let accounts = self.accounts.lock().unwrap();
        let mut profiles: Vec<Profile> = accounts.values().map(|a| a.profile.clone()).collect();
        profiles.sort_by(|a, b| b.rating.cmp(&a.rating));
        profiles.truncate(n);
        profiles
    }
}

/// A frozen record of a finished or in-progress game, as persisted by the
/// history store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub base_position_fen: String,
    pub moves: Vec<String>,
    pub time_control: TimeControl,
    pub white_username: String,
    pub black_username: String,
    pub status: String,
    pub reason: Option<String>,
}

/// Persists and restores full game records, keyed by an id the store
/// assigns on save.
pub trait HistoryStore: Send + Sync {
    fn save(&self, snapshot: SessionSnapshot) -> Uuid;
    fn load(&self, id: Uuid) -> Option<SessionSnapshot>;
}

#[derive(Default)]
pub struct InMemoryHistoryStore {
    games: Mutex<HashMap<Uuid, SessionSnapshot>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryStore for InMemoryHistoryStore {
    fn save(&self, snapshot: SessionSnapshot) -> Uuid {
        let id = Uuid::new_v4();
        self.games.lock().unwrap().insert(id, snapshot);
        id
    }

    fn load(&self, id: Uuid) -> Option<SessionSnapshot> {
        self.games.lock().unwrap().get(&id).cloned()
    }
}

/// Updates two ratings following a win/loss/draw outcome. Exact K-factor is
/// outside the core's contract; the default implementation uses a standard
/// Elo expected-score update.
pub trait RatingUpdater: Send + Sync {
    /// Returns `(new_winner_rating, new_loser_rating)`. When `draw` is
    /// true, `winner_rating`/`loser_rating` are simply the two
    /// participants' ratings in arbitrary order.
    fn update(&self, winner_rating: i32, loser_rating: i32, draw: bool) -> (i32, i32);
}

pub struct EloRatingUpdater {
    k_factor: f64,
}

impl EloRatingUpdater {
    pub fn new(k_factor: f64) -> Self {
        Self { k_factor }
    }
}

impl Default for EloRatingUpdater {
    fn default() -> Self {
        Self::new(32.0)
    }
}

impl RatingUpdater for EloRatingUpdater {
    fn update(&self, winner_rating: i32, loser_rating: i32, draw: bool) -> (i32, i32) {
        let expected_winner =
            1.0 / (1.0 + 10f64.powf((loser_rating - winner_rating) as f64 / 400.0));
        let expected_loser = 1.0 - expected_winner;
        let (actual_winner, actual_loser) = if draw { (0.5, 0.5) } else { (1.0, 0.0) };

        let new_winner =
            winner_rating as f64 + self.k_factor * (actual_winner - expected_winner);
        let new_loser = loser_rating as f64 + self.k_factor * (actual_loser - expected_loser);
        (new_winner.round() as i32, new_loser.round() as i32)
    }
}

/// Initial budget and per-move increment, in milliseconds. The rules engine
/// and session only ever see this pair; named profiles resolve to one.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct TimeControl {
    pub initial_ms: u64,
    pub increment_ms: u64,
}

impl TimeControl {
    pub const fn new(initial_ms: u64, increment_ms: u64) -> Self {
        Self {
            initial_ms,
            increment_ms,
        }
    }

    /// Resolves one of the predefined profile names to a `TimeControl`.
    /// Returns `None` for an unrecognized name.
    pub fn from_profile_name(name: &str) -> Option<Self> {
        match name {
            "bullet" => Some(Self::new(60_000, 0)),
            "blitz" => Some(Self::new(180_000, 2_000)),
            "rapid" => Some(Self::new(600_000, 5_000)),
            "classical" => Some(Self::new(1_800_000, 30_000)),
            "correspondence" => Some(Self::new(86_400_000, 0)),
            _ => None,
        }
    }
}

impl Default for TimeControl {
    fn default() -> Self {
        Self::from_profile_name("blitz").unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_authenticate() {
        let store = InMemoryAccountStore::new();
        store.register("ada", "hunter2").unwrap();
        assert!(store.authenticate("ada", "hunter2"));
        assert!(!store.authenticate("ada", "wrong"));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let store = InMemoryAccountStore::new();
        store.register("ada", "hunter2").unwrap();
        assert!(store.register("ada", "other").is_err());
    }

    #[test]
    fn elo_winner_gains_loser_loses_on_even_match() {
        let updater = EloRatingUpdater::default();
        let (new_winner, new_loser) = updater.update(1200, 1200, false);
        assert!(new_winner > 1200);
        assert!(new_loser < 1200);
    }

    #[test]
    fn named_profile_resolves() {
        assert_eq!(
            TimeControl::from_profile_name("bullet"),
            Some(TimeControl::new(60_000, 0))
        );
        assert_eq!(TimeControl::from_profile_name("nonsense"), None);
    }
}
