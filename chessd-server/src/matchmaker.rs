//! Rating-banded matchmaking queue (C5).
//!
//! `process_pass` is the entire algorithm: sort by rating, greedily pair
//! adjacent tickets within a band (widened once either has waited long
//! enough), then fall back any still-unmatched, long-waiting ticket to a
//! bot pairing. The queue has its own lock, held only for the duration of
//! one pass — per the lock order (Registry → Session → Matchmaker) it is
//! always the last lock a handler acquires.

use std::time::{Duration, Instant};

use crate::registry::EndpointId;

/// Default rating-difference band for a human pairing.
pub const DEFAULT_BAND: i32 = 200;
/// A ticket waiting at least this long widens the band for its pairing.
pub const DEFAULT_RELAX_AFTER: Duration = Duration::from_secs(30);
/// A ticket waiting at least this long without a human pairing falls back
/// to a bot opponent.
pub const DEFAULT_BOT_FALLBACK: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct Ticket {
    pub identity: String,
    pub endpoint: EndpointId,
    pub rating: i32,
    pub time_control_profile: String,
    pub enqueued_at: Instant,
}

/// The outcome of one matchmaker pass for one group of tickets.
#[derive(Debug, Clone)]
pub enum Pairing {
    Human { a: Ticket, b: Ticket },
    Bot { human: Ticket, bot_strength: u8 },
}

#[derive(Debug, Copy, Clone)]
pub struct MatchmakerConfig {
    pub band: i32,
    pub relax_after: Duration,
    pub bot_fallback: Duration,
}

impl Default for MatchmakerConfig {
    fn default() -> Self {
        Self {
            band: DEFAULT_BAND,
            relax_after: DEFAULT_RELAX_AFTER,
            bot_fallback: DEFAULT_BOT_FALLBACK,
        }
    }
}

pub struct Matchmaker {
    tickets: std::sync::Mutex<Vec<Ticket>>,
    config: MatchmakerConfig,
}

impl Matchmaker {
    pub fn new(config: MatchmakerConfig) -> Self {
        Self {
            tickets: std::sync::Mutex::new(Vec::new()),
            config,
        }
    }

    pub fn enqueue(&self, ticket: Ticket) {
        self.tickets.lock().unwrap().push(ticket);
    }

    /// Cancels `identity`'s own outstanding ticket, if any. Returns whether
    /// a ticket was removed.
    pub fn cancel(&self, identity: &str) -> bool {
        let mut queue = self.tickets.lock().unwrap();
        let before = queue.len();
        queue.retain(|t| t.identity != identity);
        queue.len() != before
    }

    /// Runs one processing pass: sorts the queue, pairs eligible adjacent
    /// tickets, falls any remaining long-waiting ticket back to a bot.
    /// Every ticket removed from the queue is returned in exactly one
    /// `Pairing` — there is no "removed but failed" state.
    pub fn process_pass(&self, now: Instant) -> Vec<Pairing> {
        let mut queue = self.tickets.lock().unwrap();
        queue.sort_by_key(|t| t.rating);

        let mut pairings = Vec::new();
        let mut unmatched = Vec::new();
        let mut drained = queue.drain(..).collect::<Vec<_>>().into_iter().peekable();

        while let Some(ticket) = drained.next() {
            let eligible = drained.peek().is_some_and(|next| {
                let relaxed = now.saturating_duration_since(ticket.enqueued_at) >= self.config.relax_after
                    || now.saturating_duration_since(next.enqueued_at) >= self.config.relax_after;
                let band = if relaxed { i32::MAX } else { self.config.band };
                (ticket.rating - next.rating).abs() <= band
            });

            if eligible {
                let partner = drained.next().expect("peek confirmed a next ticket");
                pairings.push(Pairing::Human { a: ticket, b: partner });
            } else {
                unmatched.push(ticket);
            }
        }

        for ticket in unmatched {
            if now.saturating_duration_since(ticket.enqueued_at) >= self.config.bot_fallback {
                let bot_strength = bot_strength_for_rating(ticket.rating);
                pairings.push(Pairing::Bot { human: ticket, bot_strength });
            } else {
                queue.push(ticket);
            }
        }

        pairings
    }
}

/// Monotone non-decreasing in rating, per spec's requirement on the
/// bot-fallback strength function.
fn bot_strength_for_rating(rating: i32) -> u8 {
    match rating {
        r if r < 1000 => 1,
        r if r < 1200 => 2,
        r if r < 1500 => 3,
        r if r < 1800 => 4,
        _ => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn ticket(identity: &str, rating: i32, enqueued_at: Instant) -> Ticket {
        Ticket {
            identity: identity.to_string(),
            endpoint: Uuid::new_v4(),
            rating,
            time_control_profile: "blitz".to_string(),
            enqueued_at,
        }
    }

    #[test]
    fn close_ratings_are_paired_immediately() {
        let mm = Matchmaker::new(MatchmakerConfig::default());
        let now = Instant::now();
        mm.enqueue(ticket("a", 1500, now));
        mm.enqueue(ticket("b", 1550, now));

        let pairings = mm.process_pass(now);
        assert_eq!(pairings.len(), 1);
        assert!(matches!(pairings[0], Pairing::Human { .. }));
    }

    #[test]
    fn distant_ratings_stay_queued_until_bot_fallback() {
        let mm = Matchmaker::new(MatchmakerConfig::default());
        let now = Instant::now();
        mm.enqueue(ticket("a", 800, now));
        mm.enqueue(ticket("b", 2200, now));

        assert!(mm.process_pass(now).is_empty());

        let later = now + Duration::from_secs(61);
        let pairings = mm.process_pass(later);
        assert_eq!(pairings.len(), 2);
        assert!(pairings.iter().all(|p| matches!(p, Pairing::Bot { .. })));
    }

    #[test]
    fn cancel_removes_the_caller_own_ticket_only() {
        let mm = Matchmaker::new(MatchmakerConfig::default());
        let now = Instant::now();
        mm.enqueue(ticket("a", 1500, now));
        mm.enqueue(ticket("b", 1500, now));
        assert!(mm.cancel("a"));
        assert!(!mm.cancel("a"));

        let pairings = mm.process_pass(now);
        assert!(pairings.is_empty());
    }

    #[test]
    fn bot_strength_is_monotone_in_rating() {
        assert!(bot_strength_for_rating(900) <= bot_strength_for_rating(1100));
        assert!(bot_strength_for_rating(1100) <= bot_strength_for_rating(1600));
        assert!(bot_strength_for_rating(1600) <= bot_strength_for_rating(2000));
    }
}
