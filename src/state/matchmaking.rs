//! FIFO matchmaking queue with grade compatibility.

use std::time::Duration;

use indexmap::IndexMap;
use tokio::time::Instant;

use crate::state::participant::{ConnectionId, MatchId, Participant, PlayerId};

/// A participant waiting for an opponent.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub participant: Participant,
    pub connection: ConnectionId,
    pub joined_at: Instant,
}

/// Two entries paired into a new room. Seat one is the entry that waited.
#[derive(Debug, Clone)]
pub struct MatchPairing {
    pub match_id: MatchId,
    pub seats: [QueueEntry; 2],
}

/// Result of [`MatchmakingQueue::enqueue`].
#[derive(Debug, Clone)]
pub enum Enqueued {
    /// No compatible opponent; the entry waits at this one-based position.
    Waiting { position: usize },
    /// The entry was paired immediately.
    Paired(MatchPairing),
}

/// Ordered waiting list keyed by player id.
#[derive(Debug)]
pub struct MatchmakingQueue {
    entries: IndexMap<PlayerId, QueueEntry>,
    grade_tolerance: u8,
}

impl MatchmakingQueue {
    pub fn new(grade_tolerance: u8) -> Self {
        Self {
            entries: IndexMap::new(),
            grade_tolerance,
        }
    }

    /// Pair the entry with the oldest compatible one, or append it.
    ///
    /// An existing entry of the same player is replaced, so a player never waits twice.
    pub fn enqueue(&mut self, entry: QueueEntry) -> Enqueued {
        self.entries.shift_remove(&entry.participant.id);

        let tolerance = self.grade_tolerance;
        let partner = self.entries.values().position(|waiting| {
            waiting.participant.grade.abs_diff(entry.participant.grade) <= tolerance
        });

        match partner.and_then(|index| self.entries.shift_remove_index(index)) {
            Some((_, waiting)) => Enqueued::Paired(MatchPairing {
                match_id: MatchId::generate(),
                seats: [waiting, entry],
            }),
            None => {
                self.entries.insert(entry.participant.id.clone(), entry);
                Enqueued::Waiting {
                    position: self.entries.len(),
                }
            }
        }
    }

    /// Remove the player's entry. Idempotent.
    pub fn dequeue(&mut self, player_id: &PlayerId) -> Option<QueueEntry> {
        self.entries.shift_remove(player_id)
    }

    /// Remove whatever entry belongs to a closed connection.
    pub fn remove_connection(&mut self, connection: ConnectionId) -> Option<QueueEntry> {
        let index = self
            .entries
            .values()
            .position(|entry| entry.connection == connection)?;
        self.entries
            .shift_remove_index(index)
            .map(|(_, entry)| entry)
    }

    /// Remove and return entries that waited at least `max_wait`.
    pub fn evict_stale(&mut self, now: Instant, max_wait: Duration) -> Vec<QueueEntry> {
        let mut evicted = Vec::new();
        self.entries.retain(|_, entry| {
            if now.saturating_duration_since(entry.joined_at) >= max_wait {
                evicted.push(entry.clone());
                false
            } else {
                true
            }
        });
        evicted
    }

    /// One-based position of the player, if waiting.
    pub fn position(&self, player_id: &PlayerId) -> Option<usize> {
        self.entries.get_index_of(player_id).map(|index| index + 1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, grade: u8, joined_at: Instant) -> QueueEntry {
        QueueEntry {
            participant: Participant {
                id: PlayerId::new(id),
                name: id.into(),
                rating: 500,
                grade,
                league: "bronze".into(),
                win_streak: 0,
            },
            connection: ConnectionId::new(),
            joined_at,
        }
    }

    #[test]
    fn compatible_pair_empties_the_queue() {
        let now = Instant::now();
        let mut queue = MatchmakingQueue::new(1);
        assert!(matches!(
            queue.enqueue(entry("a", 3, now)),
            Enqueued::Waiting { position: 1 }
        ));
        let Enqueued::Paired(pairing) = queue.enqueue(entry("b", 4, now)) else {
            panic!("expected a pairing");
        };
        assert_eq!(pairing.seats[0].participant.id.as_str(), "a");
        assert_eq!(pairing.seats[1].participant.id.as_str(), "b");
        assert!(pairing.match_id.as_str().starts_with("match_"));
        assert!(queue.is_empty());
    }

    #[test]
    fn incompatible_grades_keep_waiting() {
        let now = Instant::now();
        let mut queue = MatchmakingQueue::new(1);
        queue.enqueue(entry("a", 1, now));
        assert!(matches!(
            queue.enqueue(entry("b", 5, now)),
            Enqueued::Waiting { position: 2 }
        ));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn oldest_compatible_entry_is_chosen() {
        let now = Instant::now();
        let mut queue = MatchmakingQueue::new(1);
        queue.enqueue(entry("far", 6, now));
        queue.enqueue(entry("old", 2, now));
        queue.enqueue(entry("young", 2, now));
        // "young" paired with "old" on insertion, so add a fresh one.
        queue.enqueue(entry("late", 2, now));
        let Enqueued::Paired(pairing) = queue.enqueue(entry("new", 3, now)) else {
            panic!("expected a pairing");
        };
        assert_eq!(pairing.seats[0].participant.id.as_str(), "late");
        assert_eq!(queue.position(&PlayerId::new("far")), Some(1));
    }

    #[test]
    fn re_enqueue_replaces_the_previous_entry() {
        let now = Instant::now();
        let mut queue = MatchmakingQueue::new(0);
        queue.enqueue(entry("a", 3, now));
        assert!(matches!(
            queue.enqueue(entry("a", 3, now)),
            Enqueued::Waiting { position: 1 }
        ));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn dequeue_and_connection_removal_are_idempotent() {
        let now = Instant::now();
        let mut queue = MatchmakingQueue::new(1);
        let a = entry("a", 3, now);
        let connection = a.connection;
        queue.enqueue(a);
        queue.enqueue(entry("b", 6, now));
        assert!(queue.remove_connection(connection).is_some());
        assert!(queue.remove_connection(connection).is_none());
        assert!(queue.dequeue(&PlayerId::new("b")).is_some());
        assert!(queue.dequeue(&PlayerId::new("b")).is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn stale_entries_are_evicted() {
        let start = Instant::now();
        let mut queue = MatchmakingQueue::new(0);
        queue.enqueue(entry("old", 1, start));
        queue.enqueue(entry("new", 3, start + Duration::from_secs(30)));
        let evicted = queue.evict_stale(start + Duration::from_secs(60), Duration::from_secs(60));
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].participant.id.as_str(), "old");
        assert_eq!(queue.position(&PlayerId::new("new")), Some(1));
    }
}
