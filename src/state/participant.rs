use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Stable identifier of a player, issued by the platform's account system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    /// Wrap a raw player identifier.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identifier of a match room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct MatchId(String);

impl MatchId {
    /// Allocate a fresh identifier for a match created by the matchmaking queue.
    pub fn generate() -> Self {
        Self(format!("match_{}", Uuid::new_v4().simple()))
    }

    /// Wrap an identifier supplied by a client.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one live WebSocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Allocate a fresh connection identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Identity of a player as cached for the lifetime of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// Platform-wide player identifier.
    pub id: PlayerId,
    /// Name displayed to the opponent.
    pub name: String,
    /// Trophy count used as skill rating.
    pub rating: u32,
    /// School grade (1 to 6).
    pub grade: u8,
    /// League tier identifier (e.g. `silver`).
    pub league: String,
    /// Consecutive wins before this match.
    pub win_streak: u32,
}

/// One of the two player positions of a match room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Seat {
    /// Seat filled first; attacks towards the positive goal line.
    One,
    /// Seat filled second; attacks towards the negative goal line.
    Two,
}

impl Seat {
    /// Both seats in slot order.
    pub const ALL: [Seat; 2] = [Seat::One, Seat::Two];

    /// Index into the room's slot array.
    pub fn index(self) -> usize {
        match self {
            Seat::One => 0,
            Seat::Two => 1,
        }
    }

    /// The opposing seat.
    pub fn other(self) -> Seat {
        match self {
            Seat::One => Seat::Two,
            Seat::Two => Seat::One,
        }
    }
}

impl fmt::Display for Seat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Seat::One => f.write_str("player1"),
            Seat::Two => f.write_str("player2"),
        }
    }
}
