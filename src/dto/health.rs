use serde::Serialize;
use utoipa::ToSchema;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Whether match results are currently kept pending instead of persisted.
    pub degraded: bool,
    /// Rooms currently held in memory.
    pub live_matches: usize,
    /// Players waiting for an opponent.
    pub queued_players: usize,
    /// Concluded matches waiting for the store to come back.
    pub pending_results: usize,
}

impl HealthResponse {
    /// Build the response from the degraded flag and the live counters.
    pub fn new(degraded: bool, live_matches: usize, queued_players: usize, pending_results: usize) -> Self {
        Self {
            status: if degraded { "degraded" } else { "ok" }.to_string(),
            degraded,
            live_matches,
            queued_players,
            pending_results,
        }
    }
}
