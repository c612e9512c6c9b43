use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Collect the health payload while logging connectivity issues.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.require_match_store().await {
        Ok(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "storage health check failed");
            }
        }
        Err(_) => warn!("storage unavailable (degraded mode)"),
    }

    let queued_players = state.queue().lock().await.len();
    HealthResponse::new(
        state.is_degraded().await,
        state.matches().len(),
        queued_players,
        state.pending_records().len(),
    )
}
