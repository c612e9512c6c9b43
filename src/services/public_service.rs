//! Read-only projections of live rooms and concluded matches.

use crate::{
    dto::{
        match_view::{MatchResultView, MatchStateView, MatchesResponse},
        validation::validate_match_id,
    },
    error::ServiceError,
    state::{SharedState, participant::MatchId},
};

/// Check a room id taken from a URL.
pub fn parse_match_id(raw: &str) -> Result<MatchId, ServiceError> {
    validate_match_id(raw).map_err(|err| {
        ServiceError::InvalidInput(
            err.message
                .map(|message| message.to_string())
                .unwrap_or_else(|| err.code.to_string()),
        )
    })?;
    Ok(MatchId::new(raw))
}

/// Summaries of every live room, oldest first.
pub async fn list_matches(state: &SharedState) -> MatchesResponse {
    let mut matches = Vec::new();
    for handle in state.matches().handles() {
        matches.push(handle.lock().await.room.summary());
    }
    matches.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    MatchesResponse { matches }
}

/// Full state of one live room.
pub async fn match_state(state: &SharedState, match_id: &MatchId) -> Result<MatchStateView, ServiceError> {
    let handle = state
        .matches()
        .get(match_id)
        .ok_or_else(|| ServiceError::NotFound(format!("no live match `{match_id}`")))?;
    let view = handle.lock().await.room.state_view();
    Ok(view)
}

/// Final result of a concluded match, from the pending buffer or the store.
pub async fn match_result(
    state: &SharedState,
    match_id: &MatchId,
) -> Result<MatchResultView, ServiceError> {
    if let Some(pending) = state.pending_records().get(match_id) {
        return Ok(MatchResultView::from(pending.value()));
    }
    let store = state.require_match_store().await?;
    let record = store
        .find_match(match_id.clone())
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("no recorded match `{match_id}`")))?;
    Ok(MatchResultView::from(record))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_ids_are_bad_input() {
        assert!(matches!(
            parse_match_id("with space"),
            Err(ServiceError::InvalidInput(_))
        ));
        assert_eq!(parse_match_id("match_1").unwrap(), MatchId::new("match_1"));
    }
}
