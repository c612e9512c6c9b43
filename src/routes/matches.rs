use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};

use crate::{
    dto::match_view::{MatchResultView, MatchStateView, MatchesResponse},
    error::AppError,
    services::public_service,
    state::SharedState,
};

/// Read-only endpoints over live rooms and recorded results.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/matches", get(list_matches))
        .route("/matches/{id}", get(get_match))
        .route("/matches/{id}/result", get(get_match_result))
}

#[utoipa::path(
    get,
    path = "/matches",
    tag = "matches",
    responses((status = 200, description = "Live rooms", body = MatchesResponse))
)]
/// List every live room.
pub async fn list_matches(State(state): State<SharedState>) -> Json<MatchesResponse> {
    Json(public_service::list_matches(&state).await)
}

#[utoipa::path(
    get,
    path = "/matches/{id}",
    tag = "matches",
    params(("id" = String, Path, description = "Identifier of the room")),
    responses(
        (status = 200, description = "Room state", body = MatchStateView),
        (status = 400, description = "Malformed room id"),
        (status = 404, description = "No live room with this id")
    )
)]
/// Return the full state of a live room.
pub async fn get_match(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<MatchStateView>, AppError> {
    let match_id = public_service::parse_match_id(&id)?;
    let view = public_service::match_state(&state, &match_id).await?;
    Ok(Json(view))
}

#[utoipa::path(
    get,
    path = "/matches/{id}/result",
    tag = "matches",
    params(("id" = String, Path, description = "Identifier of the match")),
    responses(
        (status = 200, description = "Recorded result", body = MatchResultView),
        (status = 400, description = "Malformed match id"),
        (status = 404, description = "No recorded result"),
        (status = 503, description = "Match store unavailable")
    )
)]
/// Return the recorded result of a concluded match.
pub async fn get_match_result(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<MatchResultView>, AppError> {
    let match_id = public_service::parse_match_id(&id)?;
    let view = public_service::match_result(&state, &match_id).await?;
    Ok(Json(view))
}
